// Xbox FATX and Xbox 360 XTAF
// Same layout in both: a 4 KiB superblock at offset 0 whose magic reads "FATX" on
// the little-endian original Xbox and "XTAF" on the big-endian Xbox 360.

use crate::families::{magic_hex, require_extent, AUTHOR};
use log::debug;
use relic_core::{
    read_bytes, Decode, Encoding, Endianness, FieldReader, Filesystem, FilesystemInfo,
    NormalizedMetadata, Partition, RelicError, Report, Result, SectorSource,
};
use uuid::Uuid;

/// "FATX" read little-endian, "XTAF" read big-endian
pub const FATX_MAGIC: u32 = 0x5854_4146;
const FATX_SECTOR: u32 = 512;
const SUPERBLOCK_AREA: u64 = 4096;
const FIRST_CLUSTER: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatxSuperblock {
    pub magic: u32,
    pub id: u32,
    pub sectors_per_cluster: u32,
    pub root_cluster: u32,
    pub unknown: u16,
    /// UTF-16 in the volume's byte order
    pub volume_label: [u8; 32],
}

impl Decode for FatxSuperblock {
    const SIZE: usize = 50;

    fn decode(bytes: &[u8], endianness: Endianness) -> Result<Self> {
        let r = FieldReader::new(bytes, Self::SIZE, endianness)?;
        Ok(Self {
            magic: r.u32(0)?,
            id: r.u32(4)?,
            sectors_per_cluster: r.u32(8)?,
            root_cluster: r.u32(12)?,
            unknown: r.u16(16)?,
            volume_label: r.bytes::<32>(18)?,
        })
    }
}

impl FatxSuperblock {
    fn label(&self, endianness: Endianness) -> String {
        let mut raw = self.volume_label;
        if endianness == Endianness::Little {
            raw.chunks_exact_mut(2).for_each(|pair| pair.swap(0, 1));
        }
        Encoding::Utf16Be.decode_padded(&raw)
    }

    /// Bytes per cluster, or `None` when it does not fit 32 bits.
    pub fn cluster_size(&self) -> Option<u32> {
        self.sectors_per_cluster.checked_mul(FATX_SECTOR)
    }
}

pub struct FatxFilesystem;

impl FatxFilesystem {
    fn read_superblock(
        source: &dyn SectorSource,
        partition: &Partition,
    ) -> Result<(FatxSuperblock, Endianness)> {
        require_extent(source, partition, 0, SUPERBLOCK_AREA)?;
        let raw = read_bytes(source, partition, 0, FatxSuperblock::SIZE)?;
        let endianness = Endianness::probe_u32(&raw, 0, FATX_MAGIC).ok_or_else(|| {
            debug!("fatx: no magic, found {}", magic_hex(&raw[..4]));
            RelicError::mismatch("FATX magic")
        })?;
        let sb = FatxSuperblock::decode(&raw, endianness)?;
        if !sb.sectors_per_cluster.is_power_of_two() || sb.cluster_size().is_none() {
            return Err(RelicError::mismatch(format!(
                "FATX sectors per cluster {}",
                sb.sectors_per_cluster
            )));
        }
        Ok((sb, endianness))
    }
}

impl Filesystem for FatxFilesystem {
    fn name(&self) -> &'static str {
        "FATX Filesystem Plugin"
    }

    fn id(&self) -> Uuid {
        Uuid::from_u128(0xed27a721_4a17_4649_89fd_33633b46e228)
    }

    fn author(&self) -> &'static str {
        AUTHOR
    }

    fn detect(&self, source: &dyn SectorSource, partition: &Partition) -> Result<bool> {
        Self::read_superblock(source, partition).map(|_| true)
    }

    fn get_information(
        &self,
        source: &dyn SectorSource,
        partition: &Partition,
        _encoding: Option<Encoding>,
    ) -> Result<FilesystemInfo> {
        let (sb, endianness) = Self::read_superblock(source, partition)?;
        let label = sb.label(endianness);
        let cluster_size = sb
            .cluster_size()
            .ok_or_else(|| RelicError::mismatch("FATX cluster size"))?;
        let clusters = partition.size_bytes(source.info().sector_size) / cluster_size as u64;

        let mut report = Report::new();
        report
            .line(match endianness {
                Endianness::Little => "FATX filesystem",
                Endianness::Big => "FATX (XTAF) filesystem",
            })
            .line(format!("Filesystem is {}", endianness))
            .line(format!("{} logical sectors ({} bytes) per cluster", sb.sectors_per_cluster, cluster_size))
            .line(format!("Root directory starts on cluster {}", sb.root_cluster))
            .line(format!("Volume has {} clusters", clusters))
            .field("Volume serial number", format!("{:08X}", sb.id));
        if !label.is_empty() {
            report.field("Volume label", &label);
        }

        if sb.root_cluster < FIRST_CLUSTER || sb.root_cluster as u64 > clusters {
            report.warn(format!(
                "Root directory cluster {} lies outside the {} clusters of the volume",
                sb.root_cluster, clusters
            ));
        }

        let mut metadata = NormalizedMetadata::new("FATX").with_volume_name(label);
        metadata.cluster_size = cluster_size;
        metadata.clusters = clusters;
        metadata.volume_serial = Some(format!("{:08X}", sb.id));

        Ok(FilesystemInfo { report, metadata })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::families::test_support::*;
    use relic_core::test_utils::ImageBuilder;
    use relic_core::FieldWriter;

    fn fatx_image(endianness: Endianness, label: &str) -> ImageBuilder {
        let mut sb = FieldWriter::new(FatxSuperblock::SIZE, endianness);
        sb.u32(0, FATX_MAGIC).u32(4, 0xC0FF_EE01).u32(8, 32).u32(12, 1);
        for (i, unit) in label.encode_utf16().enumerate() {
            sb.u16(18 + i * 2, unit);
        }
        let mut image = ImageBuilder::new(512, 2048);
        image.put(0, sb.as_bytes());
        image
    }

    #[test]
    fn test_magic_order_selects_byte_order() {
        init_logging();
        let xbox = fatx_image(Endianness::Little, "GAMES");
        let xbox360 = fatx_image(Endianness::Big, "GAMES");
        assert_eq!(&xbox.bytes()[..4], b"FATX");
        assert_eq!(&xbox360.bytes()[..4], b"XTAF");

        for image in [&xbox, &xbox360] {
            assert!(identifies(&FatxFilesystem, image));
            assert_magic_sensitive(&FatxFilesystem, image, 0..4);
            assert_rejects_one_sector(&FatxFilesystem, image);
        }

        let le = assert_idempotent(&FatxFilesystem, &xbox);
        let be = assert_idempotent(&FatxFilesystem, &xbox360);
        assert_eq!(le.metadata, be.metadata);
        assert!(!le.report.has_warnings());
        assert_eq!(le.metadata.volume_name.as_deref(), Some("GAMES"));
        assert_eq!(le.metadata.cluster_size, 16384);
        assert_eq!(le.metadata.clusters, 64);
        assert_eq!(le.metadata.volume_serial.as_deref(), Some("C0FFEE01"));
        assert!(be.report.to_string().contains("XTAF"));
    }

    #[test]
    fn test_rejects_odd_cluster_size() {
        let mut image = fatx_image(Endianness::Little, "");
        image.put(8, &24u32.to_le_bytes());
        assert!(!identifies(&FatxFilesystem, &image));
    }

    #[test]
    fn test_rejects_cluster_size_past_u32() {
        for endianness in [Endianness::Little, Endianness::Big] {
            let mut image = fatx_image(endianness, "");
            image.put(8, FieldWriter::new(4, endianness).u32(0, 1 << 23).as_bytes());
            assert!(!identifies(&FatxFilesystem, &image));

            let source = image.build();
            let err = FatxFilesystem.get_information(&source, &whole(&source), None).unwrap_err();
            assert!(err.is_mismatch());

            image.put(8, FieldWriter::new(4, endianness).u32(0, 1 << 22).as_bytes());
            let source = image.build();
            let info = FatxFilesystem.get_information(&source, &whole(&source), None).unwrap();
            assert_eq!(info.metadata.cluster_size, 1 << 31);
            assert_eq!(info.metadata.clusters, 0);
        }
    }

    #[test]
    fn test_root_outside_volume_warns() {
        let mut image = fatx_image(Endianness::Big, "");
        image.put(12, &1000u32.to_be_bytes());
        let source = image.build();
        let info = FatxFilesystem.get_information(&source, &whole(&source), None).unwrap();
        assert_eq!(info.report.warnings().count(), 1);
        assert!(info.metadata.volume_name.is_none());
    }
}
