// ROMFS
// Big-endian header "-rom1fs-" at offset 0. The 32-bit words of the first
// 512 bytes (or the whole image if smaller) must sum to zero.

use crate::families::{require_extent, AUTHOR};
use relic_core::decoder::word_sum32;
use relic_core::{
    read_bytes, Decode, Encoding, Endianness, FieldReader, Filesystem, FilesystemInfo,
    NormalizedMetadata, Partition, RelicError, Report, Result, SectorSource,
};
use uuid::Uuid;

const ROMFS_MAGIC: &[u8; 8] = b"-rom1fs-";
const CHECKSUMMED_BYTES: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomfsHeader {
    pub magic: [u8; 8],
    pub full_size: u32,
    pub checksum: u32,
    /// NUL-terminated, padded to a 16-byte boundary
    pub name: Vec<u8>,
}

impl Decode for RomfsHeader {
    const SIZE: usize = CHECKSUMMED_BYTES;

    fn decode(bytes: &[u8], endianness: Endianness) -> Result<Self> {
        let r = FieldReader::new(bytes, Self::SIZE, endianness)?;
        let tail = r.slice(16, Self::SIZE - 16)?;
        let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
        Ok(Self {
            magic: r.bytes::<8>(0)?,
            full_size: r.u32(8)?,
            checksum: r.u32(12)?,
            name: tail[..end].to_vec(),
        })
    }
}

pub struct RomfsFilesystem;

impl RomfsFilesystem {
    fn read_header(source: &dyn SectorSource, partition: &Partition) -> Result<(RomfsHeader, Vec<u8>)> {
        require_extent(source, partition, 0, CHECKSUMMED_BYTES as u64)?;
        let raw = read_bytes(source, partition, 0, CHECKSUMMED_BYTES)?;
        let header = RomfsHeader::decode(&raw, Endianness::Big)?;
        if &header.magic != ROMFS_MAGIC {
            return Err(RelicError::mismatch("romfs magic"));
        }
        Ok((header, raw))
    }
}

impl Filesystem for RomfsFilesystem {
    fn name(&self) -> &'static str {
        "Linux RomFS"
    }

    fn id(&self) -> Uuid {
        Uuid::from_u128(0x1c8a8b7d_3e7b_4a0f_9ad2_1f6a4c2e0b04)
    }

    fn author(&self) -> &'static str {
        AUTHOR
    }

    fn detect(&self, source: &dyn SectorSource, partition: &Partition) -> Result<bool> {
        Self::read_header(source, partition).map(|_| true)
    }

    fn get_information(
        &self,
        source: &dyn SectorSource,
        partition: &Partition,
        encoding: Option<Encoding>,
    ) -> Result<FilesystemInfo> {
        let encoding = encoding.unwrap_or(self.default_encoding());
        let (header, raw) = Self::read_header(source, partition)?;
        let name = encoding.decode(&header.name);
        let sector_size = source.info().sector_size;

        let mut report = Report::new();
        report
            .line("Linux RomFS")
            .field("Volume name", &name)
            .line(format!("Volume size is {} bytes", header.full_size))
            .line(format!("Volume checksum is 0x{:08X}", header.checksum));

        let covered = (header.full_size as usize).clamp(16, CHECKSUMMED_BYTES) & !3;
        let sum = word_sum32(&raw[..covered], Endianness::Big);
        if sum != 0 {
            report.warn(format!(
                "Checksum over the first {} bytes sums to 0x{:08X} instead of zero",
                covered, sum
            ));
        }

        let mut metadata = NormalizedMetadata::new("romfs").with_volume_name(name);
        metadata.cluster_size = sector_size;
        metadata.clusters = (header.full_size as u64).div_ceil(sector_size as u64);

        Ok(FilesystemInfo { report, metadata })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::families::test_support::*;
    use relic_core::test_utils::ImageBuilder;
    use relic_core::FieldWriter;

    fn romfs_image(valid_checksum: bool) -> ImageBuilder {
        let mut header = FieldWriter::new(CHECKSUMMED_BYTES, Endianness::Big);
        header.bytes(0, ROMFS_MAGIC).u32(8, 4096).bytes(16, b"rootfs\0");
        let sum = word_sum32(header.as_bytes(), Endianness::Big);
        let checksum = if valid_checksum { sum.wrapping_neg() } else { sum.wrapping_neg() ^ 1 };
        header.u32(12, checksum);

        let mut image = ImageBuilder::new(512, 8);
        image.put(0, header.as_bytes());
        image
    }

    #[test]
    fn test_valid_header() {
        let image = romfs_image(true);
        assert!(identifies(&RomfsFilesystem, &image));
        assert_magic_sensitive(&RomfsFilesystem, &image, 0..8);
        assert_rejects_one_sector(&RomfsFilesystem, &image);

        let info = assert_idempotent(&RomfsFilesystem, &image);
        assert!(!info.report.has_warnings());
        assert_eq!(info.metadata.volume_name.as_deref(), Some("rootfs"));
        assert_eq!(info.metadata.clusters, 8);
    }

    #[test]
    fn test_bad_checksum_is_a_warning() {
        init_logging();
        let image = romfs_image(false);
        let source = image.build();
        let info = RomfsFilesystem.get_information(&source, &whole(&source), None).unwrap();
        assert_eq!(info.report.warnings().count(), 1);
        assert!(info.report.to_string().lines().last().unwrap().starts_with("WARNING: "));
    }
}
