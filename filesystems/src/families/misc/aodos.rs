// Alexander Osipov DOS (AO-DOS) for the Elektronika BK-0011
// Only ever found on 800- or 1600-sector floppies; the boot block carries the
// identifier, the disk name and two counters.

use crate::families::{require_extent, AUTHOR};
use relic_core::{
    read_bytes, Decode, Encoding, Endianness, FieldReader, Filesystem, FilesystemInfo,
    NormalizedMetadata, Partition, RelicError, Report, Result, SectorSource,
};
use uuid::Uuid;

const IDENTIFIER: &[u8; 8] = b" AO-DOS ";
const IDENTIFIER_OFFSET: usize = 0x1C;

/// Boot block in sector 0
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AodosBootBlock {
    pub nop: u8,
    pub branch: [u8; 0x1A],
    pub identifier: [u8; 8],
    pub volume_label: [u8; 8],
    pub files: u16,
    pub used_sectors: u16,
}

impl Decode for AodosBootBlock {
    const SIZE: usize = 0x30;

    fn decode(bytes: &[u8], endianness: Endianness) -> Result<Self> {
        let r = FieldReader::new(bytes, Self::SIZE, endianness)?;
        Ok(Self {
            nop: r.u8(0x00)?,
            branch: r.bytes::<0x1A>(0x01)?,
            identifier: r.bytes::<8>(IDENTIFIER_OFFSET)?,
            volume_label: r.bytes::<8>(0x24)?,
            files: r.u16(0x2C)?,
            used_sectors: r.u16(0x2E)?,
        })
    }
}

pub struct AodosFilesystem;

impl AodosFilesystem {
    fn read_boot_block(source: &dyn SectorSource, partition: &Partition) -> Result<AodosBootBlock> {
        let info = source.info();
        // Floppy-only format
        if partition.start != 0 {
            return Err(RelicError::mismatch("AO-DOS lives at the start of the medium"));
        }
        if info.sector_size != 512 || !matches!(info.total_sectors, 800 | 1600) {
            return Err(RelicError::mismatch("not an AO-DOS floppy geometry"));
        }
        require_extent(source, partition, 512, 512)?;

        let raw = read_bytes(source, partition, 0, AodosBootBlock::SIZE)?;
        let boot = AodosBootBlock::decode(&raw, Endianness::Little)?;
        if &boot.identifier != IDENTIFIER {
            return Err(RelicError::mismatch("AO-DOS identifier"));
        }
        Ok(boot)
    }
}

impl Filesystem for AodosFilesystem {
    fn name(&self) -> &'static str {
        "Alexander Osipov DOS file system"
    }

    fn id(&self) -> Uuid {
        Uuid::from_u128(0x668e5039_9243_4ef1_9b2a_2d3a9d0c1b01)
    }

    fn author(&self) -> &'static str {
        AUTHOR
    }

    fn default_encoding(&self) -> Encoding {
        Encoding::Koi8R
    }

    fn detect(&self, source: &dyn SectorSource, partition: &Partition) -> Result<bool> {
        Self::read_boot_block(source, partition).map(|_| true)
    }

    fn get_information(
        &self,
        source: &dyn SectorSource,
        partition: &Partition,
        encoding: Option<Encoding>,
    ) -> Result<FilesystemInfo> {
        let encoding = encoding.unwrap_or(self.default_encoding());
        let boot = Self::read_boot_block(source, partition)?;
        let info = source.info();
        let label = encoding.decode_padded(&boot.volume_label);

        let mut report = Report::new();
        report
            .line("Alexander Osipov DOS file system")
            .line(format!("{} files", boot.files))
            .line(format!("{} used sectors", boot.used_sectors))
            .line(format!("Disk name: {}", label));

        let used = boot.used_sectors as u64;
        if used > info.total_sectors {
            report.warn(format!(
                "Boot block claims {} used sectors on a {}-sector disk",
                used, info.total_sectors
            ));
        }

        let mut metadata = NormalizedMetadata::new("Alexander Osipov DOS file system").with_volume_name(label);
        metadata.cluster_size = info.sector_size;
        metadata.clusters = info.total_sectors;
        metadata.files = Some(boot.files as u64);
        metadata.free_clusters = Some(info.total_sectors.saturating_sub(used));

        Ok(FilesystemInfo { report, metadata })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::families::test_support::*;
    use relic_core::test_utils::ImageBuilder;
    use relic_core::FieldWriter;

    fn aodos_image(sectors: u64, label: &[u8]) -> ImageBuilder {
        let mut boot = FieldWriter::new(AodosBootBlock::SIZE, Endianness::Little);
        boot.u8(0, 0xA0)
            .bytes(IDENTIFIER_OFFSET, IDENTIFIER)
            .bytes(0x24, label)
            .u16(0x2C, 12)
            .u16(0x2E, 300);
        let mut image = ImageBuilder::new(512, sectors);
        image.put(0, boot.as_bytes());
        image
    }

    #[test]
    fn test_identifier_on_800_sector_floppy() {
        init_logging();
        let image = aodos_image(800, b"BK0011");
        assert_eq!(&image.bytes()[0x1C..0x24], &[0x20, 0x41, 0x4F, 0x2D, 0x44, 0x4F, 0x53, 0x20]);
        assert!(identifies(&AodosFilesystem, &image));

        let info = assert_idempotent(&AodosFilesystem, &image);
        assert_eq!(info.metadata.clusters, 800);
        assert_eq!(info.metadata.cluster_size, 512);
        assert_eq!(info.metadata.files, Some(12));
        assert_eq!(info.metadata.free_clusters, Some(500));
        assert_eq!(info.metadata.volume_name.as_deref(), Some("BK0011"));
        assert!(!info.report.has_warnings());
    }

    #[test]
    fn test_identifier_bytes_are_checked() {
        let image = aodos_image(1600, b"DISK");
        assert!(identifies(&AodosFilesystem, &image));
        assert_magic_sensitive(&AodosFilesystem, &image, IDENTIFIER_OFFSET..IDENTIFIER_OFFSET + 8);
        assert_rejects_one_sector(&AodosFilesystem, &image);
    }

    #[test]
    fn test_other_geometries_rejected() {
        assert!(!identifies(&AodosFilesystem, &aodos_image(801, b"DISK")));

        let image = aodos_image(800, b"DISK");
        let source = image.build();
        assert!(!AodosFilesystem.identify(&source, &Partition::new(1, 799)).unwrap());
    }

    #[test]
    fn test_label_decoded_as_koi8r() {
        // "ДИСК" in KOI8-R
        let image = aodos_image(800, &[0xE4, 0xE9, 0xF3, 0xEB]);
        let source = image.build();
        let info = AodosFilesystem.get_information(&source, &whole(&source), None).unwrap();
        assert_eq!(info.metadata.volume_name.as_deref(), Some("ДИСК"));
        assert!(info.report.to_string().contains("Disk name: ДИСК"));
    }
}
