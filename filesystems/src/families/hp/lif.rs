// HP Logical Interchange Format
// Big-endian volume header at byte 0; sizes count 256-byte sectors and dates are
// six BCD digit pairs.

use crate::families::{require_extent, AUTHOR};
use log::debug;
use relic_core::dates::lif_to_datetime;
use relic_core::{
    read_bytes, Decode, Encoding, Endianness, FieldReader, Filesystem, FilesystemInfo,
    NormalizedMetadata, Partition, RelicError, Report, Result, SectorSource,
};
use uuid::Uuid;

const LIF_SECTOR: u64 = 256;
const LIF_MAGIC: u16 = 0x8000;
const LIF_ID: u16 = 0x1000;
const DIRECTORY_ENTRY_SIZE: usize = 32;
const END_OF_DIRECTORY: u16 = 0xFFFF;
const PURGED_FILE: u16 = 0x0000;
const MAX_DIRECTORY_SECTORS: u32 = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifVolumeHeader {
    pub magic: u16,
    pub volume_label: [u8; 6],
    pub directory_start: u32,
    pub lif_id: u16,
    pub directory_size: u32,
    pub lif_version: u16,
    pub tracks: u32,
    pub heads: u32,
    pub sectors: u32,
    pub creation_date: [u8; 6],
}

impl Decode for LifVolumeHeader {
    const SIZE: usize = 42;

    fn decode(bytes: &[u8], endianness: Endianness) -> Result<Self> {
        let r = FieldReader::new(bytes, Self::SIZE, endianness)?;
        Ok(Self {
            magic: r.u16(0)?,
            volume_label: r.bytes::<6>(2)?,
            directory_start: r.u32(8)?,
            lif_id: r.u16(12)?,
            directory_size: r.u32(16)?,
            lif_version: r.u16(20)?,
            tracks: r.u32(24)?,
            heads: r.u32(28)?,
            sectors: r.u32(32)?,
            creation_date: r.bytes::<6>(36)?,
        })
    }
}

pub struct LifFilesystem;

impl LifFilesystem {
    fn read_header(source: &dyn SectorSource, partition: &Partition) -> Result<LifVolumeHeader> {
        require_extent(source, partition, LIF_SECTOR as u32, LIF_SECTOR)?;
        let raw = read_bytes(source, partition, 0, LifVolumeHeader::SIZE)?;
        let header = LifVolumeHeader::decode(&raw, Endianness::Big)?;
        if header.magic != LIF_MAGIC || header.lif_id != LIF_ID {
            return Err(RelicError::mismatch("LIF volume header"));
        }
        Ok(header)
    }

    /// Live files in the directory, or None if it lies outside the partition.
    fn count_files(
        source: &dyn SectorSource,
        partition: &Partition,
        header: &LifVolumeHeader,
    ) -> Result<Option<u64>> {
        let sectors = header.directory_size.min(MAX_DIRECTORY_SECTORS) as u64;
        let offset = header.directory_start as u64 * LIF_SECTOR;
        let len = sectors * LIF_SECTOR;
        if sectors == 0 || offset + len > partition.size_bytes(source.info().sector_size) {
            debug!("lif: directory at sector {} not readable", header.directory_start);
            return Ok(None);
        }
        let raw = read_bytes(source, partition, offset, len as usize)?;
        let mut files = 0;
        for entry in raw.chunks_exact(DIRECTORY_ENTRY_SIZE) {
            match u16::from_be_bytes([entry[10], entry[11]]) {
                END_OF_DIRECTORY => break,
                PURGED_FILE => {}
                _ => files += 1,
            }
        }
        Ok(Some(files))
    }
}

impl Filesystem for LifFilesystem {
    fn name(&self) -> &'static str {
        "HP Logical Interchange Format Plugin"
    }

    fn id(&self) -> Uuid {
        Uuid::from_u128(0x41535647_4c7e_4d6a_8f3b_9a2e1d0c5b47)
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
        let header = Self::read_header(source, partition)?;
        let label = encoding.decode_padded(&header.volume_label);
        let created = lif_to_datetime(&header.creation_date);
        let files = Self::count_files(source, partition, &header)?;

        let mut report = Report::new();
        report
            .line("HP Logical Interchange Format")
            .line(format!("Directory starts at cluster {}", header.directory_start))
            .line(format!("Directory is {} clusters long", header.directory_size))
            .line(format!("LIF version: {}", header.lif_version))
            .line(format!("Volume created on {}", created.map_or_else(
                || "an unknown date".to_string(),
                |d| d.format("%Y-%m-%d %H:%M:%S").to_string(),
            )))
            .line(format!("{} tracks", header.tracks))
            .line(format!("{} heads", header.heads))
            .line(format!("{} sectors", header.sectors))
            .field("Volume name", &label);
        if let Some(files) = files {
            report.line(format!("{} files in directory", files));
        }

        if header.directory_start == 0 {
            report.warn("Directory start overlaps the volume header");
        }

        let mut metadata = NormalizedMetadata::new("HP Logical Interchange Format").with_volume_name(label);
        metadata.cluster_size = LIF_SECTOR as u32;
        metadata.clusters = partition.size_bytes(source.info().sector_size) / LIF_SECTOR;
        metadata.files = files;
        metadata.creation_date = created;

        Ok(FilesystemInfo { report, metadata })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::families::test_support::*;
    use chrono::Datelike;
    use relic_core::test_utils::ImageBuilder;
    use relic_core::FieldWriter;

    fn lif_image() -> ImageBuilder {
        let mut header = FieldWriter::new(LifVolumeHeader::SIZE, Endianness::Big);
        header
            .u16(0, LIF_MAGIC)
            .bytes(2, b"HPLIF ")
            .u32(8, 2)
            .u16(12, LIF_ID)
            .u32(16, 2)
            .u16(20, 1)
            .u32(24, 77)
            .u32(28, 2)
            .u32(32, 16)
            .bytes(36, &[0x88, 0x02, 0x29, 0x10, 0x30, 0x00]);

        let mut directory = vec![0u8; 3 * DIRECTORY_ENTRY_SIZE];
        directory[10..12].copy_from_slice(&0xE008u16.to_be_bytes());
        directory[32 + 10..32 + 12].copy_from_slice(&PURGED_FILE.to_be_bytes());
        directory[64 + 10..64 + 12].copy_from_slice(&END_OF_DIRECTORY.to_be_bytes());

        let mut image = ImageBuilder::new(256, 1232);
        image.put(0, header.as_bytes());
        image.put(2 * 256, &directory);
        image
    }

    #[test]
    fn test_volume_header() {
        let image = lif_image();
        assert!(identifies(&LifFilesystem, &image));
        assert_magic_sensitive(&LifFilesystem, &image, 0..2);
        assert_magic_sensitive(&LifFilesystem, &image, 12..14);
        assert_rejects_one_sector(&LifFilesystem, &image);

        let info = assert_idempotent(&LifFilesystem, &image);
        assert!(!info.report.has_warnings());
        let meta = &info.metadata;
        assert_eq!(meta.volume_name.as_deref(), Some("HPLIF"));
        assert_eq!(meta.clusters, 1232);
        assert_eq!(meta.files, Some(1));
        assert_eq!(meta.creation_date.unwrap().year(), 1988);
    }

    #[test]
    fn test_rejects_tiny_sectors() {
        let image = lif_image();
        let source = relic_core::MemorySectorSource::new(image.bytes()[..4096].to_vec(), 128);
        assert!(!LifFilesystem.identify(&source, &whole(&source)).unwrap());
    }
}
