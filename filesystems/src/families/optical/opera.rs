// 3DO Opera
// Big-endian volume header in the first sector: record type 1, five 0x5A sync
// bytes and record version 1 must all be present.

use crate::families::{require_extent, AUTHOR};
use relic_core::{
    read_bytes, Decode, Encoding, Endianness, FieldReader, Filesystem, FilesystemInfo,
    NormalizedMetadata, Partition, RelicError, Report, Result, SectorSource,
};
use uuid::Uuid;

const RECORD_TYPE: u8 = 1;
const SYNC_BYTES: [u8; 5] = [0x5A; 5];
const RECORD_VERSION: u8 = 1;
const ROOT_COPIES: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperaVolumeHeader {
    pub record_type: u8,
    pub sync_bytes: [u8; 5],
    pub record_version: u8,
    pub volume_flags: u8,
    pub volume_comment: [u8; 32],
    pub volume_label: [u8; 32],
    pub volume_id: u32,
    pub block_size: u32,
    pub block_count: u32,
    pub root_dirid: u32,
    pub rootdir_blocks: u32,
    pub rootdir_bsize: u32,
    pub last_root_copy: u32,
    pub root_copies: [u32; ROOT_COPIES],
}

impl Decode for OperaVolumeHeader {
    const SIZE: usize = 132;

    fn decode(bytes: &[u8], endianness: Endianness) -> Result<Self> {
        let r = FieldReader::new(bytes, Self::SIZE, endianness)?;
        let mut root_copies = [0u32; ROOT_COPIES];
        for (i, copy) in root_copies.iter_mut().enumerate() {
            *copy = r.u32(100 + i * 4)?;
        }
        Ok(Self {
            record_type: r.u8(0)?,
            sync_bytes: r.bytes::<5>(1)?,
            record_version: r.u8(6)?,
            volume_flags: r.u8(7)?,
            volume_comment: r.bytes::<32>(8)?,
            volume_label: r.bytes::<32>(40)?,
            volume_id: r.u32(72)?,
            block_size: r.u32(76)?,
            block_count: r.u32(80)?,
            root_dirid: r.u32(84)?,
            rootdir_blocks: r.u32(88)?,
            rootdir_bsize: r.u32(92)?,
            last_root_copy: r.u32(96)?,
            root_copies,
        })
    }
}

pub struct OperaFilesystem;

impl OperaFilesystem {
    fn read_header(source: &dyn SectorSource, partition: &Partition) -> Result<OperaVolumeHeader> {
        require_extent(source, partition, 0, OperaVolumeHeader::SIZE as u64)?;
        let raw = read_bytes(source, partition, 0, OperaVolumeHeader::SIZE)?;
        let header = OperaVolumeHeader::decode(&raw, Endianness::Big)?;
        if header.record_type != RECORD_TYPE
            || header.sync_bytes != SYNC_BYTES
            || header.record_version != RECORD_VERSION
        {
            return Err(RelicError::mismatch("Opera volume header"));
        }
        Ok(header)
    }
}

impl Filesystem for OperaFilesystem {
    fn name(&self) -> &'static str {
        "Opera Filesystem Plugin"
    }

    fn id(&self) -> Uuid {
        Uuid::from_u128(0x0ec84ec7_eae6_4196_83fe_943b3fe48dbd)
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
        let label = encoding.decode_c_string(&header.volume_label);
        let comment = encoding.decode_c_string(&header.volume_comment);
        let sector_size = source.info().sector_size;

        let mut report = Report::new();
        report
            .line("Opera filesystem disc.")
            .field("Volume label", &label);
        if !comment.is_empty() {
            report.field("Volume comment", &comment);
        }
        report
            .line(format!("Volume identifier: 0x{:08X}", header.volume_id))
            .line(format!("Volume flags: 0x{:02X}", header.volume_flags))
            .line(format!(
                "Volume has {} blocks of {} bytes each",
                header.block_count, header.block_size
            ))
            .line(format!(
                "Root directory identifier: 0x{:08X}, {} blocks of {} bytes",
                header.root_dirid, header.rootdir_blocks, header.rootdir_bsize
            ));
        let copies = (header.last_root_copy as usize + 1).min(ROOT_COPIES);
        for (i, copy) in header.root_copies[..copies].iter().enumerate() {
            report.line(format!("Root directory copy {} at block {}", i, copy));
        }

        if header.block_size != sector_size {
            report.warn(format!(
                "Filesystem indicates {} bytes/block while device indicates {} bytes/sector",
                header.block_size, sector_size
            ));
        }
        let declared = header.block_count as u64 * header.block_size as u64;
        let available = partition.size_bytes(sector_size);
        if declared > available {
            report.warn(format!(
                "Filesystem indicates {} bytes while the partition holds {}",
                declared, available
            ));
        }

        let mut metadata = NormalizedMetadata::new("Opera").with_volume_name(label);
        metadata.cluster_size = header.block_size;
        metadata.clusters = header.block_count as u64;
        metadata.volume_serial = Some(format!("{:08X}", header.volume_id));

        Ok(FilesystemInfo { report, metadata })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::families::test_support::*;
    use relic_core::test_utils::ImageBuilder;
    use relic_core::FieldWriter;

    fn opera_image(sector_size: u32, sectors: u64) -> ImageBuilder {
        let mut header = FieldWriter::new(OperaVolumeHeader::SIZE, Endianness::Big);
        header
            .u8(0, RECORD_TYPE)
            .bytes(1, &SYNC_BYTES)
            .u8(6, RECORD_VERSION)
            .bytes(8, b"Test disc")
            .bytes(40, b"CD-ROM")
            .u32(72, 0x1234_5678)
            .u32(76, 2048)
            .u32(80, 100)
            .u32(84, 0xABCD)
            .u32(88, 1)
            .u32(92, 2048)
            .u32(96, 1)
            .u32(100, 50)
            .u32(104, 60);
        let mut image = ImageBuilder::new(sector_size, sectors);
        image.put(0, header.as_bytes());
        image
    }

    #[test]
    fn test_volume_header() {
        let image = opera_image(2048, 100);
        assert!(identifies(&OperaFilesystem, &image));
        assert_magic_sensitive(&OperaFilesystem, &image, 0..7);
        assert_rejects_one_sector(&OperaFilesystem, &image);

        let info = assert_idempotent(&OperaFilesystem, &image);
        assert!(!info.report.has_warnings());
        assert_eq!(info.metadata.volume_name.as_deref(), Some("CD-ROM"));
        assert_eq!(info.metadata.clusters, 100);
        assert_eq!(info.metadata.volume_serial.as_deref(), Some("12345678"));
        assert!(info.report.to_string().contains("Root directory copy 1 at block 60"));
    }

    #[test]
    fn test_block_size_disagreement_warns() {
        let image = opera_image(512, 400);
        let source = image.build();
        let info = OperaFilesystem.get_information(&source, &whole(&source), None).unwrap();
        assert_eq!(info.report.warnings().count(), 1);
    }
}
