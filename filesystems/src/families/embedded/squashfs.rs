// SquashFS
// Version 4 superblock at offset 0; "hsqs" read little-endian, "sqsh" big-endian.

use crate::families::{magic_hex, require_extent, AUTHOR};
use log::debug;
use relic_core::dates::unix_to_datetime;
use relic_core::{
    read_bytes, Decode, Encoding, Endianness, FieldReader, Filesystem, FilesystemInfo,
    NormalizedMetadata, Partition, ReadOnlyFilesystem, RelicError, Report, Result, SectorSource,
    UnsupportedFilesystem,
};
use uuid::Uuid;

pub const SQUASHFS_MAGIC: u32 = 0x7371_7368;

const FLAG_UNCOMPRESSED_INODES: u16 = 0x0001;
const FLAG_UNCOMPRESSED_DATA: u16 = 0x0002;
const FLAG_UNCOMPRESSED_FRAGMENTS: u16 = 0x0008;
const FLAG_NO_FRAGMENTS: u16 = 0x0010;
const FLAG_ALWAYS_FRAGMENTS: u16 = 0x0020;
const FLAG_DUPLICATES: u16 = 0x0040;
const FLAG_EXPORTABLE: u16 = 0x0080;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SquashSuperblock {
    pub magic: u32,
    pub inodes: u32,
    pub mkfs_time: u32,
    pub block_size: u32,
    pub fragments: u32,
    pub compression: u16,
    pub block_log: u16,
    pub flags: u16,
    pub no_ids: u16,
    pub major: u16,
    pub minor: u16,
    pub root_inode: u64,
    pub bytes_used: u64,
}

impl Decode for SquashSuperblock {
    const SIZE: usize = 48;

    fn decode(bytes: &[u8], endianness: Endianness) -> Result<Self> {
        let r = FieldReader::new(bytes, Self::SIZE, endianness)?;
        Ok(Self {
            magic: r.u32(0)?,
            inodes: r.u32(4)?,
            mkfs_time: r.u32(8)?,
            block_size: r.u32(12)?,
            fragments: r.u32(16)?,
            compression: r.u16(20)?,
            block_log: r.u16(22)?,
            flags: r.u16(24)?,
            no_ids: r.u16(26)?,
            major: r.u16(28)?,
            minor: r.u16(30)?,
            root_inode: r.u64(32)?,
            bytes_used: r.u64(40)?,
        })
    }
}

fn compression_name(id: u16) -> Option<&'static str> {
    match id {
        1 => Some("zlib"),
        2 => Some("lzma"),
        3 => Some("lzo"),
        4 => Some("xz"),
        5 => Some("lz4"),
        6 => Some("zstd"),
        _ => None,
    }
}

pub struct SquashFilesystem;

impl SquashFilesystem {
    fn read_superblock(
        source: &dyn SectorSource,
        partition: &Partition,
    ) -> Result<(SquashSuperblock, Endianness)> {
        require_extent(source, partition, 0, SquashSuperblock::SIZE as u64)?;
        let raw = read_bytes(source, partition, 0, SquashSuperblock::SIZE)?;
        let endianness = Endianness::probe_u32(&raw, 0, SQUASHFS_MAGIC).ok_or_else(|| {
            debug!("squashfs: no magic, found {}", magic_hex(&raw[..4]));
            RelicError::mismatch("squashfs magic")
        })?;
        Ok((SquashSuperblock::decode(&raw, endianness)?, endianness))
    }
}

impl Filesystem for SquashFilesystem {
    fn name(&self) -> &'static str {
        "Squash filesystem"
    }

    fn id(&self) -> Uuid {
        Uuid::from_u128(0xf8f837ac_58a1_4b3e_8e2c_5a8b0f7c3d03)
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
        let created = unix_to_datetime(sb.mkfs_time as i64);

        let mut report = Report::new();
        report
            .line("Squash file system")
            .line(match endianness {
                Endianness::Little => "Little-endian",
                Endianness::Big => "Big-endian",
            })
            .line(format!("Volume version {}.{}", sb.major, sb.minor))
            .line(format!("Volume has {} bytes", sb.bytes_used))
            .line(format!("Volume has {} bytes per block", sb.block_size))
            .line(format!("Volume has {} inodes", sb.inodes))
            .line(format!("Volume has {} fragments", sb.fragments))
            .line(format!("Volume has {} uid/gid entries", sb.no_ids));
        if let Some(created) = created {
            report.field("Volume created on", created.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        match compression_name(sb.compression) {
            Some(name) => report.line(format!("Volume is compressed using {}", name)),
            None => report.line(format!("Volume is compressed using unknown algorithm {}", sb.compression)),
        };

        for (flag, text) in [
            (FLAG_UNCOMPRESSED_INODES, "Inodes are not compressed"),
            (FLAG_UNCOMPRESSED_DATA, "Data blocks are not compressed"),
            (FLAG_UNCOMPRESSED_FRAGMENTS, "Fragments are not compressed"),
            (FLAG_NO_FRAGMENTS, "Fragments are never used"),
            (FLAG_ALWAYS_FRAGMENTS, "Tail ends are always packed into fragments"),
            (FLAG_DUPLICATES, "Duplicate files were removed"),
            (FLAG_EXPORTABLE, "Volume is NFS exportable"),
        ] {
            if sb.flags & flag != 0 {
                report.line(text);
            }
        }

        if sb.major != 4 {
            report.warn(format!("Unsupported superblock version {}.{}", sb.major, sb.minor));
        }
        if sb.block_log >= 32 || sb.block_size != 1u32 << sb.block_log {
            report.warn(format!(
                "Block size {} does not match block log {}",
                sb.block_size, sb.block_log
            ));
        }

        let mut metadata = NormalizedMetadata::new("squashfs");
        metadata.cluster_size = sb.block_size;
        metadata.clusters = if sb.block_size == 0 { 0 } else { sb.bytes_used / sb.block_size as u64 };
        metadata.files = Some(sb.inodes as u64);
        metadata.creation_date = created;

        Ok(FilesystemInfo { report, metadata })
    }

    fn read_only(&self) -> Option<Box<dyn ReadOnlyFilesystem>> {
        Some(Box::new(UnsupportedFilesystem))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::families::test_support::*;
    use chrono::Datelike;
    use relic_core::test_utils::ImageBuilder;
    use relic_core::FieldWriter;

    fn squash_image(endianness: Endianness, block_log: u16) -> ImageBuilder {
        let mut sb = FieldWriter::new(SquashSuperblock::SIZE, endianness);
        sb.u32(0, SQUASHFS_MAGIC)
            .u32(4, 42)
            .u32(8, 1_600_000_000)
            .u32(12, 131_072)
            .u32(16, 3)
            .u16(20, 4)
            .u16(22, block_log)
            .u16(24, FLAG_DUPLICATES | FLAG_EXPORTABLE)
            .u16(26, 1)
            .u16(28, 4)
            .u64(40, 1_048_576);
        let mut image = ImageBuilder::new(512, 8);
        image.put(0, sb.as_bytes());
        image
    }

    #[test]
    fn test_little_endian_magic_reads_hsqs() {
        let image = squash_image(Endianness::Little, 17);
        assert_eq!(&image.bytes()[..4], b"hsqs");
        assert!(identifies(&SquashFilesystem, &image));
        assert_magic_sensitive(&SquashFilesystem, &image, 0..4);
        assert_rejects_one_sector(&SquashFilesystem, &image);

        let info = assert_idempotent(&SquashFilesystem, &image);
        assert_eq!(info.metadata.clusters, 8);
        assert_eq!(info.metadata.files, Some(42));
        assert_eq!(info.metadata.creation_date.unwrap().year(), 2020);
        assert!(info.report.to_string().contains("compressed using xz"));
        assert!(!info.report.has_warnings());
    }

    #[test]
    fn test_big_endian_and_block_log_warning() {
        let image = squash_image(Endianness::Big, 16);
        assert_eq!(&image.bytes()[..4], b"sqsh");
        let source = image.build();
        let info = SquashFilesystem.get_information(&source, &whole(&source), None).unwrap();
        assert_eq!(info.report.warnings().count(), 1);
        assert!(info.report.to_string().contains("Big-endian"));
    }
}
