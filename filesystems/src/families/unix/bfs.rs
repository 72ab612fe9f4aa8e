// UnixWare boot filesystem (BFS)
// Flat, contiguous filesystem; the superblock at offset 0 is always little-endian.

use crate::families::{require_extent, AUTHOR};
use relic_core::{
    read_bytes, Decode, Encoding, Endianness, FieldReader, Filesystem, FilesystemInfo,
    NormalizedMetadata, Partition, RelicError, Report, Result, SectorSource,
};
use uuid::Uuid;

const BFS_MAGIC: u32 = 0x1BAD_FACE;
const BFS_BLOCK_SIZE: u32 = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BfsSuperblock {
    pub s_magic: u32,
    /// First data byte
    pub s_start: u32,
    /// Last byte of the filesystem
    pub s_end: u32,
    pub s_from: u32,
    pub s_to: u32,
    pub s_bfrom: i32,
    pub s_bto: i32,
    pub s_fsname: [u8; 6],
    pub s_volume: [u8; 6],
}

impl Decode for BfsSuperblock {
    const SIZE: usize = 40;

    fn decode(bytes: &[u8], endianness: Endianness) -> Result<Self> {
        let r = FieldReader::new(bytes, Self::SIZE, endianness)?;
        Ok(Self {
            s_magic: r.u32(0)?,
            s_start: r.u32(4)?,
            s_end: r.u32(8)?,
            s_from: r.u32(12)?,
            s_to: r.u32(16)?,
            s_bfrom: r.i32(20)?,
            s_bto: r.i32(24)?,
            s_fsname: r.bytes::<6>(28)?,
            s_volume: r.bytes::<6>(34)?,
        })
    }
}

pub struct BfsFilesystem;

impl BfsFilesystem {
    fn read_superblock(source: &dyn SectorSource, partition: &Partition) -> Result<BfsSuperblock> {
        require_extent(source, partition, 0, BfsSuperblock::SIZE as u64)?;
        let raw = read_bytes(source, partition, 0, BfsSuperblock::SIZE)?;
        let sb = BfsSuperblock::decode(&raw, Endianness::Little)?;
        if sb.s_magic != BFS_MAGIC {
            return Err(RelicError::mismatch("BFS magic"));
        }
        Ok(sb)
    }
}

impl Filesystem for BfsFilesystem {
    fn name(&self) -> &'static str {
        "UNIX Boot filesystem"
    }

    fn id(&self) -> Uuid {
        Uuid::from_u128(0x1e6e0da6_f7e4_494c_80c6_cb5929e96155)
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
        encoding: Option<Encoding>,
    ) -> Result<FilesystemInfo> {
        let encoding = encoding.unwrap_or(self.default_encoding());
        let sb = Self::read_superblock(source, partition)?;
        let fsname = encoding.decode_padded(&sb.s_fsname);
        let volume = encoding.decode_padded(&sb.s_volume);
        let bytes = sb.s_end as u64 + 1;

        let mut report = Report::new();
        report
            .line("UNIX Boot filesystem")
            .line(format!(
                "Volume goes from byte {} to byte {}, for {} bytes",
                sb.s_start,
                sb.s_end,
                sb.s_end.saturating_sub(sb.s_start)
            ))
            .field("Filesystem name", &fsname)
            .field("Volume name", &volume);
        if sb.s_from != 0 || sb.s_to != 0 {
            report.line(format!("Compaction in progress from byte {} to byte {}", sb.s_from, sb.s_to));
        }
        if sb.s_start > sb.s_end {
            report.warn(format!("Data start {} lies beyond volume end {}", sb.s_start, sb.s_end));
        }
        let partition_bytes = partition.size_bytes(source.info().sector_size);
        if bytes > partition_bytes {
            report.warn(format!("Volume claims {} bytes but the partition holds {}", bytes, partition_bytes));
        }

        let mut metadata = NormalizedMetadata::new("BFS").with_volume_name(volume);
        metadata.cluster_size = BFS_BLOCK_SIZE;
        metadata.clusters = bytes / BFS_BLOCK_SIZE as u64;

        Ok(FilesystemInfo { report, metadata })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::families::test_support::*;
    use relic_core::test_utils::ImageBuilder;
    use relic_core::FieldWriter;

    fn bfs_image(end: u32) -> ImageBuilder {
        let mut sb = FieldWriter::new(BfsSuperblock::SIZE, Endianness::Little);
        sb.u32(0, BFS_MAGIC)
            .u32(4, 0x1400)
            .u32(8, end)
            .bytes(28, b"stand")
            .bytes(34, b"boot");
        let mut image = ImageBuilder::new(512, 64);
        image.put(0, sb.as_bytes());
        image
    }

    #[test]
    fn test_boot_filesystem() {
        let image = bfs_image(64 * 512 - 1);
        assert_eq!(&image.bytes()[..4], &[0xCE, 0xFA, 0xAD, 0x1B]);
        assert!(identifies(&BfsFilesystem, &image));
        assert_magic_sensitive(&BfsFilesystem, &image, 0..4);
        assert_rejects_one_sector(&BfsFilesystem, &image);

        let info = assert_idempotent(&BfsFilesystem, &image);
        assert_eq!(info.metadata.clusters, 64);
        assert_eq!(info.metadata.volume_name.as_deref(), Some("boot"));
        assert!(!info.report.has_warnings());
        assert!(info.report.to_string().contains("Filesystem name: stand"));
    }

    #[test]
    fn test_oversized_volume_warns() {
        let image = bfs_image(128 * 512 - 1);
        let source = image.build();
        let info = BfsFilesystem.get_information(&source, &whole(&source), None).unwrap();
        assert_eq!(info.report.warnings().count(), 1);
    }
}
