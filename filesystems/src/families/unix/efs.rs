// SGI Extent File System (EFS)
// Big-endian superblock in basic block 1. The checksum rotates an XOR of the
// 16-bit words preceding it.

use crate::families::{require_extent, AUTHOR};
use relic_core::dates::unix_to_datetime;
use relic_core::{
    read_bytes, Decode, Encoding, Endianness, FieldReader, Filesystem, FilesystemInfo,
    NormalizedMetadata, Partition, RelicError, Report, Result, SectorSource,
};
use uuid::Uuid;

const SUPERBLOCK_OFFSET: u64 = 512;
const EFS_BASIC_BLOCK: u32 = 512;
const EFS_MAGIC: u32 = 0x0007_2959;
const EFS_MAGIC_NEW: u32 = 0x0007_295A;
const CHECKSUM_OFFSET: usize = 88;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EfsSuperblock {
    pub fs_size: i32,
    pub fs_firstcg: i32,
    pub fs_cgfsize: i32,
    pub fs_cgisize: i16,
    pub fs_sectors: i16,
    pub fs_heads: i16,
    pub fs_ncg: i16,
    pub fs_dirty: i16,
    pub fs_time: i32,
    pub fs_magic: u32,
    pub fs_fname: [u8; 6],
    pub fs_fpack: [u8; 6],
    pub fs_bmsize: i32,
    pub fs_tfree: i32,
    pub fs_tinode: i32,
    pub fs_bmblock: i32,
    pub fs_replsb: i32,
    pub fs_lastialloc: i32,
    pub fs_checksum: u32,
}

impl Decode for EfsSuperblock {
    const SIZE: usize = 92;

    fn decode(bytes: &[u8], endianness: Endianness) -> Result<Self> {
        let r = FieldReader::new(bytes, Self::SIZE, endianness)?;
        Ok(Self {
            fs_size: r.i32(0)?,
            fs_firstcg: r.i32(4)?,
            fs_cgfsize: r.i32(8)?,
            fs_cgisize: r.i16(12)?,
            fs_sectors: r.i16(14)?,
            fs_heads: r.i16(16)?,
            fs_ncg: r.i16(18)?,
            fs_dirty: r.i16(20)?,
            fs_time: r.i32(24)?,
            fs_magic: r.u32(28)?,
            fs_fname: r.bytes::<6>(32)?,
            fs_fpack: r.bytes::<6>(38)?,
            fs_bmsize: r.i32(44)?,
            fs_tfree: r.i32(48)?,
            fs_tinode: r.i32(52)?,
            fs_bmblock: r.i32(56)?,
            fs_replsb: r.i32(60)?,
            fs_lastialloc: r.i32(64)?,
            fs_checksum: r.u32(CHECKSUM_OFFSET)?,
        })
    }
}

/// XOR each big-endian word into the sum, then rotate left by one.
pub fn efs_checksum(bytes: &[u8]) -> u32 {
    bytes[..CHECKSUM_OFFSET.min(bytes.len())]
        .chunks_exact(2)
        .fold(0u32, |sum, w| (sum ^ u16::from_be_bytes([w[0], w[1]]) as u32).rotate_left(1))
}

pub struct EfsFilesystem;

impl EfsFilesystem {
    fn read_superblock(source: &dyn SectorSource, partition: &Partition) -> Result<(EfsSuperblock, Vec<u8>)> {
        require_extent(source, partition, 0, SUPERBLOCK_OFFSET + EFS_BASIC_BLOCK as u64)?;
        let raw = read_bytes(source, partition, SUPERBLOCK_OFFSET, EfsSuperblock::SIZE)?;
        let sb = EfsSuperblock::decode(&raw, Endianness::Big)?;
        if sb.fs_magic != EFS_MAGIC && sb.fs_magic != EFS_MAGIC_NEW {
            return Err(RelicError::mismatch("EFS magic"));
        }
        Ok((sb, raw))
    }
}

impl Filesystem for EfsFilesystem {
    fn name(&self) -> &'static str {
        "Extent File System Plugin"
    }

    fn id(&self) -> Uuid {
        Uuid::from_u128(0x52a43f90_9af0_4b9a_a4f4_1e6d3c8b2f08)
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
        let (sb, raw) = Self::read_superblock(source, partition)?;
        let fname = encoding.decode_padded(&sb.fs_fname);
        let fpack = encoding.decode_padded(&sb.fs_fpack);
        let modified = unix_to_datetime(sb.fs_time as i64);

        let mut report = Report::new();
        report.line("SGI extent filesystem");
        if sb.fs_magic == EFS_MAGIC_NEW {
            report.line("New version");
        }
        report
            .line(format!("Filesystem size: {} basic blocks", sb.fs_size))
            .line(format!("First cylinder group starts at block {}", sb.fs_firstcg))
            .line(format!("Cylinder group size: {} basic blocks", sb.fs_cgfsize))
            .line(format!("{} inodes per cylinder group", sb.fs_cgisize))
            .line(format!("{} sectors per track", sb.fs_sectors))
            .line(format!("{} heads per cylinder", sb.fs_heads))
            .line(format!("{} cylinder groups", sb.fs_ncg));
        if let Some(modified) = modified {
            report.field("Volume last modified on", modified.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        report
            .line(format!("{} free blocks", sb.fs_tfree))
            .line(format!("{} free inodes", sb.fs_tinode))
            .line(format!("Bitmap resides at block {}, size {} bytes", sb.fs_bmblock, sb.fs_bmsize))
            .line(format!("Replacement superblock resides at block {}", sb.fs_replsb))
            .line(format!("Last inode allocated: {}", sb.fs_lastialloc))
            .field("Volume name", &fname)
            .field("Volume pack", &fpack);
        if sb.fs_dirty != 0 {
            report.line("Volume is dirty");
        }

        let computed = efs_checksum(&raw);
        if computed != sb.fs_checksum {
            report.warn(format!(
                "Superblock checksum 0x{:08X} does not match computed 0x{:08X}",
                sb.fs_checksum, computed
            ));
        }

        let mut metadata = NormalizedMetadata::new("Extent File System").with_volume_name(fname);
        metadata.cluster_size = EFS_BASIC_BLOCK;
        metadata.clusters = sb.fs_size.max(0) as u64;
        metadata.free_clusters = Some(sb.fs_tfree.max(0) as u64);
        metadata.modification_date = modified;
        metadata.dirty = sb.fs_dirty != 0;

        Ok(FilesystemInfo { report, metadata })
    }
}
