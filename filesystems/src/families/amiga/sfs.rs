// Amiga SmartFileSystem
// Big-endian root block at offset 0. Every SFS block starts with the same header:
// id, checksum and own block number. A block is intact when one plus the sum of
// all its longwords is zero.

use crate::families::{magic_hex, require_extent, AUTHOR};
use log::debug;
use relic_core::dates::amiga_to_datetime;
use relic_core::decoder::word_sum32;
use relic_core::{
    read_bytes, Decode, Encoding, Endianness, FieldReader, Filesystem, FilesystemInfo,
    NormalizedMetadata, Partition, RelicError, Report, Result, SectorSource,
};
use uuid::Uuid;

/// "SFS\0"
pub const SFS_MAGIC: u32 = 0x5346_5300;
/// "SFS\x02", the root block id of SmartFileSystem 2 volumes
pub const SFS2_MAGIC: u32 = 0x5346_5302;
const MIN_BLOCK_SIZE: u32 = 128;
const MAX_BLOCK_SIZE: u32 = 32768;

const FLAG_CASE_SENSITIVE: u8 = 0x80;
const FLAG_RECYCLED_FOLDER: u8 = 0x40;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SfsRootBlock {
    pub id: u32,
    pub checksum: u32,
    pub own_block: u32,
    pub version: u16,
    pub sequence_number: u16,
    pub date_created: u32,
    pub bits: u8,
    pub first_byte: u64,
    pub last_byte: u64,
    pub total_blocks: u32,
    pub block_size: u32,
    pub bitmap_base: u32,
    pub admin_space_container: u32,
    pub root_object_container: u32,
    pub extent_bnode_root: u32,
    pub object_node_root: u32,
}

impl Decode for SfsRootBlock {
    const SIZE: usize = 128;

    fn decode(bytes: &[u8], endianness: Endianness) -> Result<Self> {
        let r = FieldReader::new(bytes, Self::SIZE, endianness)?;
        Ok(Self {
            id: r.u32(0)?,
            checksum: r.u32(4)?,
            own_block: r.u32(8)?,
            version: r.u16(12)?,
            sequence_number: r.u16(14)?,
            date_created: r.u32(16)?,
            bits: r.u8(20)?,
            first_byte: r.u64(32)?,
            last_byte: r.u64(40)?,
            total_blocks: r.u32(48)?,
            block_size: r.u32(52)?,
            bitmap_base: r.u32(96)?,
            admin_space_container: r.u32(100)?,
            root_object_container: r.u32(104)?,
            extent_bnode_root: r.u32(108)?,
            object_node_root: r.u32(112)?,
        })
    }
}

impl SfsRootBlock {
    pub fn is_sfs2(&self) -> bool {
        self.id == SFS2_MAGIC
    }
}

/// One plus the wrapping sum of the block's longwords; zero for an intact block.
pub fn block_checksum(block: &[u8]) -> u32 {
    word_sum32(block, Endianness::Big).wrapping_add(1)
}

pub struct SfsFilesystem;

impl SfsFilesystem {
    fn read_root_block(source: &dyn SectorSource, partition: &Partition) -> Result<SfsRootBlock> {
        require_extent(source, partition, 0, SfsRootBlock::SIZE as u64)?;
        let raw = read_bytes(source, partition, 0, SfsRootBlock::SIZE)?;
        let root = SfsRootBlock::decode(&raw, Endianness::Big)?;
        if root.id != SFS_MAGIC && root.id != SFS2_MAGIC {
            debug!("sfs: no magic, found {}", magic_hex(&raw[..4]));
            return Err(RelicError::mismatch("SFS root block id"));
        }
        Ok(root)
    }

    /// Checksum of the whole root block, or None when its declared size is unusable.
    fn verify(source: &dyn SectorSource, partition: &Partition, root: &SfsRootBlock) -> Result<Option<u32>> {
        let size = root.block_size;
        if !size.is_power_of_two()
            || !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&size)
            || size as u64 > partition.size_bytes(source.info().sector_size)
        {
            return Ok(None);
        }
        let block = read_bytes(source, partition, 0, size as usize)?;
        Ok(Some(block_checksum(&block)))
    }
}

impl Filesystem for SfsFilesystem {
    fn name(&self) -> &'static str {
        "SmartFileSystem"
    }

    fn id(&self) -> Uuid {
        Uuid::from_u128(0x26550c19_3671_4a2a_8b4f_3b9c4b1c7e05)
    }

    fn author(&self) -> &'static str {
        AUTHOR
    }

    fn detect(&self, source: &dyn SectorSource, partition: &Partition) -> Result<bool> {
        Self::read_root_block(source, partition).map(|_| true)
    }

    fn get_information(
        &self,
        source: &dyn SectorSource,
        partition: &Partition,
        _encoding: Option<Encoding>,
    ) -> Result<FilesystemInfo> {
        let root = Self::read_root_block(source, partition)?;
        let created = amiga_to_datetime(root.date_created);
        let sector_size = source.info().sector_size;

        let mut report = Report::new();
        report
            .line(if root.is_sfs2() { "SmartFileSystem 2" } else { "SmartFileSystem" })
            .line(format!("Volume version {}", root.version))
            .line(format!("Volume sequence number {}", root.sequence_number))
            .line(format!(
                "Volume has {} blocks of {} bytes",
                root.total_blocks, root.block_size
            ))
            .line(format!(
                "Volume starts on device byte {} and ends on byte {}",
                root.first_byte, root.last_byte
            ));
        if let Some(created) = created {
            report.field("Volume created on", created.format("%Y-%m-%d %H:%M:%S"));
        }
        if root.bits & FLAG_CASE_SENSITIVE != 0 {
            report.line("Volume is case sensitive");
        }
        if root.bits & FLAG_RECYCLED_FOLDER != 0 {
            report.line("Volume moves deleted files to a recycled folder");
        }

        match Self::verify(source, partition, &root)? {
            Some(0) => {}
            Some(sum) => {
                report.warn(format!("Root block checksum is off by 0x{:08X}", sum));
            }
            None => {
                report.warn(format!("Root block size {} is not usable", root.block_size));
            }
        }
        if root.block_size != sector_size {
            report.warn(format!(
                "Filesystem indicates {} bytes/block while device indicates {} bytes/sector",
                root.block_size, sector_size
            ));
        }
        if root.own_block != 0 {
            report.warn(format!("Root block claims to live at block {}", root.own_block));
        }

        let mut metadata = NormalizedMetadata::new("SmartFileSystem");
        metadata.cluster_size = root.block_size;
        metadata.clusters = root.total_blocks as u64;
        metadata.creation_date = created;

        Ok(FilesystemInfo { report, metadata })
    }
}
