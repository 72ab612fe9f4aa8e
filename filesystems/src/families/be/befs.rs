// Be File System (BeOS / Haiku)
// PowerPC volumes keep the superblock at byte 0, x86 volumes one 512-byte block
// later. Either way magic1 sits 0x20 into it and fixes the byte order.

use crate::families::{require_extent, AUTHOR};
use log::debug;
use relic_core::{
    read_bytes, Decode, Encoding, Endianness, FieldReader, Filesystem, FilesystemInfo,
    NormalizedMetadata, Partition, ReadOnlyFilesystem, RelicError, Report, Result, SectorSource,
    UnsupportedFilesystem,
};
use uuid::Uuid;

const BEFS_MAGIC1: u32 = 0x4246_5331;
const BEFS_MAGIC2: u32 = 0xDD12_1031;
const BEFS_MAGIC3: u32 = 0x15B6_830E;
const BEFS_ENDIAN: u32 = 0x4249_4745;
const BEFS_CLEAN: u32 = 0x434C_454E;
const BEFS_DIRTY: u32 = 0x4449_5254;

const SUPERBLOCK_CANDIDATES: [u64; 2] = [0x000, 0x200];
const MAGIC1_OFFSET: usize = 0x20;

/// Extent address: allocation group, start block, length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRun {
    pub allocation_group: i32,
    pub start: u16,
    pub len: u16,
}

impl BlockRun {
    fn read(r: &FieldReader<'_>, offset: usize) -> Result<Self> {
        Ok(Self {
            allocation_group: r.i32(offset)?,
            start: r.u16(offset + 4)?,
            len: r.u16(offset + 6)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BefsSuperblock {
    pub name: [u8; 32],
    pub magic1: u32,
    pub fs_byte_order: u32,
    pub block_size: u32,
    pub block_shift: u32,
    pub num_blocks: i64,
    pub used_blocks: i64,
    pub inode_size: i32,
    pub magic2: u32,
    pub blocks_per_ag: i32,
    pub ag_shift: i32,
    pub num_ags: i32,
    pub flags: u32,
    pub log_blocks: BlockRun,
    pub log_start: i64,
    pub log_end: i64,
    pub magic3: u32,
    pub root_dir: BlockRun,
    pub indices: BlockRun,
}

impl Decode for BefsSuperblock {
    const SIZE: usize = 132;

    fn decode(bytes: &[u8], endianness: Endianness) -> Result<Self> {
        let r = FieldReader::new(bytes, Self::SIZE, endianness)?;
        Ok(Self {
            name: r.bytes::<32>(0)?,
            magic1: r.u32(MAGIC1_OFFSET)?,
            fs_byte_order: r.u32(36)?,
            block_size: r.u32(40)?,
            block_shift: r.u32(44)?,
            num_blocks: r.i64(48)?,
            used_blocks: r.i64(56)?,
            inode_size: r.i32(64)?,
            magic2: r.u32(68)?,
            blocks_per_ag: r.i32(72)?,
            ag_shift: r.i32(76)?,
            num_ags: r.i32(80)?,
            flags: r.u32(84)?,
            log_blocks: BlockRun::read(&r, 88)?,
            log_start: r.i64(96)?,
            log_end: r.i64(104)?,
            magic3: r.u32(112)?,
            root_dir: BlockRun::read(&r, 116)?,
            indices: BlockRun::read(&r, 124)?,
        })
    }
}

pub struct BefsFilesystem;

impl BefsFilesystem {
    fn read_superblock(
        source: &dyn SectorSource,
        partition: &Partition,
    ) -> Result<(BefsSuperblock, Endianness, u64)> {
        require_extent(source, partition, 0, 1024)?;
        for offset in SUPERBLOCK_CANDIDATES {
            let raw = read_bytes(source, partition, offset, BefsSuperblock::SIZE)?;
            if let Some(endianness) = Endianness::probe_u32(&raw, MAGIC1_OFFSET, BEFS_MAGIC1) {
                debug!("befs: superblock at byte {:#x}, {}", offset, endianness);
                return Ok((BefsSuperblock::decode(&raw, endianness)?, endianness, offset));
            }
        }
        Err(RelicError::mismatch("BeFS magic1"))
    }
}

impl Filesystem for BefsFilesystem {
    fn name(&self) -> &'static str {
        "Be Filesystem"
    }

    fn id(&self) -> Uuid {
        Uuid::from_u128(0xdc8572b3_b6ad_46e4_8de9_cbe123cb5f11)
    }

    fn author(&self) -> &'static str {
        AUTHOR
    }

    fn default_encoding(&self) -> Encoding {
        Encoding::Utf8
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
        let (sb, endianness, offset) = Self::read_superblock(source, partition)?;
        let name = encoding.decode_c_string(&sb.name);
        let free = sb.num_blocks.saturating_sub(sb.used_blocks).max(0) as u64;

        let mut report = Report::new();
        report
            .line(match endianness {
                Endianness::Little => "Little-endian BeFS",
                Endianness::Big => "Big-endian BeFS",
            })
            .line(format!("Superblock found at byte {}", offset))
            .line(format!("{} bytes per block", sb.block_size))
            .line(format!(
                "{} blocks in volume ({} bytes)",
                sb.num_blocks,
                sb.num_blocks.max(0) as u64 * sb.block_size as u64
            ))
            .line(format!(
                "{} used blocks ({} bytes)",
                sb.used_blocks,
                sb.used_blocks.max(0) as u64 * sb.block_size as u64
            ))
            .line(format!("{} bytes per i-node", sb.inode_size))
            .line(format!(
                "{} blocks per allocation group ({} bytes)",
                sb.blocks_per_ag,
                sb.blocks_per_ag.max(0) as u64 * sb.block_size as u64
            ))
            .line(format!("{} allocation groups in volume", sb.num_ags))
            .line(format!(
                "Journal resides in block {} of allocation group {} and runs for {} blocks",
                sb.log_blocks.start, sb.log_blocks.allocation_group, sb.log_blocks.len
            ))
            .line(format!("Journal starts in byte {} and ends in byte {}", sb.log_start, sb.log_end))
            .line(format!(
                "Root folder's i-node resides in block {} of allocation group {} and runs for {} blocks",
                sb.root_dir.start, sb.root_dir.allocation_group, sb.root_dir.len
            ))
            .line(format!(
                "Indices' i-node resides in block {} of allocation group {} and runs for {} blocks",
                sb.indices.start, sb.indices.allocation_group, sb.indices.len
            ))
            .field("Volume name", &name);

        let dirty = sb.flags == BEFS_DIRTY || sb.log_start != sb.log_end;
        match sb.flags {
            BEFS_CLEAN => report.line(if sb.log_start == sb.log_end {
                "Filesystem is clean"
            } else {
                "Filesystem is dirty"
            }),
            BEFS_DIRTY => report.line("Filesystem is dirty"),
            other => report.line(format!("Unknown flags: {:#010X}", other)),
        };

        if sb.magic2 != BEFS_MAGIC2 || sb.magic3 != BEFS_MAGIC3 {
            report.warn(format!(
                "Secondary magics are 0x{:08X}/0x{:08X}, expected 0x{:08X}/0x{:08X}",
                sb.magic2, sb.magic3, BEFS_MAGIC2, BEFS_MAGIC3
            ));
        }
        if sb.fs_byte_order != BEFS_ENDIAN {
            report.warn(format!("Byte order marker 0x{:08X} does not match the magic", sb.fs_byte_order));
        }
        if sb.block_shift >= 32 || sb.block_size != 1u32 << sb.block_shift {
            report.warn(format!(
                "Block size {} does not match block shift {}",
                sb.block_size, sb.block_shift
            ));
        }

        let mut metadata = NormalizedMetadata::new("BeFS").with_volume_name(name);
        metadata.cluster_size = sb.block_size;
        metadata.clusters = sb.num_blocks.max(0) as u64;
        metadata.free_clusters = Some(free);
        metadata.dirty = dirty;

        Ok(FilesystemInfo { report, metadata })
    }

    fn read_only(&self) -> Option<Box<dyn ReadOnlyFilesystem>> {
        Some(Box::new(UnsupportedFilesystem))
    }
}
