// Apple ProDOS
// The volume directory key block is block 2. There is no magic number, so a match
// needs the storage type nibble and both fixed entry-size bytes together.

use crate::families::{require_extent, AUTHOR};
use log::debug;
use relic_core::dates::prodos_to_datetime;
use relic_core::{
    read_bytes, Decode, Encoding, Endianness, FieldReader, Filesystem, FilesystemInfo,
    NormalizedMetadata, Partition, RelicError, Report, Result, SectorSource,
};
use uuid::Uuid;

const PRODOS_BLOCK: u64 = 512;
const VOLUME_DIRECTORY_BLOCK: u64 = 2;
const VOLUME_DIRECTORY_TYPE: u8 = 0x0F;
const ENTRY_LENGTH: u8 = 0x27;
const ENTRIES_PER_BLOCK: u8 = 0x0D;
const BOOT_LOADER_SECTORS: u8 = 0x01;
const LOWERCASE_VALID: u16 = 0x8000;

const ACCESS_DESTROY: u8 = 0x80;
const ACCESS_RENAME: u8 = 0x40;
const ACCESS_BACKUP: u8 = 0x20;
const ACCESS_WRITE: u8 = 0x02;
const ACCESS_READ: u8 = 0x01;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProdosVolumeDirectoryHeader {
    pub prev_block: u16,
    pub next_block: u16,
    pub storage_type: u8,
    pub name_length: u8,
    pub name: [u8; 15],
    pub case_bits: u16,
    pub creation_date: u16,
    pub creation_time: u16,
    pub version: u8,
    pub min_version: u8,
    pub access: u8,
    pub entry_length: u8,
    pub entries_per_block: u8,
    pub file_count: u16,
    pub bitmap_block: u16,
    pub total_blocks: u16,
}

impl Decode for ProdosVolumeDirectoryHeader {
    const SIZE: usize = 43;

    fn decode(bytes: &[u8], endianness: Endianness) -> Result<Self> {
        let r = FieldReader::new(bytes, Self::SIZE, endianness)?;
        let storage = r.u8(4)?;
        Ok(Self {
            prev_block: r.u16(0)?,
            next_block: r.u16(2)?,
            storage_type: storage >> 4,
            name_length: storage & 0x0F,
            name: r.bytes::<15>(5)?,
            case_bits: r.u16(26)?,
            creation_date: r.u16(28)?,
            creation_time: r.u16(30)?,
            version: r.u8(32)?,
            min_version: r.u8(33)?,
            access: r.u8(34)?,
            entry_length: r.u8(35)?,
            entries_per_block: r.u8(36)?,
            file_count: r.u16(37)?,
            bitmap_block: r.u16(39)?,
            total_blocks: r.u16(41)?,
        })
    }
}

impl ProdosVolumeDirectoryHeader {
    /// Volume name with GS/OS lowercase bits applied.
    fn volume_name(&self, encoding: Encoding) -> String {
        let raw = &self.name[..self.name_length as usize];
        let name = encoding.decode(raw);
        if self.case_bits & LOWERCASE_VALID == 0 {
            return name;
        }
        name.chars()
            .enumerate()
            .map(|(i, c)| {
                if i < 15 && self.case_bits & (0x4000 >> i) != 0 {
                    c.to_ascii_lowercase()
                } else {
                    c
                }
            })
            .collect()
    }
}

pub struct ProdosFilesystem;

impl ProdosFilesystem {
    fn read_header(source: &dyn SectorSource, partition: &Partition) -> Result<ProdosVolumeDirectoryHeader> {
        require_extent(source, partition, 0, (VOLUME_DIRECTORY_BLOCK + 1) * PRODOS_BLOCK)?;
        let raw = read_bytes(
            source,
            partition,
            VOLUME_DIRECTORY_BLOCK * PRODOS_BLOCK,
            ProdosVolumeDirectoryHeader::SIZE,
        )?;
        let header = ProdosVolumeDirectoryHeader::decode(&raw, Endianness::Little)?;
        if header.prev_block != 0
            || header.storage_type != VOLUME_DIRECTORY_TYPE
            || header.name_length == 0
            || header.entry_length != ENTRY_LENGTH
            || header.entries_per_block != ENTRIES_PER_BLOCK
        {
            return Err(RelicError::mismatch("ProDOS volume directory header"));
        }
        if header.bitmap_block > header.total_blocks {
            return Err(RelicError::mismatch("ProDOS bitmap past end of volume"));
        }
        Ok(header)
    }

    /// Count set bits in the volume bitmap, or None when the bitmap lies outside the partition.
    fn free_blocks(
        source: &dyn SectorSource,
        partition: &Partition,
        header: &ProdosVolumeDirectoryHeader,
    ) -> Result<Option<u64>> {
        let total = header.total_blocks as usize;
        let bitmap_bytes = total.div_ceil(8);
        let offset = header.bitmap_block as u64 * PRODOS_BLOCK;
        let available = partition.size_bytes(source.info().sector_size);
        if header.bitmap_block == 0 || offset + bitmap_bytes as u64 > available {
            debug!("prodos: bitmap at block {} not readable", header.bitmap_block);
            return Ok(None);
        }
        let bitmap = read_bytes(source, partition, offset, bitmap_bytes)?;
        let free = (0..total)
            .filter(|block| bitmap[block / 8] & (0x80 >> (block % 8)) != 0)
            .count();
        Ok(Some(free as u64))
    }
}

impl Filesystem for ProdosFilesystem {
    fn name(&self) -> &'static str {
        "ProDOS filesystem"
    }

    fn id(&self) -> Uuid {
        Uuid::from_u128(0x43874265_7403_4eb8_a6e2_f1b7a3c5d901)
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
        let name = header.volume_name(encoding);
        let created = prodos_to_datetime(header.creation_date, header.creation_time);
        let boot = read_bytes(source, partition, 0, 1)?[0] == BOOT_LOADER_SECTORS;
        let free = Self::free_blocks(source, partition, &header)?;

        let mut report = Report::new();
        report
            .line("ProDOS")
            .field("Volume name", &name);
        if let Some(created) = created {
            report.field("Volume created on", created.format("%Y-%m-%d %H:%M"));
        }
        report
            .line(format!("Volume created by ProDOS version {}", header.version))
            .line(format!("Volume requires at least ProDOS version {}", header.min_version))
            .line(format!("{} files in root directory", header.file_count))
            .line(format!("Volume bitmap starts at block {}", header.bitmap_block))
            .line(format!("{} blocks in volume", header.total_blocks));
        if let Some(free) = free {
            report.line(format!("{} blocks free", free));
        }
        for (flag, text) in [
            (ACCESS_READ, "Volume can be read"),
            (ACCESS_WRITE, "Volume can be written"),
            (ACCESS_RENAME, "Volume can be renamed"),
            (ACCESS_DESTROY, "Volume can be destroyed"),
            (ACCESS_BACKUP, "Volume must be backed up"),
        ] {
            if header.access & flag != 0 {
                report.line(text);
            }
        }
        if boot {
            report.line("Volume has a boot loader");
        }

        let partition_blocks = partition.size_bytes(source.info().sector_size) / PRODOS_BLOCK;
        if header.total_blocks as u64 > partition_blocks {
            report.warn(format!(
                "Volume claims {} blocks but the partition holds {}",
                header.total_blocks, partition_blocks
            ));
        }

        let mut metadata = NormalizedMetadata::new("ProDOS").with_volume_name(name);
        metadata.cluster_size = PRODOS_BLOCK as u32;
        metadata.clusters = header.total_blocks as u64;
        metadata.free_clusters = free;
        metadata.files = Some(header.file_count as u64);
        metadata.creation_date = created;
        metadata.bootable = boot;

        Ok(FilesystemInfo { report, metadata })
    }
}
