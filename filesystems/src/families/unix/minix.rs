// Minix filesystem v1, v2 and v3
// Superblock at byte 1024. v1/v2 keep a 16-bit magic at +16, v3 moved it to +24.
// The magic also encodes the filename length; a byte-swapped magic means big-endian.

use crate::families::{require_extent, AUTHOR};
use log::debug;
use relic_core::{
    read_bytes, Decode, Encoding, Endianness, FieldReader, Filesystem, FilesystemInfo,
    NormalizedMetadata, Partition, RelicError, Report, Result, SectorSource,
};
use uuid::Uuid;

const SUPERBLOCK_OFFSET: u64 = 1024;
const MINIX_BLOCK_SIZE: u32 = 1024;

const MINIX_MAGIC: u16 = 0x137F;
const MINIX_MAGIC2: u16 = 0x138F;
const MINIX2_MAGIC: u16 = 0x2468;
const MINIX2_MAGIC2: u16 = 0x2478;
const MINIX3_MAGIC: u16 = 0x4D5A;

const MINIX_VALID_FS: u16 = 0x0001;
const MINIX_ERROR_FS: u16 = 0x0002;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinixVersion {
    V1,
    V2,
    V3,
}

/// v1/v2 superblock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinixSuperblock {
    pub ninodes: u16,
    pub nzones: u16,
    pub imap_blocks: u16,
    pub zmap_blocks: u16,
    pub firstdatazone: u16,
    pub log_zone_size: u16,
    pub max_size: u32,
    pub magic: u16,
    pub state: u16,
    pub zones: u32,
}

impl Decode for MinixSuperblock {
    const SIZE: usize = 24;

    fn decode(bytes: &[u8], endianness: Endianness) -> Result<Self> {
        let r = FieldReader::new(bytes, Self::SIZE, endianness)?;
        Ok(Self {
            ninodes: r.u16(0)?,
            nzones: r.u16(2)?,
            imap_blocks: r.u16(4)?,
            zmap_blocks: r.u16(6)?,
            firstdatazone: r.u16(8)?,
            log_zone_size: r.u16(10)?,
            max_size: r.u32(12)?,
            magic: r.u16(16)?,
            state: r.u16(18)?,
            zones: r.u32(20)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Minix3Superblock {
    pub ninodes: u32,
    pub imap_blocks: u16,
    pub zmap_blocks: u16,
    pub firstdatazone: u16,
    pub log_zone_size: u16,
    pub max_size: u32,
    pub zones: u32,
    pub magic: u16,
    pub blocksize: u16,
    pub disk_version: u8,
}

impl Decode for Minix3Superblock {
    const SIZE: usize = 32;

    fn decode(bytes: &[u8], endianness: Endianness) -> Result<Self> {
        let r = FieldReader::new(bytes, Self::SIZE, endianness)?;
        Ok(Self {
            ninodes: r.u32(0)?,
            imap_blocks: r.u16(6)?,
            zmap_blocks: r.u16(8)?,
            firstdatazone: r.u16(10)?,
            log_zone_size: r.u16(12)?,
            max_size: r.u32(16)?,
            zones: r.u32(20)?,
            magic: r.u16(24)?,
            blocksize: r.u16(28)?,
            disk_version: r.u8(30)?,
        })
    }
}

/// Fields common to every version, already widened
#[derive(Debug, Clone, PartialEq, Eq)]
struct MinixVolume {
    version: MinixVersion,
    endianness: Endianness,
    filename_len: u32,
    inodes: u64,
    zones: u64,
    zone_size: u64,
    firstdatazone: u64,
    max_size: u64,
    state: Option<u16>,
}

pub struct MinixFilesystem;

impl MinixFilesystem {
    fn read_volume(source: &dyn SectorSource, partition: &Partition) -> Result<MinixVolume> {
        require_extent(source, partition, 0, SUPERBLOCK_OFFSET + MINIX_BLOCK_SIZE as u64)?;
        let raw = read_bytes(source, partition, SUPERBLOCK_OFFSET, Minix3Superblock::SIZE)?;

        let v12 = [
            (MINIX_MAGIC, MinixVersion::V1, 14),
            (MINIX_MAGIC2, MinixVersion::V1, 30),
            (MINIX2_MAGIC, MinixVersion::V2, 14),
            (MINIX2_MAGIC2, MinixVersion::V2, 30),
        ];
        for (magic, version, filename_len) in v12 {
            if let Some(endianness) = Endianness::probe_u16(&raw, 16, magic) {
                let sb = MinixSuperblock::decode(&raw, endianness)?;
                let zones = match version {
                    MinixVersion::V1 => sb.nzones as u64,
                    _ => sb.zones as u64,
                };
                return Ok(MinixVolume {
                    version,
                    endianness,
                    filename_len,
                    inodes: sb.ninodes as u64,
                    zones,
                    zone_size: (MINIX_BLOCK_SIZE as u64) << sb.log_zone_size.min(16),
                    firstdatazone: sb.firstdatazone as u64,
                    max_size: sb.max_size as u64,
                    state: Some(sb.state),
                });
            }
        }

        if let Some(endianness) = Endianness::probe_u16(&raw, 24, MINIX3_MAGIC) {
            let sb = Minix3Superblock::decode(&raw, endianness)?;
            let block_size = if sb.blocksize == 0 { MINIX_BLOCK_SIZE as u64 } else { sb.blocksize as u64 };
            return Ok(MinixVolume {
                version: MinixVersion::V3,
                endianness,
                filename_len: 60,
                inodes: sb.ninodes as u64,
                zones: sb.zones as u64,
                zone_size: block_size << sb.log_zone_size.min(16),
                firstdatazone: sb.firstdatazone as u64,
                max_size: sb.max_size as u64,
                state: None,
            });
        }

        debug!("minix: no magic at +16 or +24");
        Err(RelicError::mismatch("minix magic"))
    }
}

impl Filesystem for MinixFilesystem {
    fn name(&self) -> &'static str {
        "Minix Filesystem"
    }

    fn id(&self) -> Uuid {
        Uuid::from_u128(0xfe248c3b_b147_4e0a_ba1f_0f8a5d3c6e05)
    }

    fn author(&self) -> &'static str {
        AUTHOR
    }

    fn detect(&self, source: &dyn SectorSource, partition: &Partition) -> Result<bool> {
        Self::read_volume(source, partition).map(|_| true)
    }

    fn get_information(
        &self,
        source: &dyn SectorSource,
        partition: &Partition,
        _encoding: Option<Encoding>,
    ) -> Result<FilesystemInfo> {
        let volume = Self::read_volume(source, partition)?;
        let (title, fs_type) = match volume.version {
            MinixVersion::V1 => ("Minix v1 filesystem", "Minix v1"),
            MinixVersion::V2 => ("Minix v2 filesystem", "Minix v2"),
            MinixVersion::V3 => ("Minix v3 filesystem", "Minix v3"),
        };

        let mut report = Report::new();
        report.line(title);
        if volume.endianness == Endianness::Big {
            report.line("Big-endian");
        }
        report
            .line(format!("{} chars in filename", volume.filename_len))
            .line(format!(
                "{} zones on volume ({} bytes)",
                volume.zones,
                volume.zones * volume.zone_size
            ))
            .line(format!("{} bytes/zone", volume.zone_size))
            .line(format!("{} inodes on volume", volume.inodes))
            .line(format!("First data zone: {}", volume.firstdatazone))
            .line(format!("{} bytes maximum in a file", volume.max_size));

        let mut metadata = NormalizedMetadata::new(fs_type);
        if let Some(state) = volume.state {
            if state & MINIX_VALID_FS == 0 {
                report.line("Volume was not cleanly unmounted");
                metadata.dirty = true;
            }
            if state & MINIX_ERROR_FS != 0 {
                report.line("Volume has errors");
                metadata.dirty = true;
            }
        }

        metadata.cluster_size = volume.zone_size as u32;
        metadata.clusters = volume.zones;
        metadata.files = Some(volume.inodes);

        Ok(FilesystemInfo { report, metadata })
    }
}
