// Sector-addressable media and partitions
// Every descriptor reads through SectorSource; nothing here caches or writes.

use crate::error::{RelicError, Result};
use log::trace;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Mutex;

/// Geometry of a sector-addressable medium
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub sector_size: u32,
    pub total_sectors: u64,
}

impl MediaInfo {
    pub fn total_bytes(&self) -> u64 {
        self.total_sectors * self.sector_size as u64
    }
}

/// Read-only access to a block device or image.
///
/// Reads beyond the end of the medium must fail with `RelicError::OutOfRange`
/// so that probes can tell truncation apart from a broken medium.
pub trait SectorSource {
    fn info(&self) -> MediaInfo;

    fn read_sectors(&self, lba: u64, count: u64) -> Result<Vec<u8>>;

    fn read_sector(&self, lba: u64) -> Result<Vec<u8>> {
        self.read_sectors(lba, 1)
    }
}

/// Inclusive range of logical blocks on a medium
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub start: u64,
    pub end: u64,
}

impl Partition {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Partition spanning the whole medium (empty if the medium is).
    pub fn whole(info: &MediaInfo) -> Self {
        if info.total_sectors == 0 {
            // end < start encodes an empty range
            Self { start: 1, end: 0 }
        } else {
            Self { start: 0, end: info.total_sectors - 1 }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    /// Number of sectors covered.
    pub fn size(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.end - self.start + 1
        }
    }

    pub fn size_bytes(&self, sector_size: u32) -> u64 {
        self.size() * sector_size as u64
    }

    /// True when the partition covers fewer than `sectors` sectors.
    pub fn shorter_than(&self, sectors: u64) -> bool {
        self.size() < sectors
    }
}

/// Read `len` bytes starting `offset` bytes into the partition.
///
/// Only the sectors that cover the requested range are read.
pub fn read_bytes(
    source: &dyn SectorSource,
    partition: &Partition,
    offset: u64,
    len: usize,
) -> Result<Vec<u8>> {
    if len == 0 {
        return Ok(Vec::new());
    }

    let sector_size = source.info().sector_size as u64;
    if sector_size == 0 {
        return Err(RelicError::InvalidArgument("medium reports zero sector size".to_string()));
    }

    let first = offset / sector_size;
    let last = (offset + len as u64 - 1) / sector_size;
    let count = last - first + 1;

    if first + count > partition.size() {
        return Err(RelicError::OutOfRange {
            lba: partition.start + first,
            count,
            total: partition.size(),
        });
    }

    trace!(
        "Reading {} bytes at partition offset {:#x} ({} sector(s) from LBA {})",
        len,
        offset,
        count,
        partition.start + first
    );

    let data = source.read_sectors(partition.start + first, count)?;
    let skip = (offset % sector_size) as usize;
    if data.len() < skip + len {
        return Err(RelicError::Truncated { needed: skip + len, available: data.len() });
    }

    Ok(data[skip..skip + len].to_vec())
}

/// Medium backed by a byte vector
#[derive(Debug, Clone)]
pub struct MemorySectorSource {
    data: Vec<u8>,
    sector_size: u32,
}

impl MemorySectorSource {
    /// A trailing partial sector is ignored.
    pub fn new(data: Vec<u8>, sector_size: u32) -> Self {
        Self { data, sector_size }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl SectorSource for MemorySectorSource {
    fn info(&self) -> MediaInfo {
        let total_sectors = if self.sector_size == 0 {
            0
        } else {
            self.data.len() as u64 / self.sector_size as u64
        };
        MediaInfo { sector_size: self.sector_size, total_sectors }
    }

    fn read_sectors(&self, lba: u64, count: u64) -> Result<Vec<u8>> {
        let info = self.info();
        if lba.checked_add(count).map_or(true, |end| end > info.total_sectors) {
            return Err(RelicError::OutOfRange { lba, count, total: info.total_sectors });
        }

        let start = (lba * self.sector_size as u64) as usize;
        let end = start + (count * self.sector_size as u64) as usize;
        Ok(self.data[start..end].to_vec())
    }
}

/// Medium backed by a raw image file
pub struct FileSectorSource {
    file: Mutex<File>,
    info: MediaInfo,
}

impl FileSectorSource {
    pub fn open(path: &Path, sector_size: u32) -> Result<Self> {
        if sector_size == 0 {
            return Err(RelicError::InvalidArgument("sector size must be non-zero".to_string()));
        }

        let file = File::open(path)?;
        let len = file.metadata()?.len();
        let info = MediaInfo {
            sector_size,
            total_sectors: len / sector_size as u64,
        };

        log::debug!(
            "Opened image {} ({} sectors of {} bytes)",
            path.display(),
            info.total_sectors,
            sector_size
        );

        Ok(Self { file: Mutex::new(file), info })
    }
}

impl SectorSource for FileSectorSource {
    fn info(&self) -> MediaInfo {
        self.info
    }

    fn read_sectors(&self, lba: u64, count: u64) -> Result<Vec<u8>> {
        if lba.checked_add(count).map_or(true, |end| end > self.info.total_sectors) {
            return Err(RelicError::OutOfRange { lba, count, total: self.info.total_sectors });
        }

        let sector_size = self.info.sector_size as u64;
        let mut buffer = vec![0u8; (count * sector_size) as usize];

        let mut file = self
            .file
            .lock()
            .map_err(|_| RelicError::IoError(std::io::Error::new(std::io::ErrorKind::Other, "image lock poisoned")))?;
        file.seek(SeekFrom::Start(lba * sector_size))?;
        file.read_exact(&mut buffer)?;

        Ok(buffer)
    }
}
