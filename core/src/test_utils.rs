/// Test utilities for building synthetic volume images
use crate::device::{MediaInfo, MemorySectorSource, SectorSource};
use crate::error::{RelicError, Result};
use std::io;

/// Zero-filled image that records are written into at byte offsets
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    data: Vec<u8>,
    sector_size: u32,
}

impl ImageBuilder {
    pub fn new(sector_size: u32, sectors: u64) -> Self {
        Self {
            data: vec![0u8; sector_size as usize * sectors as usize],
            sector_size,
        }
    }

    /// Copy `bytes` to `offset`, growing the image if needed.
    pub fn put(&mut self, offset: usize, bytes: &[u8]) -> &mut Self {
        let end = offset + bytes.len();
        if end > self.data.len() {
            let sector = self.sector_size as usize;
            self.data.resize(end.div_ceil(sector) * sector, 0);
        }
        self.data[offset..end].copy_from_slice(bytes);
        self
    }

    pub fn fill(&mut self, offset: usize, len: usize, value: u8) -> &mut Self {
        self.data[offset..offset + len].fill(value);
        self
    }

    pub fn flip(&mut self, offset: usize) -> &mut Self {
        self.data[offset] ^= 0xFF;
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn build(&self) -> MemorySectorSource {
        MemorySectorSource::new(self.data.clone(), self.sector_size)
    }
}

/// Medium whose every read fails with an I/O error
#[derive(Debug, Clone, Copy)]
pub struct FailingSectorSource {
    info: MediaInfo,
}

impl FailingSectorSource {
    pub fn new(sector_size: u32, total_sectors: u64) -> Self {
        Self { info: MediaInfo { sector_size, total_sectors } }
    }
}

impl SectorSource for FailingSectorSource {
    fn info(&self) -> MediaInfo {
        self.info
    }

    fn read_sectors(&self, lba: u64, _count: u64) -> Result<Vec<u8>> {
        Err(RelicError::IoError(io::Error::new(
            io::ErrorKind::Other,
            format!("simulated read failure at LBA {}", lba),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_grows_to_whole_sectors() {
        let mut image = ImageBuilder::new(512, 1);
        image.put(1000, b"END");
        assert_eq!(image.bytes().len(), 1024);
        assert_eq!(image.build().info().total_sectors, 2);
    }
}
