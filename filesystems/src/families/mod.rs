// Filesystem Families Organization
// Groups descriptors by the platform or vendor that introduced them

pub mod amiga;
pub mod apple;
pub mod be;
pub mod console;
pub mod dec;
pub mod embedded;
pub mod hp;
pub mod ibm;
pub mod misc;
pub mod optical;
pub mod unix;

use log::trace;
use relic_core::{Partition, RelicError, Result, SectorSource};

pub(crate) const AUTHOR: &str = "Relic Team";

/// Reject media and partitions too small to hold a format before reading anything.
///
/// `min_bytes` is the partition extent the format's control structures need.
/// Single-sector partitions never hold a volume.
pub(crate) fn require_extent(
    source: &dyn SectorSource,
    partition: &Partition,
    min_sector_size: u32,
    min_bytes: u64,
) -> Result<()> {
    let sector_size = source.info().sector_size;
    if partition.shorter_than(2) {
        return Err(RelicError::mismatch("partition holds fewer than two sectors"));
    }
    if sector_size < min_sector_size {
        return Err(RelicError::mismatch(format!(
            "sector size {} below minimum {}",
            sector_size, min_sector_size
        )));
    }
    if partition.size_bytes(sector_size) < min_bytes {
        trace!(
            "Partition of {} sector(s) shorter than {} bytes",
            partition.size(),
            min_bytes
        );
        return Err(RelicError::mismatch("partition too small"));
    }
    Ok(())
}

/// Debug rendering of an unrecognised signature.
pub(crate) fn magic_hex(bytes: &[u8]) -> String {
    hex::encode(&bytes[..bytes.len().min(16)])
}

#[cfg(test)]
pub(crate) mod test_support {
    use relic_core::test_utils::ImageBuilder;
    use relic_core::{Filesystem, MemorySectorSource, Partition, SectorSource};

    pub fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    pub fn whole(source: &MemorySectorSource) -> Partition {
        Partition::whole(&source.info())
    }

    pub fn identifies(fs: &dyn Filesystem, image: &ImageBuilder) -> bool {
        let source = image.build();
        fs.identify(&source, &whole(&source)).unwrap()
    }

    /// Flipping any single byte in `range` must defeat identification.
    pub fn assert_magic_sensitive(fs: &dyn Filesystem, image: &ImageBuilder, range: std::ops::Range<usize>) {
        for offset in range {
            let mut corrupt = image.clone();
            corrupt.flip(offset);
            assert!(!identifies(fs, &corrupt), "{} still matched with byte {:#x} flipped", fs.name(), offset);
        }
    }

    /// A single-sector partition is never enough.
    pub fn assert_rejects_one_sector(fs: &dyn Filesystem, image: &ImageBuilder) {
        let source = image.build();
        assert!(!fs.identify(&source, &Partition::new(0, 0)).unwrap());
    }

    /// Two calls on the same input give identical output.
    pub fn assert_idempotent(fs: &dyn Filesystem, image: &ImageBuilder) -> relic_core::FilesystemInfo {
        let source = image.build();
        let partition = whole(&source);
        let first = fs.get_information(&source, &partition, None).unwrap();
        let second = fs.get_information(&source, &partition, None).unwrap();
        assert_eq!(first.report.to_string(), second.report.to_string());
        assert_eq!(first.metadata, second.metadata);
        first
    }
}
