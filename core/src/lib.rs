pub mod dates;
pub mod decoder;
pub mod device;
pub mod encoding;
pub mod error;
pub mod filesystem;
pub mod metadata;
pub mod readonly;
pub mod registry;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use decoder::{Decode, Endianness, FieldReader, FieldWriter};
pub use device::{read_bytes, FileSectorSource, MediaInfo, MemorySectorSource, Partition, SectorSource};
pub use encoding::Encoding;
pub use error::{RelicError, Result};
pub use filesystem::{Filesystem, FilesystemInfo, Report};
pub use metadata::NormalizedMetadata;
pub use readonly::{
    DirectoryEntry, FileAttributes, FileFlags, FileKind, MountOptions, MountState, ReadOnlyFilesystem, StatFs,
    UnsupportedFilesystem,
};
pub use registry::{Description, FilesystemRegistry, ProbeFailure, ProbeReport};
