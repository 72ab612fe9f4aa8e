// Extended read-only filesystem contract
// Every operation defaults to Unsupported: a descriptor may identify and describe a
// volume without offering any file access. Unsupported is an expected answer, not a fault.

use crate::device::{Partition, SectorSource};
use crate::error::{RelicError, Result};
use bitflags::bitflags;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MountState {
    Unmounted,
    Mounted,
}

/// Format-specific mount options (string keys and values)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountOptions {
    options: HashMap<String, String>,
}

impl MountOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Parse `key=value` pairs; a bare key is stored with an empty value.
    pub fn parse<'a>(pairs: impl IntoIterator<Item = &'a str>) -> Self {
        let options = pairs
            .into_iter()
            .map(|pair| match pair.split_once('=') {
                Some((k, v)) => (k.trim().to_string(), v.trim().to_string()),
                None => (pair.trim().to_string(), String::new()),
            })
            .collect();
        Self { options }
    }
}

/// Kind of directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FileKind {
    File,
    Directory,
    Symlink,
    Other,
}

bitflags! {
    /// Per-file attribute flags reported by `get_attributes`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
    pub struct FileFlags: u32 {
        const DIRECTORY = 0x0001;
        const FILE = 0x0002;
        const SYMLINK = 0x0004;
        const READ_ONLY = 0x0008;
        const HIDDEN = 0x0010;
        const SYSTEM = 0x0020;
        const ARCHIVE = 0x0040;
        const EXECUTABLE = 0x0080;
        const TEMPORARY = 0x0100;
    }
}

/// File attributes returned by stat operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileAttributes {
    pub size: u64,
    pub blocks: u64,
    pub block_size: u32,
    pub kind: FileKind,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub accessed: Option<DateTime<Utc>>,
    pub flags: FileFlags,
    pub inode: u64,
    pub links: u32,
}

impl FileAttributes {
    pub fn is_directory(&self) -> bool {
        self.kind == FileKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }
}

/// Directory entry returned by read_dir
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub attributes: FileAttributes,
}

/// Volume-wide statistics returned by stat_fs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatFs {
    pub filesystem_type: String,
    pub block_size: u32,
    pub total_blocks: u64,
    pub free_blocks: u64,
    pub files: u64,
    pub free_files: Option<u64>,
    pub max_filename_length: u32,
    pub volume_label: Option<String>,
    pub volume_serial: Option<String>,
}

/// File-level access to a mounted volume.
///
/// A handle starts `Unmounted`; `mount` moves it to `Mounted` and `unmount`
/// back. File operations are only meaningful while mounted.
pub trait ReadOnlyFilesystem: Send {
    fn state(&self) -> MountState {
        MountState::Unmounted
    }

    fn mount(
        &mut self,
        _source: Arc<dyn SectorSource + Send + Sync>,
        _partition: Partition,
        _options: &MountOptions,
    ) -> Result<()> {
        Err(RelicError::unsupported("mount"))
    }

    fn unmount(&mut self) -> Result<()> {
        Err(RelicError::unsupported("unmount"))
    }

    fn read(&mut self, _path: &str, _offset: u64, _size: usize) -> Result<Vec<u8>> {
        Err(RelicError::unsupported("read"))
    }

    fn read_dir(&mut self, _path: &str) -> Result<Vec<DirectoryEntry>> {
        Err(RelicError::unsupported("read_dir"))
    }

    fn stat(&mut self, _path: &str) -> Result<FileAttributes> {
        Err(RelicError::unsupported("stat"))
    }

    fn get_attributes(&mut self, _path: &str) -> Result<FileFlags> {
        Err(RelicError::unsupported("get_attributes"))
    }

    fn list_xattr(&mut self, _path: &str) -> Result<Vec<String>> {
        Err(RelicError::unsupported("list_xattr"))
    }

    fn get_xattr(&mut self, _path: &str, _name: &str) -> Result<Vec<u8>> {
        Err(RelicError::unsupported("get_xattr"))
    }

    /// Translate a file-relative block into a partition-relative block.
    fn map_block(&mut self, _path: &str, _file_block: u64) -> Result<u64> {
        Err(RelicError::unsupported("map_block"))
    }

    fn stat_fs(&self) -> Result<StatFs> {
        Err(RelicError::unsupported("stat_fs"))
    }

    fn read_link(&mut self, _path: &str) -> Result<String> {
        Err(RelicError::unsupported("read_link"))
    }
}

/// Handle for formats that only identify and describe.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedFilesystem;

impl ReadOnlyFilesystem for UnsupportedFilesystem {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemorySectorSource;

    #[test]
    fn test_stub_reports_unsupported_everywhere() {
        let mut fs = UnsupportedFilesystem;
        let source: Arc<dyn SectorSource + Send + Sync> =
            Arc::new(MemorySectorSource::new(vec![0u8; 1024], 512));

        let err = fs.mount(source, Partition::new(0, 1), &MountOptions::new()).unwrap_err();
        assert!(err.is_unsupported());
        assert_eq!(fs.state(), MountState::Unmounted);

        assert!(fs.read_dir("/").unwrap_err().is_unsupported());
        assert!(fs.read("/x", 0, 1).unwrap_err().is_unsupported());
        assert!(fs.stat_fs().unwrap_err().is_unsupported());
        assert!(fs.read_link("/x").unwrap_err().is_unsupported());
        assert!(fs.unmount().unwrap_err().is_unsupported());
    }

    #[test]
    fn test_mount_options_parse() {
        let options = MountOptions::parse(["encoding=koi8-r", "debug", " a = b "]);
        assert_eq!(options.get("encoding"), Some("koi8-r"));
        assert_eq!(options.get("debug"), Some(""));
        assert_eq!(options.get("a"), Some("b"));
        assert_eq!(options.get("missing"), None);
    }
}
