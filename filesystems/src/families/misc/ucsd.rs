// UCSD Pascal file system
// A flat directory starting at block 2: one volume entry followed by up to 77 file
// entries of 26 bytes each. Files are contiguous block runs, so this is the one
// descriptor that also offers file access through ReadOnlyFilesystem.
//
// Byte order follows the host CPU that wrote the disk, so both are tried.

use crate::families::{require_extent, AUTHOR};
use log::{debug, info};
use relic_core::dates::ucsd_to_datetime;
use relic_core::{
    read_bytes, Decode, DirectoryEntry, Encoding, Endianness, FieldReader, FileAttributes, FileFlags,
    FileKind, Filesystem, FilesystemInfo, MountOptions, MountState, NormalizedMetadata, Partition,
    ReadOnlyFilesystem, RelicError, Report, Result, SectorSource, StatFs,
};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

const UCSD_BLOCK: u64 = 512;
const DIRECTORY_BLOCK: u64 = 2;
const ENTRY_SIZE: usize = 26;
const MAX_FILES: i16 = 77;
const MAX_VOLUME_NAME: u8 = 7;
const MAX_FILE_NAME: u8 = 15;
const BOOT_BLOCKS: u64 = 2;

/// Volume entry, the first directory record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UcsdVolumeEntry {
    pub first_block: i16,
    pub last_block: i16,
    pub entry_type: i16,
    pub name: Vec<u8>,
    pub blocks: i16,
    pub files: i16,
    pub last_access: i16,
    pub last_boot: u16,
}

impl Decode for UcsdVolumeEntry {
    const SIZE: usize = ENTRY_SIZE;

    fn decode(bytes: &[u8], endianness: Endianness) -> Result<Self> {
        let r = FieldReader::new(bytes, Self::SIZE, endianness)?;
        let len = r.u8(6)?;
        Ok(Self {
            first_block: r.i16(0)?,
            last_block: r.i16(2)?,
            entry_type: r.i16(4)?,
            name: r.slice(7, len.min(MAX_VOLUME_NAME) as usize)?.to_vec(),
            blocks: r.i16(14)?,
            files: r.i16(16)?,
            last_access: r.i16(18)?,
            last_boot: r.u16(20)?,
        })
    }
}

impl UcsdVolumeEntry {
    fn is_plausible(&self, raw_name_length: u8) -> bool {
        self.first_block == 0
            && self.last_block > DIRECTORY_BLOCK as i16
            && self.last_block <= self.blocks
            && self.entry_type == 0
            && (1..=MAX_VOLUME_NAME).contains(&raw_name_length)
            && (0..=MAX_FILES).contains(&self.files)
    }
}

/// File entry in the directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UcsdFileEntry {
    pub first_block: i16,
    pub last_block: i16,
    pub entry_type: i16,
    pub name: Vec<u8>,
    pub last_bytes: i16,
    pub modified: u16,
}

impl Decode for UcsdFileEntry {
    const SIZE: usize = ENTRY_SIZE;

    fn decode(bytes: &[u8], endianness: Endianness) -> Result<Self> {
        let r = FieldReader::new(bytes, Self::SIZE, endianness)?;
        let len = r.u8(6)?;
        Ok(Self {
            first_block: r.i16(0)?,
            last_block: r.i16(2)?,
            entry_type: r.i16(4)?,
            name: r.slice(7, len.min(MAX_FILE_NAME) as usize)?.to_vec(),
            last_bytes: r.i16(22)?,
            modified: r.u16(24)?,
        })
    }
}

impl UcsdFileEntry {
    pub fn blocks(&self) -> u64 {
        (self.last_block as i64 - self.first_block as i64).max(0) as u64
    }

    /// Bytes in use: whole blocks plus the used part of the last one.
    pub fn size(&self) -> u64 {
        match self.blocks() {
            0 => 0,
            blocks => (blocks - 1) * UCSD_BLOCK + (self.last_bytes.clamp(1, UCSD_BLOCK as i16) as u64),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self.entry_type & 0x0F {
            1 => "bad blocks",
            2 => "code",
            3 => "text",
            4 => "info",
            5 => "data",
            6 => "graphics",
            7 => "photo",
            8 => "secure directory",
            _ => "untyped",
        }
    }
}

/// Volume entry, byte order and file entries read from one directory
#[derive(Debug, Clone)]
struct UcsdDirectory {
    volume: UcsdVolumeEntry,
    endianness: Endianness,
    files: Vec<UcsdFileEntry>,
}

impl UcsdDirectory {
    fn read(source: &dyn SectorSource, partition: &Partition) -> Result<Self> {
        require_extent(source, partition, 0, (DIRECTORY_BLOCK + 1) * UCSD_BLOCK)?;
        let head = read_bytes(source, partition, DIRECTORY_BLOCK * UCSD_BLOCK, ENTRY_SIZE)?;

        let (volume, endianness) = [Endianness::Little, Endianness::Big]
            .into_iter()
            .map(|e| UcsdVolumeEntry::decode(&head, e).map(|v| (v, e)))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .find(|(v, _)| v.is_plausible(head[6]))
            .ok_or_else(|| RelicError::mismatch("UCSD Pascal volume entry"))?;
        debug!("ucsd: {} volume entry, directory ends at block {}", endianness, volume.last_block);

        let available = partition.size_bytes(source.info().sector_size);
        let directory_len = (volume.last_block as u64 - DIRECTORY_BLOCK) * UCSD_BLOCK;
        if DIRECTORY_BLOCK * UCSD_BLOCK + directory_len > available {
            return Err(RelicError::mismatch("UCSD Pascal directory past end of partition"));
        }
        let raw = read_bytes(source, partition, DIRECTORY_BLOCK * UCSD_BLOCK, directory_len as usize)?;

        let files = raw
            .chunks_exact(ENTRY_SIZE)
            .skip(1)
            .take(volume.files as usize)
            .map(|chunk| UcsdFileEntry::decode(chunk, endianness))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { volume, endianness, files })
    }

    fn used_blocks(&self) -> u64 {
        self.volume.last_block as u64 + self.files.iter().map(UcsdFileEntry::blocks).sum::<u64>()
    }

    fn free_blocks(&self) -> u64 {
        (self.volume.blocks as u64).saturating_sub(self.used_blocks())
    }
}

pub struct UcsdFilesystem;

impl Filesystem for UcsdFilesystem {
    fn name(&self) -> &'static str {
        "U.C.S.D. Pascal filesystem"
    }

    fn id(&self) -> Uuid {
        Uuid::from_u128(0xb0ac2cb5_72aa_473a_9200_270b5a2c2d53)
    }

    fn author(&self) -> &'static str {
        AUTHOR
    }

    fn detect(&self, source: &dyn SectorSource, partition: &Partition) -> Result<bool> {
        UcsdDirectory::read(source, partition).map(|_| true)
    }

    fn get_information(
        &self,
        source: &dyn SectorSource,
        partition: &Partition,
        encoding: Option<Encoding>,
    ) -> Result<FilesystemInfo> {
        let encoding = encoding.unwrap_or(self.default_encoding());
        let dir = UcsdDirectory::read(source, partition)?;
        let volume = &dir.volume;
        let name = encoding.decode(&volume.name);
        let last_boot = ucsd_to_datetime(volume.last_boot);
        let boot = read_bytes(source, partition, 0, (BOOT_BLOCKS * UCSD_BLOCK) as usize)?;
        let bootable = boot.iter().any(|&b| b != 0);

        let mut report = Report::new();
        report
            .line("UCSD Pascal filesystem")
            .line(format!("Directory is {}", dir.endianness))
            .field("Volume name", &name)
            .line(format!("Volume has {} blocks", volume.blocks))
            .line(format!("Volume has {} files", volume.files))
            .line(format!("Directory ends at block {}", volume.last_block))
            .line(format!("{} blocks free", dir.free_blocks()));
        match last_boot {
            Some(date) => report.field("Volume last set on", date.format("%Y-%m-%d")),
            None => report.line("Volume date is not set"),
        };
        for file in &dir.files {
            report.line(format!(
                "{} ({}, {} bytes, blocks {}-{})",
                encoding.decode(&file.name),
                file.kind_name(),
                file.size(),
                file.first_block,
                file.last_block
            ));
        }

        let partition_blocks = partition.size_bytes(source.info().sector_size) / UCSD_BLOCK;
        if volume.blocks as u64 != partition_blocks {
            report.warn(format!(
                "Volume has {} blocks but the partition holds {}",
                volume.blocks, partition_blocks
            ));
        }

        let mut metadata = NormalizedMetadata::new("UCSD Pascal").with_volume_name(name);
        metadata.cluster_size = UCSD_BLOCK as u32;
        metadata.clusters = volume.blocks.max(0) as u64;
        metadata.free_clusters = Some(dir.free_blocks());
        metadata.files = Some(volume.files as u64);
        metadata.modification_date = last_boot;
        metadata.bootable = bootable;

        Ok(FilesystemInfo { report, metadata })
    }

    fn read_only(&self) -> Option<Box<dyn ReadOnlyFilesystem>> {
        Some(Box::new(UcsdReadOnly::default()))
    }
}

const BOOT_FILE: &str = "$Boot";
const CATALOG_FILE: &str = "$Catalog";

/// What a path names on a mounted volume
enum Node<'a> {
    Root,
    File(&'a UcsdFileEntry),
    /// Pseudo-file exposed with the `debug` option: (first block, blocks)
    System(u64, u64),
}

struct MountedVolume {
    source: Arc<dyn SectorSource + Send + Sync>,
    partition: Partition,
    encoding: Encoding,
    debug: bool,
    directory: UcsdDirectory,
    names: Vec<String>,
}

impl MountedVolume {
    fn lookup(&self, path: &str) -> Result<Node<'_>> {
        let name = path.trim_start_matches('/');
        if name.is_empty() {
            return Ok(Node::Root);
        }
        if self.debug && name.eq_ignore_ascii_case(BOOT_FILE) {
            return Ok(Node::System(0, BOOT_BLOCKS));
        }
        if self.debug && name.eq_ignore_ascii_case(CATALOG_FILE) {
            let last = self.directory.volume.last_block as u64;
            return Ok(Node::System(DIRECTORY_BLOCK, last - DIRECTORY_BLOCK));
        }
        self.names
            .iter()
            .position(|n| n.eq_ignore_ascii_case(name))
            .map(|i| Node::File(&self.directory.files[i]))
            .ok_or_else(|| RelicError::NotFound(path.to_string()))
    }

    fn attributes(&self, node: &Node<'_>) -> FileAttributes {
        let (kind, flags, size, blocks, modified, inode) = match node {
            Node::Root => (
                FileKind::Directory,
                FileFlags::DIRECTORY,
                (self.directory.volume.last_block as u64 - DIRECTORY_BLOCK) * UCSD_BLOCK,
                self.directory.volume.last_block as u64 - DIRECTORY_BLOCK,
                ucsd_to_datetime(self.directory.volume.last_boot),
                0,
            ),
            Node::File(file) => (
                FileKind::File,
                FileFlags::FILE,
                file.size(),
                file.blocks(),
                ucsd_to_datetime(file.modified),
                file.first_block.max(0) as u64,
            ),
            Node::System(first, blocks) => (
                FileKind::File,
                FileFlags::FILE | FileFlags::SYSTEM | FileFlags::HIDDEN,
                blocks * UCSD_BLOCK,
                *blocks,
                None,
                *first,
            ),
        };
        FileAttributes {
            size,
            blocks,
            block_size: UCSD_BLOCK as u32,
            kind,
            created: None,
            modified,
            accessed: None,
            flags: flags | FileFlags::READ_ONLY,
            inode,
            links: 1,
        }
    }

    /// First block and byte length of a readable node.
    fn extent(&self, node: &Node<'_>, path: &str) -> Result<(u64, u64)> {
        match node {
            Node::Root => Err(RelicError::IsADirectory(path.to_string())),
            Node::File(file) => Ok((file.first_block.max(0) as u64, file.size())),
            Node::System(first, blocks) => Ok((*first, blocks * UCSD_BLOCK)),
        }
    }
}

/// File-level access to a UCSD Pascal volume
#[derive(Default)]
pub struct UcsdReadOnly {
    mounted: Option<MountedVolume>,
}

impl UcsdReadOnly {
    fn volume(&self) -> Result<&MountedVolume> {
        self.mounted.as_ref().ok_or(RelicError::NotMounted)
    }
}

impl ReadOnlyFilesystem for UcsdReadOnly {
    fn state(&self) -> MountState {
        match self.mounted {
            Some(_) => MountState::Mounted,
            None => MountState::Unmounted,
        }
    }

    fn mount(
        &mut self,
        source: Arc<dyn SectorSource + Send + Sync>,
        partition: Partition,
        options: &MountOptions,
    ) -> Result<()> {
        if self.mounted.is_some() {
            return Err(RelicError::AlreadyMounted);
        }
        let encoding = match options.get("encoding") {
            Some(name) => Encoding::from_str(name)?,
            None => UcsdFilesystem.default_encoding(),
        };
        let debug = matches!(options.get("debug"), Some("" | "true" | "1"));

        let directory = UcsdDirectory::read(source.as_ref(), &partition)?;
        let names = directory.files.iter().map(|f| encoding.decode(&f.name)).collect();
        info!(
            "Mounted UCSD Pascal volume {} ({} files)",
            encoding.decode(&directory.volume.name),
            directory.files.len()
        );

        self.mounted = Some(MountedVolume { source, partition, encoding, debug, directory, names });
        Ok(())
    }

    fn unmount(&mut self) -> Result<()> {
        self.mounted.take().map(|_| ()).ok_or(RelicError::NotMounted)
    }

    fn read(&mut self, path: &str, offset: u64, size: usize) -> Result<Vec<u8>> {
        let volume = self.volume()?;
        let node = volume.lookup(path)?;
        let (first_block, length) = volume.extent(&node, path)?;
        if offset >= length {
            return Ok(Vec::new());
        }
        let len = (length - offset).min(size as u64) as usize;
        read_bytes(
            volume.source.as_ref(),
            &volume.partition,
            first_block * UCSD_BLOCK + offset,
            len,
        )
    }

    fn read_dir(&mut self, path: &str) -> Result<Vec<DirectoryEntry>> {
        let volume = self.volume()?;
        match volume.lookup(path)? {
            Node::Root => {}
            _ => return Err(RelicError::NotADirectory(path.to_string())),
        }
        let mut entries: Vec<DirectoryEntry> = volume
            .names
            .iter()
            .zip(&volume.directory.files)
            .map(|(name, file)| DirectoryEntry {
                name: name.clone(),
                attributes: volume.attributes(&Node::File(file)),
            })
            .collect();
        if volume.debug {
            for name in [BOOT_FILE, CATALOG_FILE] {
                let node = volume.lookup(name)?;
                entries.push(DirectoryEntry { name: name.to_string(), attributes: volume.attributes(&node) });
            }
        }
        Ok(entries)
    }

    fn stat(&mut self, path: &str) -> Result<FileAttributes> {
        let volume = self.volume()?;
        let node = volume.lookup(path)?;
        Ok(volume.attributes(&node))
    }

    fn get_attributes(&mut self, path: &str) -> Result<FileFlags> {
        self.stat(path).map(|attributes| attributes.flags)
    }

    fn list_xattr(&mut self, path: &str) -> Result<Vec<String>> {
        self.volume()?.lookup(path)?;
        Ok(Vec::new())
    }

    fn get_xattr(&mut self, path: &str, name: &str) -> Result<Vec<u8>> {
        self.volume()?.lookup(path)?;
        Err(RelicError::NoSuchXattr(name.to_string()))
    }

    fn map_block(&mut self, path: &str, file_block: u64) -> Result<u64> {
        let volume = self.volume()?;
        let node = volume.lookup(path)?;
        let (first_block, length) = volume.extent(&node, path)?;
        if file_block >= length.div_ceil(UCSD_BLOCK) {
            return Err(RelicError::InvalidArgument(format!(
                "block {} is past the end of {}",
                file_block, path
            )));
        }
        Ok(first_block + file_block)
    }

    fn stat_fs(&self) -> Result<StatFs> {
        let volume = self.volume()?;
        let dir = &volume.directory;
        Ok(StatFs {
            filesystem_type: "UCSD Pascal".to_string(),
            block_size: UCSD_BLOCK as u32,
            total_blocks: dir.volume.blocks.max(0) as u64,
            free_blocks: dir.free_blocks(),
            files: dir.files.len() as u64,
            free_files: Some((MAX_FILES as u64).saturating_sub(dir.files.len() as u64)),
            max_filename_length: MAX_FILE_NAME as u32,
            volume_label: Some(volume.encoding.decode(&dir.volume.name)),
            volume_serial: None,
        })
    }
}
