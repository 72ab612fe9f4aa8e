// ReiserFS 3.5, 3.6 and Reiser JR
// Little-endian superblock 64 KiB into the partition; the version is spelled out in the magic.

use crate::families::{require_extent, AUTHOR};
use relic_core::{
    read_bytes, Decode, Encoding, Endianness, FieldReader, Filesystem, FilesystemInfo,
    NormalizedMetadata, Partition, RelicError, Report, Result, SectorSource,
};
use uuid::Uuid;

const SUPERBLOCK_OFFSET: u64 = 65536;
const REISERFS_VALID_FS: u16 = 1;

const MAGICS: [(&[u8], &str); 3] = [
    (b"ReIsErFs", "Reiser 3.5 filesystem"),
    (b"ReIsEr2Fs", "Reiser 3.6 filesystem"),
    (b"ReIsEr3Fs", "Reiser Jr. filesystem"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReiserSuperblock {
    pub block_count: u32,
    pub free_blocks: u32,
    pub root_block: u32,
    pub journal_first_block: u32,
    pub journal_size: u32,
    pub blocksize: u16,
    pub oid_maxsize: u16,
    pub oid_cursize: u16,
    pub umount_state: u16,
    pub magic: [u8; 10],
    pub fs_state: u16,
    pub hash_function_code: u32,
    pub tree_height: u16,
    pub bmap_nr: u16,
    pub version: u16,
    pub inode_generation: u32,
    pub uuid: [u8; 16],
    pub label: [u8; 16],
}

impl Decode for ReiserSuperblock {
    const SIZE: usize = 116;

    fn decode(bytes: &[u8], endianness: Endianness) -> Result<Self> {
        let r = FieldReader::new(bytes, Self::SIZE, endianness)?;
        Ok(Self {
            block_count: r.u32(0)?,
            free_blocks: r.u32(4)?,
            root_block: r.u32(8)?,
            journal_first_block: r.u32(12)?,
            journal_size: r.u32(20)?,
            blocksize: r.u16(44)?,
            oid_maxsize: r.u16(46)?,
            oid_cursize: r.u16(48)?,
            umount_state: r.u16(50)?,
            magic: r.bytes::<10>(52)?,
            fs_state: r.u16(62)?,
            hash_function_code: r.u32(64)?,
            tree_height: r.u16(68)?,
            bmap_nr: r.u16(70)?,
            version: r.u16(72)?,
            inode_generation: r.u32(76)?,
            uuid: r.bytes::<16>(84)?,
            label: r.bytes::<16>(100)?,
        })
    }
}

impl ReiserSuperblock {
    fn flavour(&self) -> Option<&'static str> {
        let end = self.magic.iter().position(|&b| b == 0).unwrap_or(self.magic.len());
        MAGICS
            .iter()
            .find(|(magic, _)| *magic == &self.magic[..end])
            .map(|(_, name)| *name)
    }
}

fn hash_name(code: u32) -> &'static str {
    match code {
        1 => "tea",
        2 => "yura",
        3 => "r5",
        _ => "unknown",
    }
}

pub struct ReiserFilesystem;

impl ReiserFilesystem {
    fn read_superblock(
        source: &dyn SectorSource,
        partition: &Partition,
    ) -> Result<(ReiserSuperblock, &'static str)> {
        require_extent(source, partition, 0, SUPERBLOCK_OFFSET + ReiserSuperblock::SIZE as u64)?;
        let raw = read_bytes(source, partition, SUPERBLOCK_OFFSET, ReiserSuperblock::SIZE)?;
        let sb = ReiserSuperblock::decode(&raw, Endianness::Little)?;
        let flavour = sb.flavour().ok_or_else(|| RelicError::mismatch("ReiserFS magic"))?;
        Ok((sb, flavour))
    }
}

impl Filesystem for ReiserFilesystem {
    fn name(&self) -> &'static str {
        "Reiser Filesystem Plugin"
    }

    fn id(&self) -> Uuid {
        Uuid::from_u128(0x0b8d3a6f_9c1e_4a77_8e55_72d4c0a81e0a)
    }

    fn author(&self) -> &'static str {
        AUTHOR
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
        let (sb, flavour) = Self::read_superblock(source, partition)?;
        let sector_size = source.info().sector_size;

        let mut report = Report::new();
        report
            .line(flavour)
            .line(format!("Volume format version {}", sb.version))
            .line(format!("{} bytes per block", sb.blocksize))
            .line(format!("{} blocks in volume, {} free", sb.block_count, sb.free_blocks))
            .line(format!("Root directory resides on block {}", sb.root_block))
            .line(format!("Tree height: {}", sb.tree_height))
            .line(format!("{} bitmap blocks", sb.bmap_nr))
            .line(format!(
                "Journal starts at block {}, {} blocks long",
                sb.journal_first_block, sb.journal_size
            ))
            .line(format!("Directory hash: {}", hash_name(sb.hash_function_code)));

        let mut metadata = NormalizedMetadata::new("Reiser");
        // Label and UUID only exist from format version 2 on
        if sb.version >= 2 {
            let label = encoding.decode_padded(&sb.label);
            let uuid = Uuid::from_bytes(sb.uuid);
            report.field("Volume name", &label);
            if !uuid.is_nil() {
                report.field("Volume UUID", uuid);
                metadata.volume_serial = Some(uuid.to_string());
            }
            metadata = metadata.with_volume_name(label);
        }
        if sb.umount_state != REISERFS_VALID_FS {
            report.line("Volume was not cleanly unmounted");
            metadata.dirty = true;
        }
        if sb.blocksize == 0 || sb.blocksize as u32 % sector_size != 0 {
            report.warn(format!(
                "Block size {} is not a multiple of the {}-byte sector size",
                sb.blocksize, sector_size
            ));
        }

        metadata.cluster_size = sb.blocksize as u32;
        metadata.clusters = sb.block_count as u64;
        metadata.free_clusters = Some(sb.free_blocks as u64);

        Ok(FilesystemInfo { report, metadata })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::families::test_support::*;
    use relic_core::test_utils::ImageBuilder;
    use relic_core::FieldWriter;

    fn reiser_image(magic: &[u8], version: u16) -> ImageBuilder {
        let mut sb = FieldWriter::new(ReiserSuperblock::SIZE, Endianness::Little);
        sb.u32(0, 32_768)
            .u32(4, 30_000)
            .u32(8, 8211)
            .u32(12, 18)
            .u32(20, 8192)
            .u16(44, 4096)
            .u16(50, REISERFS_VALID_FS)
            .bytes(52, magic)
            .u32(64, 3)
            .u16(68, 2)
            .u16(70, 1)
            .u16(72, version)
            .bytes(84, &[0xAB; 16])
            .bytes(100, b"home");
        let mut image = ImageBuilder::new(512, 160);
        image.put(SUPERBLOCK_OFFSET as usize, sb.as_bytes());
        image
    }

    #[test]
    fn test_reiser36() {
        let image = reiser_image(b"ReIsEr2Fs", 2);
        assert!(identifies(&ReiserFilesystem, &image));
        assert_magic_sensitive(&ReiserFilesystem, &image, 65536 + 52..65536 + 61);
        assert_rejects_one_sector(&ReiserFilesystem, &image);

        let info = assert_idempotent(&ReiserFilesystem, &image);
        assert!(info.report.to_string().starts_with("Reiser 3.6 filesystem"));
        assert_eq!(info.metadata.volume_name.as_deref(), Some("home"));
        assert_eq!(info.metadata.clusters, 32_768);
        assert!(info.metadata.volume_serial.is_some());
        assert!(!info.metadata.dirty);
    }

    #[test]
    fn test_reiser35_has_no_label() {
        let image = reiser_image(b"ReIsErFs", 0);
        let source = image.build();
        let info = ReiserFilesystem.get_information(&source, &whole(&source), None).unwrap();
        assert_eq!(info.metadata.volume_name, None);
        assert!(info.report.to_string().contains("Directory hash: r5"));
    }

    #[test]
    fn test_too_small_for_superblock() {
        let image = reiser_image(b"ReIsEr2Fs", 2);
        let source = image.build();
        assert!(!ReiserFilesystem.identify(&source, &Partition::new(0, 127)).unwrap());
    }
}
