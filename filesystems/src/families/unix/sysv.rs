// UNIX System V Release 4 filesystem
// Superblock in the second 512-byte sector; magic 0xFD187E20 near its end
// selects byte order, s_type selects the logical block size.

use crate::families::{require_extent, AUTHOR};
use relic_core::dates::unix_to_datetime;
use relic_core::{
    read_bytes, Decode, Encoding, Endianness, FieldReader, Filesystem, FilesystemInfo,
    NormalizedMetadata, Partition, RelicError, Report, Result, SectorSource,
};
use uuid::Uuid;

const SUPERBLOCK_OFFSET: u64 = 512;
const SYSV_MAGIC: u32 = 0xFD18_7E20;
const MAGIC_OFFSET: usize = 0x1F8;
/// s_state holds this value minus s_time when the volume is clean
const FS_OKAY: u32 = 0x7C26_9D38;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysvSuperblock {
    pub s_isize: u16,
    pub s_fsize: u32,
    pub s_nfree: u16,
    pub s_ninode: u16,
    pub s_fmod: u8,
    pub s_ronly: u8,
    pub s_time: u32,
    pub s_tfree: u32,
    pub s_tinode: u16,
    pub s_fname: [u8; 6],
    pub s_fpack: [u8; 6],
    pub s_state: u32,
    pub s_magic: u32,
    pub s_type: u32,
}

impl Decode for SysvSuperblock {
    const SIZE: usize = 512;

    fn decode(bytes: &[u8], endianness: Endianness) -> Result<Self> {
        let r = FieldReader::new(bytes, Self::SIZE, endianness)?;
        Ok(Self {
            s_isize: r.u16(0)?,
            s_fsize: r.u32(4)?,
            s_nfree: r.u16(8)?,
            s_ninode: r.u16(212)?,
            s_fmod: r.u8(418)?,
            s_ronly: r.u8(419)?,
            s_time: r.u32(420)?,
            s_tfree: r.u32(432)?,
            s_tinode: r.u16(436)?,
            s_fname: r.bytes::<6>(440)?,
            s_fpack: r.bytes::<6>(446)?,
            s_state: r.u32(0x1F4)?,
            s_magic: r.u32(MAGIC_OFFSET)?,
            s_type: r.u32(0x1FC)?,
        })
    }
}

impl SysvSuperblock {
    pub fn block_size(&self) -> Option<u32> {
        match self.s_type {
            1 => Some(512),
            2 => Some(1024),
            3 => Some(2048),
            _ => None,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.s_state == FS_OKAY.wrapping_sub(self.s_time)
    }
}

pub struct SysvFilesystem;

impl SysvFilesystem {
    fn read_superblock(source: &dyn SectorSource, partition: &Partition) -> Result<(SysvSuperblock, u32)> {
        require_extent(source, partition, 0, SUPERBLOCK_OFFSET + SysvSuperblock::SIZE as u64)?;
        let raw = read_bytes(source, partition, SUPERBLOCK_OFFSET, SysvSuperblock::SIZE)?;
        let endianness = Endianness::probe_u32(&raw, MAGIC_OFFSET, SYSV_MAGIC)
            .ok_or_else(|| RelicError::mismatch("System V magic"))?;
        let sb = SysvSuperblock::decode(&raw, endianness)?;
        let block_size = sb
            .block_size()
            .ok_or_else(|| RelicError::mismatch(format!("unknown System V block type {}", sb.s_type)))?;
        Ok((sb, block_size))
    }
}

impl Filesystem for SysvFilesystem {
    fn name(&self) -> &'static str {
        "UNIX System V filesystem"
    }

    fn id(&self) -> Uuid {
        Uuid::from_u128(0x9b8d3b0a_a6a5_4b4f_8d0c_6b2e7f1a9c06)
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
        let (sb, block_size) = Self::read_superblock(source, partition)?;
        let fname = encoding.decode_padded(&sb.s_fname);
        let fpack = encoding.decode_padded(&sb.s_fpack);
        let updated = unix_to_datetime(sb.s_time as i64);
        let bs = block_size as u64;

        let mut report = Report::new();
        report
            .line("System V Release 4 filesystem")
            .line(format!("{} bytes per block", block_size))
            .line(format!("{} zones on volume ({} bytes)", sb.s_fsize, sb.s_fsize as u64 * bs))
            .line(format!("{} free zones on volume ({} bytes)", sb.s_tfree, sb.s_tfree as u64 * bs))
            .line(format!("{} free blocks on list", sb.s_nfree))
            .line(format!("{} free inodes on volume", sb.s_tinode))
            .line(format!("First data zone: {}", sb.s_isize));
        if let Some(updated) = updated {
            report.field("Volume last updated on", updated.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        report.field("Volume name", &fname).field("Pack name", &fpack);
        if sb.s_ronly != 0 {
            report.line("Volume is mounted read-only");
        }
        if sb.s_fmod != 0 {
            report.line("Superblock is being modified");
        }
        if !sb.is_clean() {
            report.line("Volume is not clean");
        }

        let mut metadata = NormalizedMetadata::new("SVR4 fs").with_volume_name(fname);
        metadata.cluster_size = block_size;
        metadata.clusters = sb.s_fsize as u64;
        metadata.free_clusters = Some(sb.s_tfree as u64);
        metadata.modification_date = updated;
        metadata.dirty = !sb.is_clean();

        Ok(FilesystemInfo { report, metadata })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::families::test_support::*;
    use relic_core::test_utils::ImageBuilder;
    use relic_core::FieldWriter;

    fn sysv_image(endianness: Endianness, clean: bool) -> ImageBuilder {
        let time = 700_000_000u32;
        let state = if clean { FS_OKAY.wrapping_sub(time) } else { 0 };
        let mut sb = FieldWriter::new(SysvSuperblock::SIZE, endianness);
        sb.u16(0, 22)
            .u32(4, 10_000)
            .u32(420, time)
            .u32(432, 4_000)
            .u16(436, 900)
            .bytes(440, b"root")
            .bytes(446, b"pack0")
            .u32(0x1F4, state)
            .u32(MAGIC_OFFSET, SYSV_MAGIC)
            .u32(0x1FC, 2);
        let mut image = ImageBuilder::new(512, 64);
        image.put(SUPERBLOCK_OFFSET as usize, sb.as_bytes());
        image
    }

    #[test]
    fn test_clean_little_endian_volume() {
        let image = sysv_image(Endianness::Little, true);
        assert!(identifies(&SysvFilesystem, &image));
        assert_magic_sensitive(&SysvFilesystem, &image, 0x3F8..0x3FC);
        assert_rejects_one_sector(&SysvFilesystem, &image);

        let info = assert_idempotent(&SysvFilesystem, &image);
        assert_eq!(info.metadata.cluster_size, 1024);
        assert_eq!(info.metadata.clusters, 10_000);
        assert_eq!(info.metadata.free_clusters, Some(4_000));
        assert_eq!(info.metadata.volume_name.as_deref(), Some("root"));
        assert!(!info.metadata.dirty);
    }

    #[test]
    fn test_big_endian_dirty_volume() {
        let image = sysv_image(Endianness::Big, false);
        let source = image.build();
        let info = SysvFilesystem.get_information(&source, &whole(&source), None).unwrap();
        assert!(info.metadata.dirty);
        assert_eq!(info.metadata.clusters, 10_000);
    }
}
