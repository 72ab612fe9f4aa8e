// Apple Hierarchical File System (HFS)
// The Master Directory Block lives 1024 bytes in, big-endian, with the classic
// Mac OS 1904 epoch. An HFS wrapper around an embedded HFS+ volume is left to HFS+.

use crate::families::{require_extent, AUTHOR};
use relic_core::dates::mac_to_datetime;
use relic_core::{
    read_bytes, Decode, Encoding, Endianness, FieldReader, Filesystem, FilesystemInfo,
    NormalizedMetadata, Partition, RelicError, Report, Result, SectorSource,
};
use uuid::Uuid;

const MDB_OFFSET: u64 = 1024;
const HFS_MAGIC: u16 = 0x4244;
const HFSP_MAGIC: u16 = 0x482B;
const HFS_BOOT_MAGIC: u16 = 0x4C4B;

const ATTR_HARDWARE_LOCK: u16 = 0x0080;
const ATTR_UNMOUNTED: u16 = 0x0100;
const ATTR_SPARED_BAD_BLOCKS: u16 = 0x0200;
const ATTR_NO_CACHE: u16 = 0x0400;
const ATTR_INCONSISTENT: u16 = 0x0800;
const ATTR_SOFTWARE_LOCK: u16 = 0x8000;

/// Master Directory Block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HfsMasterDirectoryBlock {
    pub dr_sig_word: u16,
    pub dr_cr_date: u32,
    pub dr_ls_mod: u32,
    pub dr_atrb: u16,
    pub dr_nm_fls: u16,
    pub dr_vbm_st: u16,
    pub dr_alloc_ptr: u16,
    pub dr_nm_al_blks: u16,
    pub dr_al_blk_siz: u32,
    pub dr_clp_siz: u32,
    pub dr_al_bl_st: u16,
    pub dr_nxt_cnid: u32,
    pub dr_free_bks: u16,
    /// Pascal string, up to 27 characters
    pub dr_vn: Vec<u8>,
    pub dr_vol_bk_up: u32,
    pub dr_v_seq_num: u16,
    pub dr_wr_cnt: u32,
    pub dr_nm_rt_dirs: u16,
    pub dr_fil_cnt: u32,
    pub dr_dir_cnt: u32,
    pub dr_fndr_info: [u32; 8],
    pub dr_embed_sig_word: u16,
}

impl Decode for HfsMasterDirectoryBlock {
    const SIZE: usize = 162;

    fn decode(bytes: &[u8], endianness: Endianness) -> Result<Self> {
        let r = FieldReader::new(bytes, Self::SIZE, endianness)?;
        let vn_len = (r.u8(36)? as usize).min(27);
        let mut dr_fndr_info = [0u32; 8];
        for (i, slot) in dr_fndr_info.iter_mut().enumerate() {
            *slot = r.u32(92 + i * 4)?;
        }
        Ok(Self {
            dr_sig_word: r.u16(0)?,
            dr_cr_date: r.u32(2)?,
            dr_ls_mod: r.u32(6)?,
            dr_atrb: r.u16(10)?,
            dr_nm_fls: r.u16(12)?,
            dr_vbm_st: r.u16(14)?,
            dr_alloc_ptr: r.u16(16)?,
            dr_nm_al_blks: r.u16(18)?,
            dr_al_blk_siz: r.u32(20)?,
            dr_clp_siz: r.u32(24)?,
            dr_al_bl_st: r.u16(28)?,
            dr_nxt_cnid: r.u32(30)?,
            dr_free_bks: r.u16(34)?,
            dr_vn: r.slice(37, vn_len)?.to_vec(),
            dr_vol_bk_up: r.u32(64)?,
            dr_v_seq_num: r.u16(68)?,
            dr_wr_cnt: r.u32(70)?,
            dr_nm_rt_dirs: r.u16(82)?,
            dr_fil_cnt: r.u32(84)?,
            dr_dir_cnt: r.u32(88)?,
            dr_fndr_info,
            dr_embed_sig_word: r.u16(124)?,
        })
    }
}

pub struct HfsFilesystem;

impl HfsFilesystem {
    fn read_mdb(source: &dyn SectorSource, partition: &Partition) -> Result<HfsMasterDirectoryBlock> {
        require_extent(source, partition, 0, MDB_OFFSET + 512)?;
        let raw = read_bytes(source, partition, MDB_OFFSET, HfsMasterDirectoryBlock::SIZE)?;
        let mdb = HfsMasterDirectoryBlock::decode(&raw, Endianness::Big)?;
        if mdb.dr_sig_word != HFS_MAGIC {
            return Err(RelicError::mismatch("HFS signature"));
        }
        if mdb.dr_embed_sig_word == HFSP_MAGIC {
            return Err(RelicError::mismatch("HFS wrapper around HFS+"));
        }
        Ok(mdb)
    }

    fn has_boot_block(source: &dyn SectorSource, partition: &Partition) -> Result<bool> {
        let raw = read_bytes(source, partition, 0, 2)?;
        Ok(u16::from_be_bytes([raw[0], raw[1]]) == HFS_BOOT_MAGIC)
    }
}

impl Filesystem for HfsFilesystem {
    fn name(&self) -> &'static str {
        "Apple Hierarchical File System"
    }

    fn id(&self) -> Uuid {
        Uuid::from_u128(0x36405f8d_0d26_6ebe_436f_62f0586b4f08)
    }

    fn author(&self) -> &'static str {
        AUTHOR
    }

    fn default_encoding(&self) -> Encoding {
        Encoding::MacRoman
    }

    fn detect(&self, source: &dyn SectorSource, partition: &Partition) -> Result<bool> {
        Self::read_mdb(source, partition).map(|_| true)
    }

    fn get_information(
        &self,
        source: &dyn SectorSource,
        partition: &Partition,
        encoding: Option<Encoding>,
    ) -> Result<FilesystemInfo> {
        let encoding = encoding.unwrap_or(self.default_encoding());
        let mdb = Self::read_mdb(source, partition)?;
        let boot_block = Self::has_boot_block(source, partition)?;
        let name = encoding.decode(&mdb.dr_vn);
        let created = mac_to_datetime(mdb.dr_cr_date);
        let modified = mac_to_datetime(mdb.dr_ls_mod);
        let backed_up = mac_to_datetime(mdb.dr_vol_bk_up);
        let date = |d: Option<chrono::DateTime<chrono::Utc>>| {
            d.map_or_else(|| "never".to_string(), |d| d.format("%Y-%m-%d %H:%M:%S").to_string())
        };

        let mut report = Report::new();
        report
            .line("Apple Hierarchical File System")
            .line("Master Directory Block:")
            .field("Creation date", date(created))
            .field("Last modification date", date(modified))
            .field("Last backup date", date(backed_up))
            .line(format!("Backup sequence number: {}", mdb.dr_v_seq_num));

        for (flag, text) in [
            (ATTR_HARDWARE_LOCK, "Volume is locked by hardware"),
            (ATTR_UNMOUNTED, "Volume was unmounted"),
            (ATTR_SPARED_BAD_BLOCKS, "Volume has spared bad blocks"),
            (ATTR_NO_CACHE, "Volume does not need cache"),
            (ATTR_INCONSISTENT, "Boot volume is inconsistent"),
            (ATTR_SOFTWARE_LOCK, "Volume is locked by software"),
        ] {
            if mdb.dr_atrb & flag != 0 {
                report.line(text);
            }
        }

        report
            .line(format!("{} files on root directory", mdb.dr_nm_fls))
            .line(format!("{} directories on root directory", mdb.dr_nm_rt_dirs))
            .line(format!("{} files on volume", mdb.dr_fil_cnt))
            .line(format!("{} directories on volume", mdb.dr_dir_cnt))
            .line(format!("Volume write count: {}", mdb.dr_wr_cnt))
            .line(format!("Volume bitmap starting sector (in 512-bytes): {}", mdb.dr_vbm_st))
            .line(format!("Next allocation block: {}", mdb.dr_alloc_ptr))
            .line(format!("{} volume allocation blocks", mdb.dr_nm_al_blks))
            .line(format!("{} bytes per allocation block", mdb.dr_al_blk_siz))
            .line(format!("{} bytes to allocate when extending a file", mdb.dr_clp_siz))
            .line(format!("First allocation block (#0) starts in sector {}", mdb.dr_al_bl_st))
            .line(format!("Next unused CNID: {}", mdb.dr_nxt_cnid))
            .line(format!("{} unused allocation blocks", mdb.dr_free_bks))
            .field("Volume name", &name);

        let blessed = mdb.dr_fndr_info[0];
        if blessed != 0 {
            report.line(format!("Directory ID of the bootable system folder: {}", blessed));
        }
        if boot_block {
            report.line("Volume is bootable");
        }

        if mdb.dr_al_blk_siz == 0 || mdb.dr_al_blk_siz % 512 != 0 {
            report.warn(format!(
                "Allocation block size {} is not a multiple of 512 bytes",
                mdb.dr_al_blk_siz
            ));
        }

        let mut metadata = NormalizedMetadata::new("HFS").with_volume_name(name);
        metadata.cluster_size = mdb.dr_al_blk_siz;
        metadata.clusters = mdb.dr_nm_al_blks as u64;
        metadata.free_clusters = Some(mdb.dr_free_bks as u64);
        metadata.files = Some(mdb.dr_fil_cnt as u64);
        metadata.creation_date = created;
        metadata.modification_date = modified;
        metadata.backup_date = backed_up;
        metadata.bootable = boot_block || blessed != 0;
        metadata.dirty = mdb.dr_atrb & ATTR_UNMOUNTED == 0;
        if mdb.dr_fndr_info[6] != 0 || mdb.dr_fndr_info[7] != 0 {
            metadata.volume_serial = Some(format!("{:08X}{:08X}", mdb.dr_fndr_info[6], mdb.dr_fndr_info[7]));
        }

        Ok(FilesystemInfo { report, metadata })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::families::test_support::*;
    use chrono::Datelike;
    use relic_core::test_utils::ImageBuilder;
    use relic_core::FieldWriter;

    fn hfs_image(atrb: u16, boot: bool, embed: u16) -> ImageBuilder {
        let name = [0xAAu8, b'M', b'a', b'c'];
        let mut mdb = FieldWriter::new(HfsMasterDirectoryBlock::SIZE, Endianness::Big);
        mdb.u16(0, HFS_MAGIC)
            .u32(2, 2_082_844_800 + 631_152_000)
            .u32(6, 2_082_844_800 + 631_152_000 + 3600)
            .u16(10, atrb)
            .u16(12, 3)
            .u16(14, 3)
            .u16(18, 1600)
            .u32(20, 512)
            .u32(24, 2048)
            .u16(28, 5)
            .u32(30, 100)
            .u16(34, 1200)
            .u8(36, 4)
            .bytes(37, &name)
            .u32(84, 25)
            .u32(88, 4)
            .u32(92 + 6 * 4, 0xCAFE_0001)
            .u16(124, embed);
        let mut image = ImageBuilder::new(512, 1600);
        if boot {
            image.put(0, b"LK");
        }
        image.put(MDB_OFFSET as usize, mdb.as_bytes());
        image
    }

    #[test]
    fn test_master_directory_block() {
        let image = hfs_image(ATTR_UNMOUNTED, true, 0);
        assert!(identifies(&HfsFilesystem, &image));
        assert_magic_sensitive(&HfsFilesystem, &image, 1024..1026);
        assert_rejects_one_sector(&HfsFilesystem, &image);

        let info = assert_idempotent(&HfsFilesystem, &image);
        let meta = &info.metadata;
        assert_eq!(meta.volume_name.as_deref(), Some("™Mac"));
        assert_eq!(meta.clusters, 1600);
        assert_eq!(meta.free_clusters, Some(1200));
        assert_eq!(meta.files, Some(25));
        assert_eq!(meta.creation_date.unwrap().year(), 1990);
        assert!(meta.backup_date.is_none());
        assert!(meta.bootable);
        assert!(!meta.dirty);
        assert_eq!(meta.volume_serial.as_deref(), Some("CAFE000100000000"));
    }

    #[test]
    fn test_dirty_unbootable() {
        let image = hfs_image(0, false, 0);
        let source = image.build();
        let info = HfsFilesystem.get_information(&source, &whole(&source), None).unwrap();
        assert!(info.metadata.dirty);
        assert!(!info.metadata.bootable);
    }

    #[test]
    fn test_hfs_plus_wrapper_rejected() {
        assert!(!identifies(&HfsFilesystem, &hfs_image(ATTR_UNMOUNTED, false, HFSP_MAGIC)));
    }
}
