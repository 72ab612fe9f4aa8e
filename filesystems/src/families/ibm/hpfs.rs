// OS/2 High Performance File System
// Identified by the superblock at LBA 16; the spareblock at LBA 17 holds the
// dirty flag and the BIOS parameter block in sector 0 holds label and serial.

use crate::families::{require_extent, AUTHOR};
use relic_core::dates::unix_to_datetime;
use relic_core::{
    read_bytes, Decode, Encoding, Endianness, FieldReader, Filesystem, FilesystemInfo,
    NormalizedMetadata, Partition, RelicError, Report, Result, SectorSource,
};
use uuid::Uuid;

const HPFS_SECTOR: u64 = 512;
const SUPERBLOCK_LBA: u64 = 16;
const SPAREBLOCK_LBA: u64 = 17;

const SB_MAGIC1: u32 = 0xF995_E849;
const SB_MAGIC2: u32 = 0xFA53_E9C5;
const SP_MAGIC1: u32 = 0xF991_1849;
const SP_MAGIC2: u32 = 0xFA52_29C5;
const HPFS_FS_TYPE: &[u8; 8] = b"HPFS    ";

const SPARE_DIRTY: u8 = 0x01;
const SPARE_DIRBLOCKS_USED: u8 = 0x02;
const SPARE_HOTFIX_USED: u8 = 0x04;
const SPARE_BAD_SECTORS: u8 = 0x08;
const SPARE_BAD_BITMAP: u8 = 0x10;
const SPARE_FAST_FORMAT: u8 = 0x20;
const SPARE_OLD_WROTE: u8 = 0x40;

/// DOS 4.0 extended BIOS parameter block as HPFS lays it out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HpfsBootSector {
    pub oem_name: [u8; 8],
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub media: u8,
    pub sectors_per_track: u16,
    pub heads: u16,
    pub hidden_sectors: u32,
    pub big_sectors: u32,
    pub drive_number: u8,
    pub signature: u8,
    pub serial: u32,
    pub volume_label: [u8; 11],
    pub fs_type: [u8; 8],
    pub boot_signature: u16,
}

impl Decode for HpfsBootSector {
    const SIZE: usize = 512;

    fn decode(bytes: &[u8], endianness: Endianness) -> Result<Self> {
        let r = FieldReader::new(bytes, Self::SIZE, endianness)?;
        Ok(Self {
            oem_name: r.bytes::<8>(3)?,
            bytes_per_sector: r.u16(11)?,
            sectors_per_cluster: r.u8(13)?,
            media: r.u8(21)?,
            sectors_per_track: r.u16(24)?,
            heads: r.u16(26)?,
            hidden_sectors: r.u32(28)?,
            big_sectors: r.u32(32)?,
            drive_number: r.u8(36)?,
            signature: r.u8(38)?,
            serial: r.u32(39)?,
            volume_label: r.bytes::<11>(43)?,
            fs_type: r.bytes::<8>(54)?,
            boot_signature: r.u16(510)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HpfsSuperblock {
    pub magic1: u32,
    pub magic2: u32,
    pub version: u8,
    pub func_version: u8,
    pub root_fnode: u32,
    pub sectors: u32,
    pub badblocks: u32,
    pub bitmap_lsn: u32,
    pub badblock_lsn: u32,
    pub last_chkdsk: i32,
    pub last_optimize: i32,
    pub dband_sectors: u32,
    pub dband_start: u32,
    pub dband_last: u32,
}

impl Decode for HpfsSuperblock {
    const SIZE: usize = 60;

    fn decode(bytes: &[u8], endianness: Endianness) -> Result<Self> {
        let r = FieldReader::new(bytes, Self::SIZE, endianness)?;
        Ok(Self {
            magic1: r.u32(0)?,
            magic2: r.u32(4)?,
            version: r.u8(8)?,
            func_version: r.u8(9)?,
            root_fnode: r.u32(12)?,
            sectors: r.u32(16)?,
            badblocks: r.u32(20)?,
            bitmap_lsn: r.u32(24)?,
            badblock_lsn: r.u32(32)?,
            last_chkdsk: r.i32(40)?,
            last_optimize: r.i32(44)?,
            dband_sectors: r.u32(48)?,
            dband_start: r.u32(52)?,
            dband_last: r.u32(56)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HpfsSpareblock {
    pub magic1: u32,
    pub magic2: u32,
    pub flags1: u8,
    pub flags2: u8,
    pub hotfix_start: u32,
    pub hotfix_used: u32,
    pub hotfix_entries: u32,
    pub spare_dnodes_free: u32,
    pub spare_dnodes: u32,
    pub codepage_lsn: u32,
    pub codepages: u32,
}

impl Decode for HpfsSpareblock {
    const SIZE: usize = 40;

    fn decode(bytes: &[u8], endianness: Endianness) -> Result<Self> {
        let r = FieldReader::new(bytes, Self::SIZE, endianness)?;
        Ok(Self {
            magic1: r.u32(0)?,
            magic2: r.u32(4)?,
            flags1: r.u8(8)?,
            flags2: r.u8(9)?,
            hotfix_start: r.u32(12)?,
            hotfix_used: r.u32(16)?,
            hotfix_entries: r.u32(20)?,
            spare_dnodes_free: r.u32(24)?,
            spare_dnodes: r.u32(28)?,
            codepage_lsn: r.u32(32)?,
            codepages: r.u32(36)?,
        })
    }
}

pub struct HpfsFilesystem;

impl HpfsFilesystem {
    fn read_superblock(source: &dyn SectorSource, partition: &Partition) -> Result<HpfsSuperblock> {
        require_extent(source, partition, 512, (SPAREBLOCK_LBA + 1) * HPFS_SECTOR)?;
        let raw = read_bytes(source, partition, SUPERBLOCK_LBA * HPFS_SECTOR, HpfsSuperblock::SIZE)?;
        let sb = HpfsSuperblock::decode(&raw, Endianness::Little)?;
        if sb.magic1 != SB_MAGIC1 || sb.magic2 != SB_MAGIC2 {
            return Err(RelicError::mismatch("HPFS superblock magic"));
        }
        Ok(sb)
    }
}

impl Filesystem for HpfsFilesystem {
    fn name(&self) -> &'static str {
        "OS/2 High Performance File System"
    }

    fn id(&self) -> Uuid {
        Uuid::from_u128(0x33513b2c_f5d8_4d73_a5e1_6c0b6d1e7f21)
    }

    fn author(&self) -> &'static str {
        AUTHOR
    }

    fn default_encoding(&self) -> Encoding {
        Encoding::Latin1
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
        let sb = Self::read_superblock(source, partition)?;
        let bpb = HpfsBootSector::decode(&read_bytes(source, partition, 0, HpfsBootSector::SIZE)?, Endianness::Little)?;
        let spare = HpfsSpareblock::decode(
            &read_bytes(source, partition, SPAREBLOCK_LBA * HPFS_SECTOR, HpfsSpareblock::SIZE)?,
            Endianness::Little,
        )?;
        let label = encoding.decode_padded(&bpb.volume_label);
        let oem = encoding.decode_padded(&bpb.oem_name);
        let last_chkdsk = unix_to_datetime(sb.last_chkdsk as i64).filter(|_| sb.last_chkdsk > 0);
        let last_optimize = unix_to_datetime(sb.last_optimize as i64).filter(|_| sb.last_optimize > 0);

        let mut report = Report::new();
        report
            .line("OS/2 High Performance File System")
            .field("OEM name", &oem)
            .field("Volume label", &label)
            .line(format!("Volume serial number: {:08X}", bpb.serial))
            .line(format!("{} bytes per sector", bpb.bytes_per_sector))
            .line(format!("Media descriptor: 0x{:02X}", bpb.media))
            .line(format!("{} sectors per track", bpb.sectors_per_track))
            .line(format!("{} heads", bpb.heads))
            .line(format!("{} sectors hidden before BPB", bpb.hidden_sectors))
            .line(format!("BIOS drive number: 0x{:02X}", bpb.drive_number))
            .line(format!("HPFS version: {}", sb.version))
            .line(format!("Functional version: {}", sb.func_version))
            .line(format!("Root directory FNode resides in sector {}", sb.root_fnode))
            .line(format!("{} sectors on volume", sb.sectors))
            .line(format!("{} sectors are marked bad", sb.badblocks))
            .line(format!("Bitmap table starts at sector {}", sb.bitmap_lsn))
            .line(format!("Bad block list starts at sector {}", sb.badblock_lsn))
            .line(format!(
                "Directory band has {} sectors from sector {} to {}",
                sb.dband_sectors, sb.dband_start, sb.dband_last
            ));
        match last_chkdsk {
            Some(date) => report.field("Last CHKDSK", date.format("%Y-%m-%d %H:%M:%S")),
            None => report.line("Filesystem integrity has never been checked"),
        };
        match last_optimize {
            Some(date) => report.field("Last optimization", date.format("%Y-%m-%d %H:%M:%S")),
            None => report.line("Filesystem has never been optimized"),
        };

        let dirty = spare.magic1 == SP_MAGIC1 && spare.magic2 == SP_MAGIC2 && spare.flags1 & SPARE_DIRTY != 0;
        if spare.magic1 == SP_MAGIC1 && spare.magic2 == SP_MAGIC2 {
            report
                .line(format!(
                    "{} of {} hotfix entries used, list at sector {}",
                    spare.hotfix_used, spare.hotfix_entries, spare.hotfix_start
                ))
                .line(format!("{} of {} spare DNODEs free", spare.spare_dnodes_free, spare.spare_dnodes))
                .line(format!("{} codepages starting at sector {}", spare.codepages, spare.codepage_lsn));
            for (flag, text) in [
                (SPARE_DIRTY, "Filesystem is dirty"),
                (SPARE_DIRBLOCKS_USED, "Spare directory blocks are in use"),
                (SPARE_HOTFIX_USED, "Hotfixes are in use"),
                (SPARE_BAD_SECTORS, "Disk contains bad sectors"),
                (SPARE_BAD_BITMAP, "Disk has a bad bitmap"),
                (SPARE_FAST_FORMAT, "Filesystem was formatted fast"),
                (SPARE_OLD_WROTE, "An older HPFS driver wrote to the volume"),
            ] {
                if spare.flags1 & flag != 0 {
                    report.line(text);
                }
            }
            if spare.flags2 & 0x01 != 0 {
                report.line("Install DASD limits");
            }
        } else {
            report.warn(format!(
                "Spareblock magic 0x{:08X}/0x{:08X} is wrong",
                spare.magic1, spare.magic2
            ));
        }

        let sector_size = source.info().sector_size;
        if bpb.bytes_per_sector as u32 != sector_size {
            report.warn(format!(
                "BPB declares {} bytes per sector, medium has {}",
                bpb.bytes_per_sector, sector_size
            ));
        }
        if &bpb.fs_type != HPFS_FS_TYPE {
            report.warn("BIOS parameter block does not name HPFS");
        }

        let mut metadata = NormalizedMetadata::new("HPFS").with_volume_name(label);
        metadata.cluster_size = bpb.bytes_per_sector as u32;
        metadata.clusters = sb.sectors as u64;
        metadata.modification_date = last_chkdsk;
        metadata.bootable = bpb.boot_signature == 0xAA55;
        metadata.dirty = dirty;
        metadata.volume_serial = Some(format!("{:08X}", bpb.serial));
        metadata.system_identifier = Some(oem).filter(|s| !s.is_empty());

        Ok(FilesystemInfo { report, metadata })
    }
}
