// SGI XFS
// Big-endian superblock "XFSB" at the start of allocation group 0.

use crate::families::{require_extent, AUTHOR};
use relic_core::{
    read_bytes, Decode, Encoding, Endianness, FieldReader, Filesystem, FilesystemInfo,
    NormalizedMetadata, Partition, ReadOnlyFilesystem, RelicError, Report, Result, SectorSource,
    UnsupportedFilesystem,
};
use uuid::Uuid;

const XFS_MAGIC: u32 = 0x5846_5342;
const XFS_VERSION_NUMBITS: u16 = 0x000F;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XfsSuperblock {
    pub magicnum: u32,
    pub blocksize: u32,
    pub dblocks: u64,
    pub rblocks: u64,
    pub rextents: u64,
    pub uuid: [u8; 16],
    pub logstart: u64,
    pub rootino: u64,
    pub agblocks: u32,
    pub agcount: u32,
    pub logblocks: u32,
    pub versionnum: u16,
    pub sectsize: u16,
    pub inodesize: u16,
    pub fname: [u8; 12],
    pub inprogress: u8,
    pub imax_pct: u8,
    pub icount: u64,
    pub ifree: u64,
    pub fdblocks: u64,
    pub frextents: u64,
}

impl Decode for XfsSuperblock {
    const SIZE: usize = 160;

    fn decode(bytes: &[u8], endianness: Endianness) -> Result<Self> {
        let r = FieldReader::new(bytes, Self::SIZE, endianness)?;
        Ok(Self {
            magicnum: r.u32(0)?,
            blocksize: r.u32(4)?,
            dblocks: r.u64(8)?,
            rblocks: r.u64(16)?,
            rextents: r.u64(24)?,
            uuid: r.bytes::<16>(32)?,
            logstart: r.u64(48)?,
            rootino: r.u64(56)?,
            agblocks: r.u32(84)?,
            agcount: r.u32(88)?,
            logblocks: r.u32(96)?,
            versionnum: r.u16(100)?,
            sectsize: r.u16(102)?,
            inodesize: r.u16(104)?,
            fname: r.bytes::<12>(108)?,
            inprogress: r.u8(126)?,
            imax_pct: r.u8(127)?,
            icount: r.u64(128)?,
            ifree: r.u64(136)?,
            fdblocks: r.u64(144)?,
            frextents: r.u64(152)?,
        })
    }
}

pub struct XfsFilesystem;

impl XfsFilesystem {
    fn read_superblock(source: &dyn SectorSource, partition: &Partition) -> Result<XfsSuperblock> {
        require_extent(source, partition, 0, XfsSuperblock::SIZE as u64)?;
        let raw = read_bytes(source, partition, 0, XfsSuperblock::SIZE)?;
        let sb = XfsSuperblock::decode(&raw, Endianness::Big)?;
        if sb.magicnum != XFS_MAGIC {
            return Err(RelicError::mismatch("XFS magic"));
        }
        Ok(sb)
    }
}

impl Filesystem for XfsFilesystem {
    fn name(&self) -> &'static str {
        "XFS Filesystem Plugin"
    }

    fn id(&self) -> Uuid {
        Uuid::from_u128(0x1d8cd8b8_27e6_410f_9973_d16409225fbb)
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
        let sb = Self::read_superblock(source, partition)?;
        let fname = encoding.decode_padded(&sb.fname);
        let uuid = Uuid::from_bytes(sb.uuid);
        let sector_size = source.info().sector_size;

        let mut report = Report::new();
        report
            .line("XFS filesystem")
            .line(format!("Filesystem version {}", sb.versionnum & XFS_VERSION_NUMBITS))
            .line(format!("{} bytes per sector", sb.sectsize))
            .line(format!("{} bytes per block", sb.blocksize))
            .line(format!("{} bytes per inode", sb.inodesize))
            .line(format!("{} data blocks in volume, {} free", sb.dblocks, sb.fdblocks))
            .line(format!("{} blocks per allocation group", sb.agblocks))
            .line(format!("{} allocation groups in volume", sb.agcount))
            .line(format!("{} inodes in volume, {} free", sb.icount, sb.ifree))
            .line(format!("{} log blocks starting at block {}", sb.logblocks, sb.logstart));
        if sb.rblocks > 0 {
            report.line(format!("{} realtime blocks in {} extents", sb.rblocks, sb.rextents));
        }
        if sb.inprogress != 0 {
            report.line("fsck in progress");
        }
        report.field("Volume name", &fname).field("Volume UUID", uuid);

        if sb.sectsize as u32 != sector_size {
            report.warn(format!(
                "Superblock sector size {} differs from medium sector size {}",
                sb.sectsize, sector_size
            ));
        }

        let mut metadata = NormalizedMetadata::new("XFS filesystem").with_volume_name(fname);
        metadata.cluster_size = sb.blocksize;
        metadata.clusters = sb.dblocks;
        metadata.free_clusters = Some(sb.fdblocks);
        metadata.files = Some(sb.icount.saturating_sub(sb.ifree));
        metadata.dirty = sb.inprogress != 0;
        metadata.volume_serial = Some(uuid.to_string());

        Ok(FilesystemInfo { report, metadata })
    }

    fn read_only(&self) -> Option<Box<dyn ReadOnlyFilesystem>> {
        Some(Box::new(UnsupportedFilesystem))
    }
}
