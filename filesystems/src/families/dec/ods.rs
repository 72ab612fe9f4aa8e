// DEC Files-11 On-Disk Structure (ODS-1, ODS-2, ODS-5)
// The home block is the second 512-byte block of the volume. It carries two
// additive word checksums: one over the first 29 words, one over the whole block.

use crate::families::{magic_hex, require_extent, AUTHOR};
use log::debug;
use relic_core::dates::vms_to_datetime;
use relic_core::decoder::word_sum16;
use relic_core::{
    read_bytes, Decode, Encoding, Endianness, FieldReader, Filesystem, FilesystemInfo,
    NormalizedMetadata, Partition, RelicError, Report, Result, SectorSource,
};
use uuid::Uuid;

const HOME_BLOCK_OFFSET: u64 = 512;
const ODS_BLOCK: u32 = 512;
const CHECKSUM1_OFFSET: usize = 58;
const CHECKSUM2_OFFSET: usize = 0x1FE;
const ODS1_FORMAT: &[u8; 12] = b"DECFILE11A  ";
const ODS2_FORMAT: &[u8; 12] = b"DECFILE11B  ";

const VOLCHAR_READCHECK: u16 = 0x0001;
const VOLCHAR_WRITECHECK: u16 = 0x0002;
const VOLCHAR_ERASE: u16 = 0x0004;
const VOLCHAR_NOHIGHWATER: u16 = 0x0008;
const VOLCHAR_CLASS_PROT: u16 = 0x0010;
const VOLCHAR_ACCESSTIMES: u16 = 0x0020;
const VOLCHAR_HARDLINKS: u16 = 0x0040;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OdsHomeBlock {
    pub homelbn: u32,
    pub alhomelbn: u32,
    pub altidxlbn: u32,
    pub struclev: u16,
    pub cluster: u16,
    pub ibmaplbn: u32,
    pub maxfiles: u32,
    pub ibmapsize: u16,
    pub resfiles: u16,
    pub rvn: u16,
    pub setcount: u16,
    pub volchar: u16,
    pub volowner: u32,
    pub protect: u16,
    pub checksum1: u16,
    pub credate: u64,
    pub revdate: u64,
    pub serialnum: u32,
    pub strucname: [u8; 12],
    pub volname: [u8; 12],
    pub ownername: [u8; 12],
    pub format: [u8; 12],
    pub checksum2: u16,
}

impl Decode for OdsHomeBlock {
    const SIZE: usize = 512;

    fn decode(bytes: &[u8], endianness: Endianness) -> Result<Self> {
        let r = FieldReader::new(bytes, Self::SIZE, endianness)?;
        Ok(Self {
            homelbn: r.u32(0)?,
            alhomelbn: r.u32(4)?,
            altidxlbn: r.u32(8)?,
            struclev: r.u16(12)?,
            cluster: r.u16(14)?,
            ibmaplbn: r.u32(24)?,
            maxfiles: r.u32(28)?,
            ibmapsize: r.u16(32)?,
            resfiles: r.u16(34)?,
            rvn: r.u16(38)?,
            setcount: r.u16(40)?,
            volchar: r.u16(42)?,
            volowner: r.u32(44)?,
            protect: r.u16(52)?,
            checksum1: r.u16(CHECKSUM1_OFFSET)?,
            credate: r.u64(60)?,
            revdate: r.u64(88)?,
            serialnum: r.u32(0x1C8)?,
            strucname: r.bytes::<12>(0x1CC)?,
            volname: r.bytes::<12>(0x1D8)?,
            ownername: r.bytes::<12>(0x1E4)?,
            format: r.bytes::<12>(0x1F0)?,
            checksum2: r.u16(CHECKSUM2_OFFSET)?,
        })
    }
}

impl OdsHomeBlock {
    fn structure_level(&self) -> u8 {
        (self.struclev >> 8) as u8
    }
}

pub struct OdsFilesystem;

impl OdsFilesystem {
    fn read_home_block(source: &dyn SectorSource, partition: &Partition) -> Result<(OdsHomeBlock, Vec<u8>)> {
        require_extent(source, partition, 0, HOME_BLOCK_OFFSET + ODS_BLOCK as u64)?;
        let raw = read_bytes(source, partition, HOME_BLOCK_OFFSET, OdsHomeBlock::SIZE)?;
        let home = OdsHomeBlock::decode(&raw, Endianness::Little)?;
        if &home.format != ODS1_FORMAT && &home.format != ODS2_FORMAT {
            debug!("ods: format field {}", magic_hex(&home.format));
            return Err(RelicError::mismatch("Files-11 format identifier"));
        }
        Ok((home, raw))
    }
}

impl Filesystem for OdsFilesystem {
    fn name(&self) -> &'static str {
        "Files-11 On-Disk Structure"
    }

    fn id(&self) -> Uuid {
        Uuid::from_u128(0x8e2a5b1c_3f47_4d09_b6a8_1c2e9d7f0a34)
    }

    fn author(&self) -> &'static str {
        AUTHOR
    }

    fn detect(&self, source: &dyn SectorSource, partition: &Partition) -> Result<bool> {
        Self::read_home_block(source, partition).map(|_| true)
    }

    fn get_information(
        &self,
        source: &dyn SectorSource,
        partition: &Partition,
        encoding: Option<Encoding>,
    ) -> Result<FilesystemInfo> {
        let encoding = encoding.unwrap_or(self.default_encoding());
        let (home, raw) = Self::read_home_block(source, partition)?;
        let volname = encoding.decode_padded(&home.volname);
        let created = vms_to_datetime(home.credate);
        let revised = vms_to_datetime(home.revdate);
        let level = home.structure_level();
        let cluster_size = home.cluster as u32 * ODS_BLOCK;

        let mut report = Report::new();
        match (&home.format, level) {
            (f, _) if f == ODS1_FORMAT => report.line("ODS-1 volume"),
            (_, 5) => report.line("ODS-5 volume"),
            (_, 2) => report.line("ODS-2 volume"),
            (_, other) => report.line(format!("Unknown structure level {} volume", other)),
        };
        report
            .line(format!("Structure level {}, version {}", level, home.struclev & 0xFF))
            .field("Volume name", &volname)
            .field("Volume owner", encoding.decode_padded(&home.ownername))
            .field("Volume set name", encoding.decode_padded(&home.strucname))
            .line(format!("Volume serial number {:08X}", home.serialnum))
            .line(format!("Volume owner UIC [{:o},{:o}]", home.volowner >> 16, home.volowner & 0xFFFF))
            .line(format!("Volume protection mask {:04X}", home.protect))
            .line(format!("{} bytes per cluster", cluster_size))
            .line(format!("Home block at LBN {}, backup at LBN {}", home.homelbn, home.alhomelbn))
            .line(format!("Backup index file header at LBN {}", home.altidxlbn))
            .line(format!("Index file bitmap at LBN {}, {} blocks", home.ibmaplbn, home.ibmapsize))
            .line(format!("Maximum of {} files on volume", home.maxfiles))
            .line(format!("{} reserved files", home.resfiles));
        if home.rvn > 0 {
            report.line(format!("Volume {} of {} in volume set", home.rvn, home.setcount));
        }
        if let Some(created) = created {
            report.field("Volume created on", created.format("%Y-%m-%d %H:%M:%S"));
        }
        if let Some(revised) = revised {
            report.field("Volume last revised on", revised.format("%Y-%m-%d %H:%M:%S"));
        }
        for (flag, text) in [
            (VOLCHAR_READCHECK, "Blocks are read back and checked"),
            (VOLCHAR_WRITECHECK, "Writes are verified"),
            (VOLCHAR_ERASE, "Files are erased on deletion"),
            (VOLCHAR_NOHIGHWATER, "High-water marking is disabled"),
            (VOLCHAR_CLASS_PROT, "Classification protection is enabled"),
            (VOLCHAR_ACCESSTIMES, "Access times are recorded"),
            (VOLCHAR_HARDLINKS, "Hard links are supported"),
        ] {
            if home.volchar & flag != 0 {
                report.line(text);
            }
        }

        let sum1 = word_sum16(&raw[..CHECKSUM1_OFFSET], Endianness::Little);
        if sum1 != home.checksum1 {
            report.warn(format!(
                "First home block checksum {:04X} does not match computed {:04X}",
                home.checksum1, sum1
            ));
        }
        let sum2 = word_sum16(&raw[..CHECKSUM2_OFFSET], Endianness::Little);
        if sum2 != home.checksum2 {
            report.warn(format!(
                "Second home block checksum {:04X} does not match computed {:04X}",
                home.checksum2, sum2
            ));
        }
        if home.cluster == 0 {
            report.warn("Cluster factor is zero");
        }

        let mut metadata = NormalizedMetadata::new("FILES-11").with_volume_name(volname);
        metadata.cluster_size = cluster_size;
        metadata.clusters = match cluster_size {
            0 => 0,
            size => partition.size_bytes(source.info().sector_size) / size as u64,
        };
        metadata.creation_date = created;
        metadata.modification_date = revised;
        metadata.volume_serial = Some(format!("{:08X}", home.serialnum));

        Ok(FilesystemInfo { report, metadata })
    }
}
