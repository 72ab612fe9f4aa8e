// cramfs (compressed ROM filesystem)
// The superblock sits at offset 0; a byte-swapped magic means the image was built
// on a big-endian host and every field must be read big-endian.

use crate::families::{magic_hex, require_extent, AUTHOR};
use log::debug;
use relic_core::{
    read_bytes, Decode, Encoding, Endianness, FieldReader, Filesystem, FilesystemInfo,
    NormalizedMetadata, Partition, ReadOnlyFilesystem, RelicError, Report, Result, SectorSource,
    UnsupportedFilesystem,
};
use uuid::Uuid;

pub const CRAMFS_MAGIC: u32 = 0x28CD3D45;
const SIGNATURE: &[u8; 16] = b"Compressed ROMFS";
const CRAMFS_BLOCK_SIZE: u32 = 4096;

const FLAG_FSID_VERSION_2: u32 = 0x0000_0001;
const FLAG_SORTED_DIRS: u32 = 0x0000_0002;
const FLAG_HOLES: u32 = 0x0000_0100;
const FLAG_WRONG_SIGNATURE: u32 = 0x0000_0200;
const FLAG_SHIFTED_ROOT_OFFSET: u32 = 0x0000_0400;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CramfsSuperblock {
    pub magic: u32,
    pub size: u32,
    pub flags: u32,
    pub future: u32,
    pub signature: [u8; 16],
    pub crc: u32,
    pub edition: u32,
    pub blocks: u32,
    pub files: u32,
    pub name: [u8; 16],
}

impl Decode for CramfsSuperblock {
    const SIZE: usize = 64;

    fn decode(bytes: &[u8], endianness: Endianness) -> Result<Self> {
        let r = FieldReader::new(bytes, Self::SIZE, endianness)?;
        Ok(Self {
            magic: r.u32(0)?,
            size: r.u32(4)?,
            flags: r.u32(8)?,
            future: r.u32(12)?,
            signature: r.bytes::<16>(16)?,
            crc: r.u32(32)?,
            edition: r.u32(36)?,
            blocks: r.u32(40)?,
            files: r.u32(44)?,
            name: r.bytes::<16>(48)?,
        })
    }
}

pub struct CramfsFilesystem;

impl CramfsFilesystem {
    fn read_superblock(
        source: &dyn SectorSource,
        partition: &Partition,
    ) -> Result<(CramfsSuperblock, Endianness)> {
        require_extent(source, partition, 0, CramfsSuperblock::SIZE as u64)?;
        let raw = read_bytes(source, partition, 0, CramfsSuperblock::SIZE)?;
        let endianness = Endianness::probe_u32(&raw, 0, CRAMFS_MAGIC).ok_or_else(|| {
            debug!("cramfs: no magic, found {}", magic_hex(&raw[..4]));
            RelicError::mismatch("cramfs magic")
        })?;
        Ok((CramfsSuperblock::decode(&raw, endianness)?, endianness))
    }
}

impl Filesystem for CramfsFilesystem {
    fn name(&self) -> &'static str {
        "Cram filesystem"
    }

    fn id(&self) -> Uuid {
        Uuid::from_u128(0xe8f1ae42_6d0b_4c8e_a3c1_79f3d1f20a02)
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
        let (sb, endianness) = Self::read_superblock(source, partition)?;
        let name = encoding.decode_padded(&sb.name);

        let mut report = Report::new();
        report
            .line("Cram file system")
            .line(match endianness {
                Endianness::Little => "Little-endian",
                Endianness::Big => "Big-endian",
            })
            .field("Volume edition", sb.edition)
            .field("Volume name", &name)
            .line(format!("Volume has {} bytes", sb.size))
            .line(format!("Volume has {} blocks", sb.blocks))
            .line(format!("Volume has {} files", sb.files));

        for (flag, text) in [
            (FLAG_FSID_VERSION_2, "Uses version 2 identification block"),
            (FLAG_SORTED_DIRS, "Directories are sorted"),
            (FLAG_HOLES, "Files may contain holes"),
            (FLAG_WRONG_SIGNATURE, "Signature is flagged as wrong"),
            (FLAG_SHIFTED_ROOT_OFFSET, "Root offset is shifted"),
        ] {
            if sb.flags & flag != 0 {
                report.line(text);
            }
        }

        if &sb.signature != SIGNATURE {
            report.warn(format!(
                "Signature is \"{}\", expected \"Compressed ROMFS\"",
                Encoding::Ascii.decode_padded(&sb.signature)
            ));
        }

        let mut metadata = NormalizedMetadata::new("cramfs").with_volume_name(name);
        metadata.cluster_size = CRAMFS_BLOCK_SIZE;
        metadata.clusters = sb.blocks as u64;
        metadata.files = Some(sb.files as u64);

        Ok(FilesystemInfo { report, metadata })
    }

    fn read_only(&self) -> Option<Box<dyn ReadOnlyFilesystem>> {
        Some(Box::new(UnsupportedFilesystem))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::families::test_support::*;
    use relic_core::test_utils::ImageBuilder;
    use relic_core::FieldWriter;

    fn cramfs_image(endianness: Endianness) -> ImageBuilder {
        let mut sb = FieldWriter::new(CramfsSuperblock::SIZE, endianness);
        sb.u32(0, CRAMFS_MAGIC)
            .u32(4, 8192)
            .u32(8, FLAG_FSID_VERSION_2 | FLAG_SORTED_DIRS)
            .bytes(16, SIGNATURE)
            .u32(32, 0xDEADBEEF)
            .u32(36, 3)
            .u32(40, 2)
            .u32(44, 7)
            .bytes(48, b"initrd");
        let mut image = ImageBuilder::new(512, 16);
        image.put(0, sb.as_bytes());
        image
    }

    #[test]
    fn test_both_byte_orders_decode_alike() {
        init_logging();
        let le = cramfs_image(Endianness::Little);
        let be = cramfs_image(Endianness::Big);
        assert_eq!(&le.bytes()[..4], &[0x45, 0x3D, 0xCD, 0x28]);
        assert_eq!(&be.bytes()[..4], &[0x28, 0xCD, 0x3D, 0x45]);

        let (le_sb, le_order) = CramfsFilesystem::read_superblock(&le.build(), &Partition::new(0, 15)).unwrap();
        let (be_sb, be_order) = CramfsFilesystem::read_superblock(&be.build(), &Partition::new(0, 15)).unwrap();
        assert_eq!(le_order, Endianness::Little);
        assert_eq!(be_order, Endianness::Big);
        assert_eq!(le_sb, be_sb);

        let le_info = assert_idempotent(&CramfsFilesystem, &le);
        let be_info = assert_idempotent(&CramfsFilesystem, &be);
        assert_eq!(le_info.metadata, be_info.metadata);
        assert_eq!(le_info.metadata.clusters, 2);
        assert_eq!(le_info.metadata.files, Some(7));
        assert_eq!(le_info.metadata.volume_name.as_deref(), Some("initrd"));
    }

    #[test]
    fn test_magic_and_extent() {
        let image = cramfs_image(Endianness::Little);
        assert!(identifies(&CramfsFilesystem, &image));
        assert_magic_sensitive(&CramfsFilesystem, &image, 0..4);
        assert_rejects_one_sector(&CramfsFilesystem, &image);
    }

    #[test]
    fn test_wrong_signature_warns() {
        let mut image = cramfs_image(Endianness::Big);
        image.put(16, b"Compressed RAMFS");
        let source = image.build();
        let info = CramfsFilesystem.get_information(&source, &whole(&source), None).unwrap();
        assert!(info.report.has_warnings());
        assert!(info.report.to_string().contains("Directories are sorted"));
    }

    #[test]
    fn test_read_only_is_a_stub() {
        let mut handle = CramfsFilesystem.read_only().unwrap();
        assert!(handle.read_dir("/").unwrap_err().is_unsupported());
    }
}
