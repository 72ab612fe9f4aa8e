// Probing whole images through the built-in registry

use relic_core::test_utils::{FailingSectorSource, ImageBuilder};
use relic_core::{
    Endianness, FieldWriter, Filesystem, MediaInfo, MemorySectorSource, Partition, RelicError, Result,
    SectorSource,
};
use relic_filesystems::{builtin_filesystems, builtin_registry, AodosFilesystem, CramfsFilesystem};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn whole(source: &dyn SectorSource) -> Partition {
    Partition::whole(&source.info())
}

fn romfs_header(name: &[u8], valid_checksum: bool) -> Vec<u8> {
    let mut header = FieldWriter::new(512, Endianness::Big);
    header.bytes(0, b"-rom1fs-").u32(8, 4096).bytes(16, name);
    let sum = relic_core::decoder::word_sum32(header.as_bytes(), Endianness::Big);
    let checksum = sum.wrapping_neg();
    header.u32(12, if valid_checksum { checksum } else { checksum ^ 0x10 });
    header.into_bytes()
}

/// UCSD Pascal directory with no files, written little-endian at block 2.
fn ucsd_volume_entry(blocks: i16) -> Vec<u8> {
    let mut entry = FieldWriter::new(26, Endianness::Little);
    entry.i16(0, 0).i16(2, 6).i16(4, 0).u8(6, 4).bytes(7, b"WORK").i16(14, blocks).i16(16, 0);
    entry.into_bytes()
}

#[test]
fn test_aodos_floppy_is_identified() {
    init_logging();
    let mut image = ImageBuilder::new(512, 800);
    image.put(0x1C, b" AO-DOS ");
    let source = image.build();
    let partition = whole(&source);

    assert!(AodosFilesystem.identify(&source, &partition).unwrap());
    let info = AodosFilesystem.get_information(&source, &partition, None).unwrap();
    assert_eq!(info.metadata.clusters, 800);

    let registry = builtin_registry().unwrap();
    let report = registry.probe(&source, &partition);
    assert!(report.failures.is_empty());
    assert_eq!(report.names(), vec![AodosFilesystem.name()]);
}

#[test]
fn test_aodos_needs_floppy_geometry() {
    let mut image = ImageBuilder::new(512, 801);
    image.put(0x1C, b" AO-DOS ");
    let source = image.build();
    assert!(!AodosFilesystem.identify(&source, &whole(&source)).unwrap());
}

#[test]
fn test_cramfs_byte_orders_agree() {
    let build = |endianness| {
        let mut sb = FieldWriter::new(64, endianness);
        sb.u32(0, 0x28CD_3D45)
            .u32(4, 4096)
            .bytes(16, b"Compressed ROMFS")
            .u32(40, 1)
            .u32(44, 3)
            .bytes(48, b"boot");
        let mut image = ImageBuilder::new(512, 8);
        image.put(0, sb.as_bytes());
        image.build()
    };
    let le = build(Endianness::Little);
    let be = build(Endianness::Big);
    assert_ne!(le.clone().into_inner(), be.clone().into_inner());

    let le_info = CramfsFilesystem.get_information(&le, &whole(&le), None).unwrap();
    let be_info = CramfsFilesystem.get_information(&be, &whole(&be), None).unwrap();
    assert_eq!(le_info.metadata, be_info.metadata);
    assert_eq!(le_info.metadata.files, Some(3));
}

#[test]
fn test_checksum_mismatch_still_describes() {
    let mut image = ImageBuilder::new(512, 8);
    image.put(0, &romfs_header(b"bad\0", false));
    let source = image.build();

    let registry = builtin_registry().unwrap();
    let (descriptions, failures) = registry.describe(&source, &whole(&source), None);
    assert!(failures.is_empty());
    assert_eq!(descriptions.len(), 1);
    let info = descriptions[0].info.as_ref().unwrap();
    assert_eq!(info.metadata.fs_type, "romfs");
    assert!(info.report.has_warnings());
}

#[test]
fn test_every_match_is_reported_in_order() {
    let mut image = ImageBuilder::new(512, 64);
    image.put(0, &romfs_header(b"dual\0", true));
    image.put(1024, &ucsd_volume_entry(64));
    let source = image.build();
    let partition = whole(&source);
    let registry = builtin_registry().unwrap();

    let report = registry.probe(&source, &partition);
    assert_eq!(report.names(), vec!["Linux RomFS", "U.C.S.D. Pascal filesystem"]);
    assert_eq!(report.names(), registry.probe_concurrent(&source, &partition).names());
    assert_eq!(registry.first_match(&source, &partition).unwrap().name(), "Linux RomFS");

    let (descriptions, _) = registry.describe(&source, &partition, None);
    let types: Vec<_> = descriptions
        .iter()
        .map(|d| d.info.as_ref().unwrap().metadata.fs_type.clone())
        .collect();
    assert_eq!(types, vec!["romfs", "UCSD Pascal"]);
}

/// Fails every read at or beyond `from_lba`, like a disk with a bad tail.
struct BadTail {
    inner: MemorySectorSource,
    from_lba: u64,
}

impl SectorSource for BadTail {
    fn info(&self) -> MediaInfo {
        self.inner.info()
    }

    fn read_sectors(&self, lba: u64, count: u64) -> Result<Vec<u8>> {
        if lba + count > self.from_lba {
            return Err(RelicError::IoError(std::io::Error::new(std::io::ErrorKind::Other, "bad sector")));
        }
        self.inner.read_sectors(lba, count)
    }
}

#[test]
fn test_io_failure_is_isolated() {
    init_logging();
    let mut image = ImageBuilder::new(512, 256);
    image.put(0, &romfs_header(b"tail\0", true));
    let source = BadTail { inner: image.build(), from_lba: 64 };

    let report = builtin_registry().unwrap().probe(&source, &whole(&source));
    assert_eq!(report.names(), vec!["Linux RomFS"]);
    let failed: Vec<_> = report.failures.iter().map(|f| f.name).collect();
    assert!(failed.contains(&"ISO9660 Filesystem"));
    assert!(failed.contains(&"Reiser Filesystem Plugin"));
    assert!(report.failures.iter().all(|f| matches!(f.error, RelicError::IoError(_))));
}

#[test]
fn test_unreadable_medium_fails_every_reader() {
    let source = FailingSectorSource::new(512, 800);
    let report = builtin_registry().unwrap().probe(&source, &whole(&source));
    assert!(report.is_empty());
    assert!(report.failures.iter().any(|f| f.name == AodosFilesystem.name()));
    assert!(report.failures.iter().all(|f| !f.error.is_mismatch()));
}

#[test]
fn test_blank_medium_matches_nothing() {
    let source = MemorySectorSource::new(vec![0u8; 1440 * 1024], 512);
    let report = builtin_registry().unwrap().probe(&source, &whole(&source));
    assert!(report.is_empty());
    assert!(report.failures.is_empty());
}

#[test]
fn test_foreign_images_are_not_described() {
    init_logging();
    let blank = MemorySectorSource::new(vec![0u8; 4096 * 512], 512);
    let mut formatted = ImageBuilder::new(512, 4096);
    formatted.fill(0, 4096 * 512, 0xE5);
    let mut short = ImageBuilder::new(2048, 2);
    short.fill(0, 2 * 2048, 0xE5);
    let images = [("blank", blank), ("0xE5 fill", formatted.build()), ("two sectors", short.build())];

    for fs in builtin_filesystems() {
        for (label, source) in &images {
            let partition = whole(source);
            assert!(!fs.identify(source, &partition).unwrap(), "{} matched the {} image", fs.name(), label);
            match fs.get_information(source, &partition, None) {
                Err(e) => assert!(e.is_mismatch(), "{} on the {} image: {}", fs.name(), label, e),
                Ok(info) => panic!("{} described the {} image as {}", fs.name(), label, info.metadata.fs_type),
            }
        }
    }
}

#[test]
fn test_image_file_source() {
    use relic_core::FileSectorSource;
    use std::io::Write;

    let mut image = ImageBuilder::new(512, 8);
    image.put(0, &romfs_header(b"file\0", true));
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(image.bytes()).unwrap();
    file.flush().unwrap();

    let source = FileSectorSource::open(file.path(), 512).unwrap();
    let registry = builtin_registry().unwrap();
    let (descriptions, failures) = registry.describe(&source, &whole(&source), None);
    assert!(failures.is_empty());
    assert_eq!(descriptions[0].info.as_ref().unwrap().metadata.volume_name.as_deref(), Some("file"));
}
