// File-level access through the read-only contract

use relic_core::test_utils::ImageBuilder;
use relic_core::{
    Endianness, FieldWriter, FileKind, MountOptions, MountState, Partition, ReadOnlyFilesystem, RelicError,
    SectorSource,
};
use relic_filesystems::builtin_registry;
use std::sync::Arc;

/// UCSD Pascal volume "DEMO" inside a 16-block partition that starts at LBA 4.
fn ucsd_disk(endianness: Endianness) -> (Arc<dyn SectorSource + Send + Sync>, Partition) {
    let mut dir = FieldWriter::new(2 * 26, endianness);
    dir.i16(0, 0).i16(2, 6).u8(6, 4).bytes(7, b"DEMO").i16(14, 16).i16(16, 1);
    dir.i16(26, 6).i16(28, 7).i16(30, 3).u8(32, 8).bytes(33, b"CAF\xC9.TXT").i16(48, 5);

    let mut image = ImageBuilder::new(512, 20);
    image.put((4 + 2) * 512, dir.as_bytes());
    image.put((4 + 6) * 512, b"hello");
    (Arc::new(image.build()), Partition::new(4, 19))
}

fn handle_for(name: &str) -> Box<dyn ReadOnlyFilesystem> {
    builtin_registry().unwrap().get(name).unwrap().read_only().unwrap()
}

#[test]
fn test_mount_read_unmount() {
    for endianness in [Endianness::Little, Endianness::Big] {
        let (source, partition) = ucsd_disk(endianness);
        let mut fs = handle_for("U.C.S.D. Pascal filesystem");
        let options = MountOptions::parse(["encoding=latin1"]);
        fs.mount(source, partition, &options).unwrap();
        assert_eq!(fs.state(), MountState::Mounted);

        let entries = fs.read_dir("/").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "CAFÉ.TXT");
        assert_eq!(entries[0].attributes.kind, FileKind::File);
        assert_eq!(entries[0].attributes.size, 5);

        assert_eq!(fs.read("/cafÉ.txt", 0, 4096).unwrap(), b"hello");
        assert_eq!(fs.map_block("/CAFÉ.TXT", 0).unwrap(), 6);

        let statfs = fs.stat_fs().unwrap();
        assert_eq!(statfs.total_blocks, 16);
        assert_eq!(statfs.free_blocks, 9);
        assert_eq!(statfs.max_filename_length, 15);

        fs.unmount().unwrap();
        assert!(matches!(fs.read_dir("/"), Err(RelicError::NotMounted)));
    }
}

#[test]
fn test_handles_are_independent() {
    let (source, partition) = ucsd_disk(Endianness::Little);
    let mut first = handle_for("U.C.S.D. Pascal filesystem");
    let mut second = handle_for("U.C.S.D. Pascal filesystem");
    first.mount(source, partition, &MountOptions::new()).unwrap();
    assert_eq!(second.state(), MountState::Unmounted);
    assert!(matches!(second.stat("/"), Err(RelicError::NotMounted)));
    assert!(first.stat("/").unwrap().is_directory());
}

#[test]
fn test_stub_handles_refuse_to_mount() {
    let (source, partition) = ucsd_disk(Endianness::Little);
    for name in ["Cram filesystem", "Squash filesystem", "XFS Filesystem Plugin", "Be Filesystem"] {
        let mut fs = handle_for(name);
        let err = fs.mount(source.clone(), partition, &MountOptions::new()).unwrap_err();
        assert!(err.is_unsupported(), "{} mounted", name);
        assert_eq!(fs.state(), MountState::Unmounted);
    }
}

#[test]
fn test_identify_only_formats_have_no_handle() {
    let registry = builtin_registry().unwrap();
    assert!(registry.get("Linux RomFS").unwrap().read_only().is_none());
    assert!(registry.get("Apple Hierarchical File System").unwrap().read_only().is_none());
}
