use crate::families::{amiga, apple, be, console, dec, embedded, hp, ibm, misc, optical, unix};
use log::info;
use relic_core::{Filesystem, FilesystemRegistry, Result};
use std::sync::Arc;

/// Every built-in descriptor, in probing order.
///
/// Formats with strong multi-byte magics come first; formats recognised by
/// plausibility checks over several fields (ProDOS, UCSD Pascal) come later so
/// their matches are reported after the unambiguous ones.
pub fn builtin_filesystems() -> Vec<Arc<dyn Filesystem>> {
    vec![
        Arc::new(misc::AodosFilesystem),
        Arc::new(embedded::CramfsFilesystem),
        Arc::new(embedded::SquashFilesystem),
        Arc::new(embedded::RomfsFilesystem),
        Arc::new(unix::MinixFilesystem),
        Arc::new(unix::SysvFilesystem),
        Arc::new(unix::BfsFilesystem),
        Arc::new(unix::EfsFilesystem),
        Arc::new(unix::XfsFilesystem),
        Arc::new(unix::ReiserFilesystem),
        Arc::new(be::BefsFilesystem),
        Arc::new(apple::HfsFilesystem),
        Arc::new(apple::ProdosFilesystem),
        Arc::new(dec::OdsFilesystem),
        Arc::new(dec::Rt11Filesystem),
        Arc::new(ibm::HpfsFilesystem),
        Arc::new(optical::Iso9660Filesystem),
        Arc::new(optical::OperaFilesystem),
        Arc::new(hp::LifFilesystem),
        Arc::new(misc::UcsdFilesystem),
        Arc::new(console::FatxFilesystem),
        Arc::new(amiga::SfsFilesystem),
    ]
}

/// Register all built-in descriptors with `registry`.
pub fn register_builtin_filesystems(registry: &mut FilesystemRegistry) -> Result<()> {
    for filesystem in builtin_filesystems() {
        registry.register(filesystem)?;
    }
    info!("Registered {} built-in filesystems", registry.len());
    Ok(())
}

/// A registry holding every built-in descriptor.
pub fn builtin_registry() -> Result<FilesystemRegistry> {
    let mut registry = FilesystemRegistry::new();
    register_builtin_filesystems(&mut registry)?;
    Ok(registry)
}
