// Descriptors for legacy and exotic on-disk formats
pub mod families;
pub mod registration;

pub use families::amiga::SfsFilesystem;
pub use families::apple::{HfsFilesystem, ProdosFilesystem};
pub use families::be::BefsFilesystem;
pub use families::console::FatxFilesystem;
pub use families::dec::{OdsFilesystem, Rt11Filesystem};
pub use families::embedded::{CramfsFilesystem, RomfsFilesystem, SquashFilesystem};
pub use families::hp::LifFilesystem;
pub use families::ibm::HpfsFilesystem;
pub use families::misc::{AodosFilesystem, UcsdFilesystem, UcsdReadOnly};
pub use families::optical::{Iso9660Filesystem, OperaFilesystem};
pub use families::unix::{
    BfsFilesystem, EfsFilesystem, MinixFilesystem, ReiserFilesystem, SysvFilesystem, XfsFilesystem,
};

pub use registration::{builtin_filesystems, builtin_registry, register_builtin_filesystems};
