// Read-only images built for ROMs, initrds and firmware

pub mod cramfs;
pub mod romfs;
pub mod squashfs;

pub use cramfs::CramfsFilesystem;
pub use romfs::RomfsFilesystem;
pub use squashfs::SquashFilesystem;
