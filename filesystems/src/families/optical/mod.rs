// CD-ROM filesystems

pub mod iso9660;
pub mod opera;

pub use iso9660::Iso9660Filesystem;
pub use opera::OperaFilesystem;
