// Apple II and classic Mac OS

pub mod hfs;
pub mod prodos;

pub use hfs::HfsFilesystem;
pub use prodos::ProdosFilesystem;
