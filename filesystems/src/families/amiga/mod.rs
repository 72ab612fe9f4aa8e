pub mod sfs;

pub use sfs::SfsFilesystem;
