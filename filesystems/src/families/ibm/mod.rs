pub mod hpfs;

pub use hpfs::HpfsFilesystem;
