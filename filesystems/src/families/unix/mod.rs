// UNIX and UNIX-like filesystems

pub mod bfs;
pub mod efs;
pub mod minix;
pub mod reiserfs;
pub mod sysv;
pub mod xfs;

pub use bfs::BfsFilesystem;
pub use efs::EfsFilesystem;
pub use minix::MinixFilesystem;
pub use reiserfs::ReiserFilesystem;
pub use sysv::SysvFilesystem;
pub use xfs::XfsFilesystem;
