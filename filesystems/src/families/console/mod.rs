pub mod fatx;

pub use fatx::FatxFilesystem;
