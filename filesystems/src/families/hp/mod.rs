pub mod lif;

pub use lif::LifFilesystem;
