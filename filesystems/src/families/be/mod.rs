pub mod befs;

pub use befs::BefsFilesystem;
