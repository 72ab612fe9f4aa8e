// Digital Equipment Corporation

pub mod ods;
pub mod rt11;

pub use ods::OdsFilesystem;
pub use rt11::Rt11Filesystem;
