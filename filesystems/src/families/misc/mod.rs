// Formats that fit no larger family

pub mod aodos;
pub mod ucsd;

pub use aodos::AodosFilesystem;
pub use ucsd::{UcsdFilesystem, UcsdReadOnly};
