//! Service table configuration

pub mod service_file;

pub use service_file::*;
