//! Runtime components for service launching

pub mod launcher;
pub mod probe;
pub mod process;
pub mod registry;

pub use launcher::*;
pub use probe::*;
pub use process::*;
pub use registry::*;
