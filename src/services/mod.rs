//! File I/O and format handling kept apart from the pixel pipeline

pub mod format;
pub mod io;

pub use format::OutputFormatHandler;
pub use io::{ImageIOService, LoadedImage};
