//! Export module for saving simulation textures and noise fields to disk.
//!
//! Supports 16-bit PNG for quick inspection and RAW formats for engine
//! imports or exact float round-trips.

mod png;
mod raw;

use thiserror::Error;

pub use png::{
    export_noise_png,
    export_scalar_png_f32,
    export_texture_png,
    PngExportOptions,
};
pub use raw::{export_texture_raw, expected_file_size, RawFormat};

/// Errors that can occur during export.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Invalid value range: min ({0}) >= max ({1})")]
    InvalidRange(f32, f32),
    #[error("Scalar data length {actual} != expected {expected}")]
    DataLength { expected: usize, actual: usize },
}
