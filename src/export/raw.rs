//! RAW format export for game engine compatibility.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::textures::FloatTexture;
use super::ExportError;

/// RAW export format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawFormat {
    /// 16-bit unsigned integer, little-endian (Unity default).
    R16LittleEndian,
    /// 16-bit unsigned integer, big-endian.
    R16BigEndian,
    /// 32-bit float, little-endian (exact texel values).
    R32Float,
}

impl Default for RawFormat {
    fn default() -> Self {
        RawFormat::R32Float
    }
}

/// Exports a texture as a headerless RAW file in row-major order.
///
/// `min_value`/`max_value` normalize the R16 formats and are ignored for R32.
pub fn export_texture_raw(
    texture: &FloatTexture,
    path: &Path,
    format: RawFormat,
    min_value: f32,
    max_value: f32,
) -> Result<(), ExportError> {
    if format != RawFormat::R32Float && !(min_value < max_value) {
        return Err(ExportError::InvalidRange(min_value, max_value));
    }

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    let range = max_value - min_value;
    let to_u16 = |v: f32| (((v - min_value) / range).clamp(0.0, 1.0) * 65535.0) as u16;

    match format {
        RawFormat::R16LittleEndian => {
            for &v in texture.texels() {
                writer.write_all(&to_u16(v).to_le_bytes())?;
            }
        }
        RawFormat::R16BigEndian => {
            for &v in texture.texels() {
                writer.write_all(&to_u16(v).to_be_bytes())?;
            }
        }
        RawFormat::R32Float => {
            for &v in texture.texels() {
                writer.write_all(&v.to_le_bytes())?;
            }
        }
    }

    writer.flush()?;
    Ok(())
}

/// Returns the expected file size for a RAW export.
pub fn expected_file_size(dim_x: u32, dim_z: u32, format: RawFormat) -> u64 {
    let pixels = (dim_x as u64) * (dim_z as u64);
    match format {
        RawFormat::R16LittleEndian | RawFormat::R16BigEndian => pixels * 2,
        RawFormat::R32Float => pixels * 4,
    }
}
