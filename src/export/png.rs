//! PNG export for scalar grids.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ImageBuffer, ImageEncoder, Luma};

use crate::noise::NoiseField;
use crate::textures::FloatTexture;
use super::ExportError;

/// Options for PNG export.
#[derive(Debug, Clone)]
pub struct PngExportOptions {
    /// Value mapped to black.
    pub min_value: f32,
    /// Value mapped to white.
    pub max_value: f32,
    /// PNG compression type.
    pub compression: CompressionType,
    /// PNG filter type.
    pub filter: FilterType,
}

impl Default for PngExportOptions {
    fn default() -> Self {
        Self {
            min_value: 0.0,
            max_value: 1.0,
            compression: CompressionType::Default,
            filter: FilterType::Adaptive,
        }
    }
}

impl PngExportOptions {
    /// Creates options spanning the texture's observed range.
    ///
    /// A flat texture gets a unit-wide range starting at its value.
    pub fn auto_range(texture: &FloatTexture) -> Self {
        let (min, max) = texture.value_range();
        Self {
            min_value: min,
            max_value: if max > min { max } else { min + 1.0 },
            ..Default::default()
        }
    }
}

/// Export a row-major scalar grid as a 16-bit grayscale PNG.
///
/// `data` must be length `width*height`.
pub fn export_scalar_png_f32(
    width: u32,
    height: u32,
    data: &[f32],
    path: &Path,
    options: &PngExportOptions,
) -> Result<(), ExportError> {
    let (min, max) = (options.min_value, options.max_value);
    if !(min < max) {
        return Err(ExportError::InvalidRange(min, max));
    }
    let expected = (width as usize) * (height as usize);
    if data.len() != expected {
        return Err(ExportError::DataLength {
            expected,
            actual: data.len(),
        });
    }

    let range = max - min;
    let img: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::from_fn(width, height, |x, y| {
        let v = data[(y * width + x) as usize];
        // Normalize to [0, 1] then scale to u16
        let normalized = ((v - min) / range).clamp(0.0, 1.0);
        Luma([(normalized * 65535.0) as u16])
    });

    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    let encoder = PngEncoder::new_with_quality(writer, options.compression, options.filter);
    let byte_slice: &[u8] = bytemuck::cast_slice(img.as_raw());
    encoder.write_image(byte_slice, width, height, image::ExtendedColorType::L16)?;
    Ok(())
}

/// Exports a simulation texture; row `z` of the texture becomes image row `z`.
pub fn export_texture_png(
    texture: &FloatTexture,
    path: &Path,
    options: &PngExportOptions,
) -> Result<(), ExportError> {
    let (dim_x, dim_z) = texture.dimensions();
    export_scalar_png_f32(dim_x, dim_z, texture.texels(), path, options)
}

/// Exports a normalized noise field over the full `[0, 1]` range.
pub fn export_noise_png(field: &NoiseField, path: &Path) -> Result<(), ExportError> {
    export_scalar_png_f32(
        field.width(),
        field.height(),
        field.values(),
        path,
        &PngExportOptions::default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noise::{generate_noise_map, GradientNoise, NoiseMapConfig};
    use tempfile::tempdir;

    fn gradient_texture(dim_x: u32, dim_z: u32) -> FloatTexture {
        let mut texture = FloatTexture::allocate(dim_x, dim_z, 0.0, true).unwrap();
        for (i, v) in texture.texels_mut().iter_mut().enumerate() {
            *v = i as f32 * 0.25;
        }
        texture
    }

    #[test]
    fn test_export_texture_png() {
        let texture = gradient_texture(24, 16);
        let dir = tempdir().unwrap();
        let path = dir.path().join("water_height.png");

        export_texture_png(&texture, &path, &PngExportOptions::auto_range(&texture)).unwrap();

        let img = image::open(&path).unwrap().into_luma16();
        assert_eq!(img.dimensions(), (24, 16));
        assert_eq!(img.get_pixel(0, 0).0[0], 0);
        assert_eq!(img.get_pixel(23, 15).0[0], 65535);
    }

    #[test]
    fn test_export_noise_png() {
        let field =
            generate_noise_map(&GradientNoise::default(), 32, 32, &NoiseMapConfig::default()).unwrap();
        let dir = tempdir().unwrap();
        let path = dir.path().join("noise.png");

        export_noise_png(&field, &path).unwrap();

        assert!(path.exists());
        let metadata = std::fs::metadata(&path).unwrap();
        assert!(metadata.len() > 0);
    }

    #[test]
    fn test_invalid_range() {
        let texture = gradient_texture(8, 8);
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.png");

        let options = PngExportOptions {
            min_value: 1.0,
            max_value: -1.0,
            ..Default::default()
        };

        let result = export_texture_png(&texture, &path, &options);
        assert!(matches!(result, Err(ExportError::InvalidRange(..))));
        assert!(!path.exists());
    }

    #[test]
    fn test_data_length_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.png");
        let result = export_scalar_png_f32(4, 4, &[0.0; 15], &path, &PngExportOptions::default());
        assert!(matches!(result, Err(ExportError::DataLength { expected: 16, actual: 15 })));
    }

    #[test]
    fn test_auto_range_flat_texture() {
        let texture = FloatTexture::allocate(8, 8, 0.0, true).unwrap();
        let options = PngExportOptions::auto_range(&texture);
        assert_eq!(options.min_value, 0.0);
        assert_eq!(options.max_value, 1.0);
    }
}
