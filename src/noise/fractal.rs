//! Multi-octave noise maps normalized to `[0, 1]`.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::source::NoiseSource;

/// Errors that can occur while generating a noise map.
#[derive(Debug, Error, PartialEq)]
pub enum NoiseError {
    #[error("Noise scale must be positive (got {0})")]
    InvalidScale(f32),
    #[error("At least one octave is required")]
    ZeroOctaves,
    #[error("Noise map dimensions must be non-zero (got {0}x{1})")]
    EmptyField(u32, u32),
    #[error("Persistence must be finite and positive (got {0})")]
    InvalidPersistence(f32),
    #[error("Lacunarity must be finite and positive (got {0})")]
    InvalidLacunarity(f32),
    #[error("Octave weights overflow after {0} octaves")]
    OctaveOverflow(u32),
}

/// Parameters for multi-octave noise map generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseMapConfig {
    /// Cells per unit of noise space; larger values give broader features.
    pub scale: f32,
    /// Number of noise layers summed per cell.
    pub octaves: u32,
    /// Amplitude multiplier per octave.
    pub persistence: f32,
    /// Frequency multiplier per octave.
    pub lacunarity: f32,
}

impl Default for NoiseMapConfig {
    fn default() -> Self {
        Self {
            scale: 32.0,
            octaves: 4,
            persistence: 0.5,
            lacunarity: 2.0,
        }
    }
}

impl NoiseMapConfig {
    pub fn validate(&self) -> Result<(), NoiseError> {
        if !(self.scale > 0.0) {
            return Err(NoiseError::InvalidScale(self.scale));
        }
        if self.octaves == 0 {
            return Err(NoiseError::ZeroOctaves);
        }
        if !(self.persistence.is_finite() && self.persistence > 0.0) {
            return Err(NoiseError::InvalidPersistence(self.persistence));
        }
        if !(self.lacunarity.is_finite() && self.lacunarity > 0.0) {
            return Err(NoiseError::InvalidLacunarity(self.lacunarity));
        }

        // Twice the summed amplitude bounds the normalization span.
        let mut amplitude = 1.0f32;
        let mut frequency = 1.0f32;
        let mut total = 0.0f32;
        for octave in 0..self.octaves {
            total += amplitude;
            if !((total * 2.0).is_finite() && (frequency / self.scale).is_finite()) {
                return Err(NoiseError::OctaveOverflow(octave + 1));
            }
            amplitude *= self.persistence;
            frequency *= self.lacunarity;
        }
        Ok(())
    }
}

/// A 2D scalar field stored in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseField {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl NoiseField {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Value at `(x, y)`, or `None` outside the field.
    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.values
            .get((y as usize) * (self.width as usize) + x as usize)
            .copied()
    }

    /// Global min and max over the field.
    pub fn range(&self) -> (f32, f32) {
        self.values
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)))
    }
}

/// Generates a normalized noise map.
///
/// Each cell sums `octaves` layers of `source` sampled around the field center; every
/// raw sample is remapped from `[0, 1]` to `[-1, 1]` before weighting. The finished
/// field is normalized into `[0, 1]` against its global min/max. A perfectly flat
/// field normalizes to 0.5 everywhere.
///
/// # Arguments
/// * `source` - Coherent noise function
/// * `width` - Field width in cells
/// * `height` - Field height in cells
/// * `config` - Scale, octave count, persistence and lacunarity
pub fn generate_noise_map<S: NoiseSource>(
    source: &S,
    width: u32,
    height: u32,
    config: &NoiseMapConfig,
) -> Result<NoiseField, NoiseError> {
    config.validate()?;
    if width == 0 || height == 0 {
        return Err(NoiseError::EmptyField(width, height));
    }

    let half_width = width as f32 / 2.0;
    let half_height = height as f32 / 2.0;

    let mut values = vec![0.0f32; (width as usize) * (height as usize)];
    values.par_iter_mut().enumerate().for_each(|(i, value)| {
        let x = (i % width as usize) as f32;
        let y = (i / width as usize) as f32;

        let mut amplitude = 1.0f32;
        let mut frequency = 1.0f32;
        let mut total = 0.0f32;
        for _ in 0..config.octaves {
            let sample_x = (x - half_width) / config.scale * frequency;
            let sample_y = (y - half_height) / config.scale * frequency;

            total += (source.sample(sample_x, sample_y) * 2.0 - 1.0) * amplitude;

            amplitude *= config.persistence;
            frequency *= config.lacunarity;
        }
        *value = total;
    });

    let mut field = NoiseField { width, height, values };
    let (min, max) = field.range();
    if (max - min).is_finite() && max > min {
        let span = max - min;
        for v in &mut field.values {
            let t = (*v - min) / span;
            *v = if t.is_nan() { 0.5 } else { t.clamp(0.0, 1.0) };
        }
    } else {
        field.values.fill(0.5);
    }

    Ok(field)
}
