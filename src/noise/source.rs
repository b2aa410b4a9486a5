//! Coherent 2D noise sources.

use simdnoise::NoiseBuilder;

/// A coherent 2D noise function returning values nominally in `[0, 1]`.
pub trait NoiseSource: Sync {
    fn sample(&self, x: f32, y: f32) -> f32;
}

/// Seeded gradient noise backed by simdnoise.
#[derive(Debug, Clone, Copy)]
pub struct GradientNoise {
    seed: i32,
}

impl GradientNoise {
    pub fn new(seed: i32) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> i32 {
        self.seed
    }
}

impl Default for GradientNoise {
    fn default() -> Self {
        Self::new(42)
    }
}

impl NoiseSource for GradientNoise {
    fn sample(&self, x: f32, y: f32) -> f32 {
        // simdnoise gradient noise is roughly in [-1, 1].
        let value = NoiseBuilder::gradient_2d_offset(x, 1, y, 1)
            .with_seed(self.seed)
            .with_freq(1.0)
            .generate()
            .0[0];
        (value * 0.5 + 0.5).clamp(0.0, 1.0)
    }
}

/// Returns the same value everywhere.
#[derive(Debug, Clone, Copy)]
pub struct ConstantNoise(pub f32);

impl NoiseSource for ConstantNoise {
    fn sample(&self, _x: f32, _y: f32) -> f32 {
        self.0
    }
}
