//! Float textures written by the kernel and their presented copies.
//!
//! Each logical quantity has a live texture the kernel writes every step and a
//! presented texture consumers sample. `present` copies the whole live texture once
//! per frame so readers never observe a half-finished frame.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TextureError {
    #[error("Texture dimensions must be non-zero (got {0}x{1})")]
    InvalidDimensions(u32, u32),
    #[error("Could not allocate a {0}x{1} texture")]
    ResourceExhaustion(u32, u32),
    #[error("Texture size mismatch: {0}x{1} vs {2}x{3}")]
    DimensionMismatch(u32, u32, u32, u32),
}

/// The three quantities derived from the cell grid for rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureId {
    WaterHeight,
    GroundHeight,
    GroundSplat,
}

impl TextureId {
    pub const ALL: [TextureId; 3] = [
        TextureId::WaterHeight,
        TextureId::GroundHeight,
        TextureId::GroundSplat,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TextureId::WaterHeight => "water_height",
            TextureId::GroundHeight => "ground_height",
            TextureId::GroundSplat => "ground_splat",
        }
    }
}

/// Single-channel `f32` texture in row-major order (`z * dim_x + x`).
#[derive(Debug, Clone, PartialEq)]
pub struct FloatTexture {
    dim_x: u32,
    dim_z: u32,
    writable: bool,
    texels: Vec<f32>,
}

impl FloatTexture {
    /// Allocates a texture filled with `initial_value`.
    ///
    /// `writable` marks textures the kernel may write to (live textures); presented
    /// textures are only ever filled through [`present`].
    pub fn allocate(
        dim_x: u32,
        dim_z: u32,
        initial_value: f32,
        writable: bool,
    ) -> Result<Self, TextureError> {
        if dim_x == 0 || dim_z == 0 {
            return Err(TextureError::InvalidDimensions(dim_x, dim_z));
        }
        let len = (dim_x as usize)
            .checked_mul(dim_z as usize)
            .ok_or(TextureError::ResourceExhaustion(dim_x, dim_z))?;

        let mut texels = Vec::new();
        texels
            .try_reserve_exact(len)
            .map_err(|_| TextureError::ResourceExhaustion(dim_x, dim_z))?;
        texels.resize(len, initial_value);

        Ok(Self {
            dim_x,
            dim_z,
            writable,
            texels,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.dim_x, self.dim_z)
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn texels(&self) -> &[f32] {
        &self.texels
    }

    pub fn texels_mut(&mut self) -> &mut [f32] {
        &mut self.texels
    }

    /// Texel at `(x, z)`, or `None` outside the texture.
    pub fn get(&self, x: u32, z: u32) -> Option<f32> {
        if x >= self.dim_x || z >= self.dim_z {
            return None;
        }
        self.texels
            .get((z as usize) * (self.dim_x as usize) + x as usize)
            .copied()
    }

    /// Min and max texel values.
    pub fn value_range(&self) -> (f32, f32) {
        self.texels
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)))
    }
}

/// Copies every texel of `live` into `target`.
pub fn present(live: &FloatTexture, target: &mut FloatTexture) -> Result<(), TextureError> {
    if live.dimensions() != target.dimensions() {
        return Err(TextureError::DimensionMismatch(
            live.dim_x,
            live.dim_z,
            target.dim_x,
            target.dim_z,
        ));
    }
    target.texels.copy_from_slice(&live.texels);
    Ok(())
}

/// A live texture and the copy consumers read from.
#[derive(Debug, Clone)]
pub struct TexturePair {
    pub live: FloatTexture,
    pub presented: FloatTexture,
}

impl TexturePair {
    fn allocate(dim_x: u32, dim_z: u32, initial_value: f32) -> Result<Self, TextureError> {
        Ok(Self {
            live: FloatTexture::allocate(dim_x, dim_z, initial_value, true)?,
            presented: FloatTexture::allocate(dim_x, dim_z, initial_value, false)?,
        })
    }
}

/// Mutable views of the live textures handed to a kernel step.
pub struct KernelTargets<'a> {
    pub water_height: &'a mut [f32],
    pub ground_height: &'a mut [f32],
    pub ground_splat: &'a mut [f32],
}

/// All render textures for one simulation grid.
#[derive(Debug, Clone)]
pub struct TextureCache {
    water_height: TexturePair,
    ground_height: TexturePair,
    ground_splat: TexturePair,
}

impl TextureCache {
    /// Allocates the three texture pairs. Water textures start at `water_initial`,
    /// ground textures at zero.
    pub fn allocate(dim_x: u32, dim_z: u32, water_initial: f32) -> Result<Self, TextureError> {
        Ok(Self {
            water_height: TexturePair::allocate(dim_x, dim_z, water_initial)?,
            ground_height: TexturePair::allocate(dim_x, dim_z, 0.0)?,
            ground_splat: TexturePair::allocate(dim_x, dim_z, 0.0)?,
        })
    }

    pub fn pair(&self, id: TextureId) -> &TexturePair {
        match id {
            TextureId::WaterHeight => &self.water_height,
            TextureId::GroundHeight => &self.ground_height,
            TextureId::GroundSplat => &self.ground_splat,
        }
    }

    pub fn live(&self, id: TextureId) -> &FloatTexture {
        &self.pair(id).live
    }

    pub fn presented(&self, id: TextureId) -> &FloatTexture {
        &self.pair(id).presented
    }

    pub fn live_targets(&mut self) -> KernelTargets<'_> {
        KernelTargets {
            water_height: self.water_height.live.texels_mut(),
            ground_height: self.ground_height.live.texels_mut(),
            ground_splat: self.ground_splat.live.texels_mut(),
        }
    }

    /// Copies every live texture into its presented texture.
    pub fn present_all(&mut self) -> Result<(), TextureError> {
        for pair in [
            &mut self.water_height,
            &mut self.ground_height,
            &mut self.ground_splat,
        ] {
            present(&pair.live, &mut pair.presented)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_honors_initial_value() {
        let tex = FloatTexture::allocate(4, 3, 0.1, true).unwrap();
        assert_eq!(tex.dimensions(), (4, 3));
        assert_eq!(tex.texels().len(), 12);
        assert!(tex.texels().iter().all(|&v| v == 0.1));
        assert!(tex.is_writable());
    }

    #[test]
    fn test_non_square_dimensions() {
        let tex = FloatTexture::allocate(8, 2, 0.0, false).unwrap();
        assert_eq!(tex.texels().len(), 16);
        assert!(!tex.is_writable());
    }

    #[test]
    fn test_rejects_empty_texture() {
        assert_eq!(
            FloatTexture::allocate(0, 8, 0.0, true),
            Err(TextureError::InvalidDimensions(0, 8))
        );
    }

    #[test]
    fn test_present_copies_everything() {
        let mut live = FloatTexture::allocate(3, 3, 0.0, true).unwrap();
        for (i, t) in live.texels_mut().iter_mut().enumerate() {
            *t = i as f32;
        }
        let mut target = FloatTexture::allocate(3, 3, 0.0, false).unwrap();
        present(&live, &mut target).unwrap();
        assert_eq!(live.texels(), target.texels());
        assert_eq!(target.get(2, 1), Some(5.0));
        assert_eq!(target.get(3, 0), None);
        assert_eq!(target.get(0, 3), None);
    }

    #[test]
    fn test_present_rejects_mismatch() {
        let live = FloatTexture::allocate(3, 3, 0.0, true).unwrap();
        let mut target = FloatTexture::allocate(3, 4, 0.0, false).unwrap();
        assert!(matches!(
            present(&live, &mut target),
            Err(TextureError::DimensionMismatch(3, 3, 3, 4))
        ));
    }

    #[test]
    fn test_cache_present_all() {
        let mut cache = TextureCache::allocate(4, 4, 0.0).unwrap();
        cache.live_targets().ground_height[5] = 2.5;
        assert_eq!(cache.presented(TextureId::GroundHeight).texels()[5], 0.0);

        cache.present_all().unwrap();
        assert_eq!(cache.presented(TextureId::GroundHeight).texels()[5], 2.5);
        for id in TextureId::ALL {
            assert_eq!(cache.live(id).texels(), cache.presented(id).texels());
        }
    }
}
