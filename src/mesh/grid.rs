//! Regular subdivided grid mesh used for both the ground and the water surface.

use glam::{Vec2, Vec3};
use thiserror::Error;

/// Errors that can occur while building a grid mesh.
#[derive(Debug, Error, PartialEq)]
pub enum MeshError {
    #[error("Subdivisions must be at least 1 on both axes (got {0}x{1})")]
    InvalidSubdivisions(u32, u32),
    #[error("Terrain extent must be finite and positive (got {0}x{1})")]
    InvalidExtent(f32, f32),
}

/// A flat lattice of vertices in the X/Z plane with normalized UVs and 32-bit indices.
///
/// Heights are applied later by displacing vertices with a sampled height texture, so
/// every position has `y == 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct GridMesh {
    subdivisions_x: u32,
    subdivisions_z: u32,
    positions: Vec<Vec3>,
    uvs: Vec<Vec2>,
    indices: Vec<u32>,
}

impl GridMesh {
    /// Builds the lattice spanning `[0, width] x [0, length]`.
    ///
    /// # Arguments
    /// * `width` - Terrain extent along X
    /// * `length` - Terrain extent along Z
    /// * `subdivisions_x` - Number of cells along X (at least 1)
    /// * `subdivisions_z` - Number of cells along Z (at least 1)
    ///
    /// # Returns
    /// `(subdivisions_x + 1) * (subdivisions_z + 1)` vertices and
    /// `6 * subdivisions_x * subdivisions_z` indices.
    pub fn build(
        width: f32,
        length: f32,
        subdivisions_x: u32,
        subdivisions_z: u32,
    ) -> Result<Self, MeshError> {
        if subdivisions_x == 0 || subdivisions_z == 0 {
            return Err(MeshError::InvalidSubdivisions(subdivisions_x, subdivisions_z));
        }
        if !(width.is_finite() && length.is_finite() && width > 0.0 && length > 0.0) {
            return Err(MeshError::InvalidExtent(width, length));
        }

        let verts_x = subdivisions_x + 1;
        let verts_z = subdivisions_z + 1;
        let vertex_count = (verts_x as usize) * (verts_z as usize);

        let step_x = width / subdivisions_x as f32;
        let step_z = length / subdivisions_z as f32;

        let mut positions = Vec::with_capacity(vertex_count);
        let mut uvs = Vec::with_capacity(vertex_count);
        for i in 0..verts_z {
            for j in 0..verts_x {
                positions.push(Vec3::new(j as f32 * step_x, 0.0, i as f32 * step_z));
                uvs.push(Vec2::new(
                    j as f32 / subdivisions_x as f32,
                    i as f32 / subdivisions_z as f32,
                ));
            }
        }

        let mut indices =
            Vec::with_capacity(6 * (subdivisions_x as usize) * (subdivisions_z as usize));
        for i in 0..subdivisions_z {
            for j in 0..subdivisions_x {
                let a = i * verts_x + j;
                let b = a + 1;
                let c = a + verts_x;
                let d = c + 1;

                // Both triangles share the b-c diagonal and wind the same way.
                indices.extend_from_slice(&[a, c, b, b, c, d]);
            }
        }

        Ok(Self {
            subdivisions_x,
            subdivisions_z,
            positions,
            uvs,
            indices,
        })
    }

    pub fn subdivisions(&self) -> (u32, u32) {
        (self.subdivisions_x, self.subdivisions_z)
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn uvs(&self) -> &[Vec2] {
        &self.uvs
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Index of the vertex at column `j` (along X) and row `i` (along Z).
    pub fn vertex_index(&self, j: u32, i: u32) -> usize {
        (i as usize) * (self.subdivisions_x as usize + 1) + j as usize
    }
}
