//! Ground and water surfaces with their presented-texture bindings.

use serde::{Deserialize, Serialize};

use crate::textures::TextureId;
use super::grid::{GridMesh, MeshError};

/// Which of the two renderable surfaces a mesh belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SurfaceKind {
    Ground,
    Water,
}

/// Material slot a presented texture is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureSlot {
    /// Vertex displacement source for the surface itself.
    HeightMap,
    /// Material weights for ground shading.
    SplatMap,
    /// Ground height under the water column.
    GroundHeightMap,
}

impl TextureSlot {
    /// Shader-side property name for the slot.
    pub fn property_name(self) -> &'static str {
        match self {
            TextureSlot::HeightMap => "_HeightMap",
            TextureSlot::SplatMap => "_SplatMap",
            TextureSlot::GroundHeightMap => "_GroundHeightMap",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureBinding {
    pub slot: TextureSlot,
    pub texture: TextureId,
}

/// A renderable surface: grid geometry plus the presented textures it samples.
#[derive(Debug, Clone)]
pub struct Surface {
    pub kind: SurfaceKind,
    pub mesh: GridMesh,
    pub bindings: Vec<TextureBinding>,
}

impl Surface {
    /// Builds a surface of the given kind with its standard bindings.
    pub fn build(
        kind: SurfaceKind,
        width: f32,
        length: f32,
        subdivisions_x: u32,
        subdivisions_z: u32,
    ) -> Result<Self, MeshError> {
        let mesh = GridMesh::build(width, length, subdivisions_x, subdivisions_z)?;
        let bindings = match kind {
            SurfaceKind::Ground => vec![
                TextureBinding { slot: TextureSlot::SplatMap, texture: TextureId::GroundSplat },
                TextureBinding { slot: TextureSlot::HeightMap, texture: TextureId::GroundHeight },
            ],
            SurfaceKind::Water => vec![
                TextureBinding { slot: TextureSlot::HeightMap, texture: TextureId::WaterHeight },
                TextureBinding { slot: TextureSlot::GroundHeightMap, texture: TextureId::GroundHeight },
            ],
        };
        Ok(Self { kind, mesh, bindings })
    }

    /// Returns the texture bound to `slot`, if any.
    pub fn binding(&self, slot: TextureSlot) -> Option<TextureId> {
        self.bindings
            .iter()
            .find(|b| b.slot == slot)
            .map(|b| b.texture)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ground_bindings() {
        let ground = Surface::build(SurfaceKind::Ground, 16.0, 16.0, 4, 4).unwrap();
        assert_eq!(ground.binding(TextureSlot::SplatMap), Some(TextureId::GroundSplat));
        assert_eq!(ground.binding(TextureSlot::HeightMap), Some(TextureId::GroundHeight));
        assert_eq!(ground.binding(TextureSlot::GroundHeightMap), None);
    }

    #[test]
    fn test_water_bindings() {
        let water = Surface::build(SurfaceKind::Water, 16.0, 16.0, 4, 4).unwrap();
        assert_eq!(water.binding(TextureSlot::HeightMap), Some(TextureId::WaterHeight));
        assert_eq!(water.binding(TextureSlot::GroundHeightMap), Some(TextureId::GroundHeight));
        assert_eq!(water.mesh.vertex_count(), 25);
    }
}
