//! Renderable surface geometry.
//!
//! The ground and the water surface share the same lattice; each one samples
//! different presented textures through its bindings.

mod grid;
mod surface;

pub use grid::{GridMesh, MeshError};
pub use surface::{Surface, SurfaceKind, TextureBinding, TextureSlot};
