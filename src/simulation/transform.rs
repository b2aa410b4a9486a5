//! World-space to grid-space conversion for the water source.

use glam::{Mat4, Vec3};

/// Maps a world position into normalized terrain grid space.
///
/// `terrain_to_world` is the terrain's local-to-world transform. The result has x and
/// z in `[0, 1]` across the terrain extent and y forced to 0.
pub fn world_to_grid(terrain_to_world: &Mat4, world_pos: Vec3, width: f32, length: f32) -> Vec3 {
    let local = terrain_to_world.inverse().transform_point3(world_pos);
    Vec3::new(local.x / width, 0.0, local.z / length)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: Vec3, b: Vec3) -> bool {
        (a - b).abs().max_element() < 1e-5
    }

    #[test]
    fn test_origin_maps_to_origin() {
        let grid = world_to_grid(&Mat4::IDENTITY, Vec3::ZERO, 100.0, 100.0);
        assert_eq!(grid, Vec3::ZERO);
    }

    #[test]
    fn test_center_maps_to_half() {
        let grid = world_to_grid(&Mat4::IDENTITY, Vec3::new(50.0, 0.0, 50.0), 100.0, 100.0);
        assert!(approx_eq(grid, Vec3::new(0.5, 0.0, 0.5)));
    }

    #[test]
    fn test_vertical_component_dropped() {
        let grid = world_to_grid(&Mat4::IDENTITY, Vec3::new(25.0, 40.0, 75.0), 100.0, 100.0);
        assert!(approx_eq(grid, Vec3::new(0.25, 0.0, 0.75)));
    }

    #[test]
    fn test_translated_terrain() {
        let terrain = Mat4::from_translation(Vec3::new(-64.0, 5.0, 10.0));
        let grid = world_to_grid(&terrain, Vec3::new(0.0, 0.0, 42.0), 128.0, 64.0);
        assert!(approx_eq(grid, Vec3::new(0.5, 0.0, 0.5)));
    }

    #[test]
    fn test_scaled_terrain() {
        let terrain = Mat4::from_scale(Vec3::splat(2.0));
        let grid = world_to_grid(&terrain, Vec3::new(100.0, 0.0, 50.0), 100.0, 100.0);
        assert!(approx_eq(grid, Vec3::new(0.5, 0.0, 0.25)));
    }
}
