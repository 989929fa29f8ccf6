//! Constant buffer layouts shared with the shaders.
//!
//! These structures must match the shader constant buffer layouts exactly.
//! All structures use `#[repr(C)]` for predictable memory layout and implement
//! `Pod` and `Zeroable` for safe byte casting. Each one is written into its own
//! 256-byte-aligned element of a frame slot's upload buffer.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};

/// Number of light slots in [`PassConstants`].
pub const MAX_LIGHTS: usize = 16;

/// A directional, point or spot light.
///
/// Which fields are read depends on the light type the shader assigns to the
/// slot; unused fields are ignored.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Light {
    pub strength: Vec3,
    /// Point/spot only.
    pub falloff_start: f32,
    /// Directional/spot only.
    pub direction: Vec3,
    /// Point/spot only.
    pub falloff_end: f32,
    /// Point/spot only.
    pub position: Vec3,
    /// Spot only.
    pub spot_power: f32,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            strength: Vec3::splat(0.5),
            falloff_start: 1.0,
            direction: Vec3::NEG_Y,
            falloff_end: 10.0,
            position: Vec3::ZERO,
            spot_power: 64.0,
        }
    }
}

impl Light {
    /// A directional light shining along `direction`.
    pub fn directional(direction: Vec3, strength: Vec3) -> Self {
        Self {
            direction,
            strength,
            ..Self::default()
        }
    }
}

/// Per-object constants.
///
/// # Memory Layout
///
/// - Offset 0: world matrix (64 bytes)
/// - Offset 64: texture transform (64 bytes)
/// - Total size: 128 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ObjectConstants {
    /// Object to world space.
    pub world: Mat4,
    /// Applied to the object's texture coordinates.
    pub tex_transform: Mat4,
}

impl ObjectConstants {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

impl Default for ObjectConstants {
    fn default() -> Self {
        Self {
            world: Mat4::IDENTITY,
            tex_transform: Mat4::IDENTITY,
        }
    }
}

/// Per-material constants.
///
/// # Memory Layout
///
/// - Offset 0: diffuse albedo (16 bytes)
/// - Offset 16: Fresnel R0 (12 bytes)
/// - Offset 28: roughness (4 bytes)
/// - Offset 32: material transform (64 bytes)
/// - Total size: 96 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct MaterialConstants {
    pub diffuse_albedo: Vec4,
    pub fresnel_r0: Vec3,
    pub roughness: f32,
    /// Scrolls or scales the material's textures.
    pub mat_transform: Mat4,
}

impl MaterialConstants {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

impl Default for MaterialConstants {
    fn default() -> Self {
        Self {
            diffuse_albedo: Vec4::ONE,
            fresnel_r0: Vec3::splat(0.01),
            roughness: 0.25,
            mat_transform: Mat4::IDENTITY,
        }
    }
}

/// Per-pass constants.
///
/// # Memory Layout
///
/// - Offset 0: view, inverse view, projection, inverse projection,
///   view-projection, inverse view-projection (6 x 64 bytes)
/// - Offset 384: eye position (12 bytes) + padding (4 bytes)
/// - Offset 400: render target size and its reciprocal (16 bytes)
/// - Offset 416: near z, far z, total time, delta time (16 bytes)
/// - Offset 432: ambient light (16 bytes)
/// - Offset 448: lights (16 x 48 bytes)
/// - Total size: 1216 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct PassConstants {
    pub view: Mat4,
    pub inv_view: Mat4,
    pub proj: Mat4,
    pub inv_proj: Mat4,
    pub view_proj: Mat4,
    pub inv_view_proj: Mat4,
    pub eye_pos_w: Vec3,
    /// Padding for 16-byte alignment.
    pub _padding: f32,
    pub render_target_size: Vec2,
    pub inv_render_target_size: Vec2,
    pub near_z: f32,
    pub far_z: f32,
    pub total_time: f32,
    pub delta_time: f32,
    pub ambient_light: Vec4,
    pub lights: [Light; MAX_LIGHTS],
}

impl PassConstants {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Fills the matrix block from a view and projection.
    pub fn set_camera(&mut self, view: Mat4, proj: Mat4, eye: Vec3) {
        let view_proj = proj * view;
        self.view = view;
        self.inv_view = view.inverse();
        self.proj = proj;
        self.inv_proj = proj.inverse();
        self.view_proj = view_proj;
        self.inv_view_proj = view_proj.inverse();
        self.eye_pos_w = eye;
    }
}

impl Default for PassConstants {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            inv_view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
            inv_proj: Mat4::IDENTITY,
            view_proj: Mat4::IDENTITY,
            inv_view_proj: Mat4::IDENTITY,
            eye_pos_w: Vec3::ZERO,
            _padding: 0.0,
            render_target_size: Vec2::ZERO,
            inv_render_target_size: Vec2::ZERO,
            near_z: 0.0,
            far_z: 0.0,
            total_time: 0.0,
            delta_time: 0.0,
            ambient_light: Vec4::new(0.0, 0.0, 0.0, 1.0),
            lights: [Light::default(); MAX_LIGHTS],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_light_size() {
        // 3 x (Vec3 + f32) = 48 bytes
        assert_eq!(std::mem::size_of::<Light>(), 48);
    }

    #[test]
    fn test_object_constants_size() {
        // 2 Mat4 (2 * 64) = 128 bytes
        assert_eq!(ObjectConstants::SIZE, 128);
    }

    #[test]
    fn test_material_constants_size() {
        assert_eq!(MaterialConstants::SIZE, 96);
    }

    #[test]
    fn test_pass_constants_size() {
        assert_eq!(PassConstants::SIZE, 1216);
    }

    #[test]
    fn test_set_camera() {
        let view = Mat4::look_at_rh(Vec3::new(0.0, 5.0, 10.0), Vec3::ZERO, Vec3::Y);
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_4, 16.0 / 9.0, 1.0, 1000.0);
        let mut pass = PassConstants::default();
        pass.set_camera(view, proj, Vec3::new(0.0, 5.0, 10.0));

        assert_eq!(pass.view_proj, proj * view);
        assert!((pass.inv_view * pass.view).abs_diff_eq(Mat4::IDENTITY, 1e-5));
        assert_eq!(pass.eye_pos_w, Vec3::new(0.0, 5.0, 10.0));
    }

    #[test]
    fn test_constants_pod() {
        let pass = PassConstants::default();
        let bytes: &[u8] = bytemuck::bytes_of(&pass);
        assert_eq!(bytes.len(), PassConstants::SIZE);

        let material = MaterialConstants::default();
        let bytes: &[u8] = bytemuck::bytes_of(&material);
        assert_eq!(bytes.len(), MaterialConstants::SIZE);
    }
}
