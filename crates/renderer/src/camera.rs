//! Orbit camera driven by mouse drags.

use std::f32::consts::PI;

use glam::{Mat4, Vec3};

const MIN_PHI: f32 = 0.1;
const MAX_PHI: f32 = PI - 0.1;
const MIN_RADIUS: f32 = 5.0;
const MAX_RADIUS: f32 = 150.0;

/// Radians of rotation per dragged pixel.
const ROTATE_SPEED: f32 = 0.25 * PI / 180.0;
/// World units of zoom per dragged pixel.
const ZOOM_SPEED: f32 = 0.2;

/// A camera on a sphere around the origin, always looking at it.
///
/// `theta` is the azimuth in the xz-plane, `phi` the polar angle from +Y.
#[derive(Clone, Debug, PartialEq)]
pub struct OrbitCamera {
    theta: f32,
    phi: f32,
    radius: f32,
    fov_y: f32,
    aspect: f32,
    near: f32,
    far: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            theta: 1.5 * PI,
            phi: 0.5 * PI - 0.1,
            radius: 50.0,
            fov_y: 0.25 * PI,
            aspect: 16.0 / 9.0,
            near: 1.0,
            far: 1000.0,
        }
    }
}

impl OrbitCamera {
    /// Create a camera with the given aspect ratio.
    pub fn new(aspect: f32) -> Self {
        Self {
            aspect,
            ..Self::default()
        }
    }

    /// Rotate by a mouse drag of `(dx, dy)` pixels.
    pub fn rotate(&mut self, dx: f32, dy: f32) {
        self.theta += dx * ROTATE_SPEED;
        self.phi = (self.phi + dy * ROTATE_SPEED).clamp(MIN_PHI, MAX_PHI);
    }

    /// Move toward or away from the origin by a mouse drag of `(dx, dy)` pixels.
    pub fn zoom(&mut self, dx: f32, dy: f32) {
        self.radius = (self.radius + (dx - dy) * ZOOM_SPEED).clamp(MIN_RADIUS, MAX_RADIUS);
    }

    /// Update the aspect ratio.
    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
    }

    /// Camera position in world space.
    pub fn position(&self) -> Vec3 {
        let (sin_phi, cos_phi) = self.phi.sin_cos();
        let (sin_theta, cos_theta) = self.theta.sin_cos();
        Vec3::new(
            self.radius * sin_phi * cos_theta,
            self.radius * cos_phi,
            self.radius * sin_phi * sin_theta,
        )
    }

    /// Get the view matrix.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position(), Vec3::ZERO, Vec3::Y)
    }

    /// Get the projection matrix (with Vulkan Y-flip).
    pub fn projection_matrix(&self) -> Mat4 {
        let mut proj = Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far);
        // Flip Y for Vulkan coordinate system
        proj.y_axis.y *= -1.0;
        proj
    }

    #[inline]
    pub fn near(&self) -> f32 {
        self.near
    }

    #[inline]
    pub fn far(&self) -> f32 {
        self.far
    }

    #[inline]
    pub fn radius(&self) -> f32 {
        self.radius
    }

    #[inline]
    pub fn phi(&self) -> f32 {
        self.phi
    }

    #[inline]
    pub fn theta(&self) -> f32 {
        self.theta
    }
}
