// ============================================================================
// ORBIT CAMERA — perspective view of the field plus pointer unprojection
// ============================================================================

use glam::{Mat4, Vec2, Vec3, Vec4Swizzles};

/// Fallback pointer scale (NDC -> world units) when the pointer ray misses
/// the field plane.
pub const POINTER_NDC_SCALE: f32 = 14.0;

const MIN_DISTANCE: f32 = 2.0;
const MAX_DISTANCE: f32 = 30.0;
const PITCH_LIMIT: f32 = 1.45;
/// Radians per second at auto-rotate speed 1.0 (one orbit per minute).
const AUTO_ROTATE_RATE: f32 = std::f32::consts::TAU / 60.0;

/// Perspective camera orbiting the origin.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrbitCamera {
    pub yaw: f32,
    pub pitch: f32,
    pub distance: f32,
    /// Vertical field of view, radians.
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
    /// 0 disables auto-rotation.
    pub auto_rotate_speed: f32,
}

impl Default for OrbitCamera {
    /// Looking at the origin from (3, 2, 5), 75 degree FOV.
    fn default() -> Self {
        Self::looking_from(Vec3::new(3.0, 2.0, 5.0))
    }
}

impl OrbitCamera {
    pub fn looking_from(eye: Vec3) -> Self {
        let distance = eye.length().max(MIN_DISTANCE);
        Self {
            yaw: eye.x.atan2(eye.z),
            pitch: (eye.y / distance).asin(),
            distance,
            fov_y: 75f32.to_radians(),
            near: 0.1,
            far: 1000.0,
            auto_rotate_speed: 0.0,
        }
    }

    pub fn eye(&self) -> Vec3 {
        let (sy, cy) = self.yaw.sin_cos();
        let (sp, cp) = self.pitch.sin_cos();
        Vec3::new(sy * cp, sp, cy * cp) * self.distance
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye(), Vec3::ZERO, Vec3::Y)
    }

    /// wgpu-style projection (depth 0..1).
    pub fn projection(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, aspect.max(1e-3), self.near, self.far)
    }

    /// Drag by `delta` radians of yaw / pitch.
    pub fn orbit(&mut self, d_yaw: f32, d_pitch: f32) {
        self.yaw += d_yaw;
        self.pitch = (self.pitch + d_pitch).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    /// Multiply the distance by `factor` (< 1 zooms in).
    pub fn zoom(&mut self, factor: f32) {
        if factor.is_finite() && factor > 0.0 {
            self.distance = (self.distance * factor).clamp(MIN_DISTANCE, MAX_DISTANCE);
        }
    }

    /// Advance auto-rotation by `dt` seconds.
    pub fn update(&mut self, dt: f32) {
        self.yaw += self.auto_rotate_speed * AUTO_ROTATE_RATE * dt;
    }

    /// Map a pointer at normalized device coords `ndc` (x right, y up, both
    /// in [-1, 1]) to the field plane z = 0 in field-local coordinates.
    pub fn pointer_on_field(&self, ndc: Vec2, aspect: f32, model: Mat4) -> Vec2 {
        self.ray_hit_field_plane(ndc, aspect, model)
            .unwrap_or(ndc * POINTER_NDC_SCALE)
    }

    fn ray_hit_field_plane(&self, ndc: Vec2, aspect: f32, model: Mat4) -> Option<Vec2> {
        // Ray from the eye through the pointer on the near plane, in world space.
        let inv_view_proj = (self.projection(aspect) * self.view()).inverse();
        let near = inv_view_proj * ndc.extend(0.0).extend(1.0);
        if near.w.abs() < 1e-8 {
            return None;
        }
        let eye = self.eye();
        let through = near.xyz() / near.w;

        // Into field-local space, where the plane is z = 0.
        let to_local = model.inverse();
        let origin = to_local.transform_point3(eye);
        let dir = to_local.transform_vector3(through - eye);
        if dir.z.abs() < 1e-9 {
            return None;
        }
        let s = -origin.z / dir.z;
        if s < 0.0 {
            return None;
        }
        let hit = origin + dir * s;
        hit.is_finite().then(|| Vec2::new(hit.x, hit.y))
    }
}
