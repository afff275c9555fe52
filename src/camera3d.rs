use glam::{Mat4, Vec2, Vec3};

use crate::config::CameraConfig;

const DEFAULT_UP: Vec3 = Vec3::Y;

/// Pitch is kept just inside straight up/down so the look-at basis never degenerates.
pub const PITCH_LIMIT: f32 = 1.553343;

/// Perspective camera with depth mapped to `[0, 1]`.
#[derive(Debug, Clone)]
pub struct Camera3D {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y_radians: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera3D {
    pub fn new(position: Vec3, target: Vec3, fov_y_radians: f32, near: f32, far: f32) -> Self {
        Self { position, target, up: DEFAULT_UP, fov_y_radians, aspect: 16.0 / 9.0, near, far }
    }

    pub fn from_config(config: &CameraConfig, aspect: f32) -> Self {
        let mut camera = Self::new(
            Vec3::new(0.0, 3.0, 8.0),
            Vec3::ZERO,
            config.fov_degrees.to_radians(),
            config.near,
            config.far,
        );
        camera.set_aspect(aspect);
        camera
    }

    pub fn look_at(&mut self, position: Vec3, target: Vec3) {
        self.position = position;
        self.target = target;
    }

    pub fn set_perspective(&mut self, fov_y_radians: f32, aspect: f32, near: f32, far: f32) {
        self.fov_y_radians = fov_y_radians;
        self.near = near;
        self.far = far;
        self.set_aspect(aspect);
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect.max(0.0001);
    }

    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize_or_zero()
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y_radians, self.aspect, self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

/// Input snapshot for one frame. Filled by the host from whatever device state it polls.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlyInput {
    pub forward: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
    pub fast: bool,
    /// Mouse movement in pixels since the last update; ignored unless `look` is held.
    pub mouse_delta: Vec2,
    pub look: bool,
}

/// First-person yaw/pitch controller driving a `Camera3D`.
#[derive(Debug, Clone)]
pub struct FlyCamera {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub move_speed: f32,
    pub fast_move_speed: f32,
    pub sensitivity: f32,
}

impl FlyCamera {
    pub fn new(position: Vec3, config: &CameraConfig) -> Self {
        Self {
            position,
            yaw: 0.0,
            pitch: 0.0,
            move_speed: config.move_speed,
            fast_move_speed: config.fast_move_speed,
            sensitivity: config.mouse_sensitivity,
        }
    }

    /// Starts at `position` facing `target`.
    pub fn looking_at(position: Vec3, target: Vec3, config: &CameraConfig) -> Self {
        let mut fly = Self::new(position, config);
        let dir = (target - position).normalize_or_zero();
        if dir != Vec3::ZERO {
            fly.yaw = dir.x.atan2(-dir.z);
            fly.pitch = dir.y.asin().clamp(-PITCH_LIMIT, PITCH_LIMIT);
        }
        fly
    }

    pub fn forward(&self) -> Vec3 {
        Vec3::new(self.yaw.sin() * self.pitch.cos(), self.pitch.sin(), -self.yaw.cos() * self.pitch.cos())
    }

    pub fn right(&self) -> Vec3 {
        self.forward().cross(DEFAULT_UP).normalize_or_zero()
    }

    pub fn update(&mut self, dt: f32, input: &FlyInput) {
        if input.look {
            self.yaw += input.mouse_delta.x * self.sensitivity;
            self.pitch = (self.pitch - input.mouse_delta.y * self.sensitivity).clamp(-PITCH_LIMIT, PITCH_LIMIT);
        }
        let mut wish = Vec3::ZERO;
        let forward = self.forward();
        let right = self.right();
        if input.forward {
            wish += forward;
        }
        if input.back {
            wish -= forward;
        }
        if input.right {
            wish += right;
        }
        if input.left {
            wish -= right;
        }
        if input.up {
            wish += DEFAULT_UP;
        }
        if input.down {
            wish -= DEFAULT_UP;
        }
        let speed = if input.fast { self.fast_move_speed } else { self.move_speed };
        self.position += wish.normalize_or_zero() * speed * dt.max(0.0);
    }

    pub fn apply_to(&self, camera: &mut Camera3D) {
        camera.look_at(self.position, self.position + self.forward());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    fn config() -> CameraConfig {
        CameraConfig::default()
    }

    #[test]
    fn view_projection_maps_target_inside_clip_volume() {
        let camera = Camera3D::new(Vec3::new(0.0, 1.0, 5.0), Vec3::ZERO, 45f32.to_radians(), 0.1, 1000.0);
        let clip = camera.view_projection() * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn pitch_is_clamped() {
        let mut fly = FlyCamera::new(Vec3::ZERO, &config());
        let input = FlyInput { look: true, mouse_delta: Vec2::new(0.0, -100_000.0), ..Default::default() };
        fly.update(0.016, &input);
        assert_eq!(fly.pitch, PITCH_LIMIT);
    }

    #[test]
    fn mouse_is_ignored_without_look() {
        let mut fly = FlyCamera::new(Vec3::ZERO, &config());
        fly.update(0.016, &FlyInput { mouse_delta: Vec2::new(50.0, 50.0), ..Default::default() });
        assert_eq!((fly.yaw, fly.pitch), (0.0, 0.0));
    }

    #[test]
    fn fast_movement_uses_fast_speed() {
        let cfg = config();
        let mut fly = FlyCamera::new(Vec3::ZERO, &cfg);
        fly.update(1.0, &FlyInput { forward: true, ..Default::default() });
        assert!((fly.position.length() - cfg.move_speed).abs() < 1e-4);
        assert!(fly.position.z < 0.0, "default heading is -Z");

        let mut fast = FlyCamera::new(Vec3::ZERO, &cfg);
        fast.update(1.0, &FlyInput { forward: true, fast: true, ..Default::default() });
        assert!((fast.position.length() - cfg.fast_move_speed).abs() < 1e-4);
    }

    #[test]
    fn looking_at_round_trips_direction() {
        let target = Vec3::new(3.0, 1.0, -4.0);
        let fly = FlyCamera::looking_at(Vec3::ZERO, target, &config());
        assert!(fly.forward().abs_diff_eq(target.normalize(), 1e-4));
    }
}
