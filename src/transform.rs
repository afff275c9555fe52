use glam::{EulerRot, Mat4, Quat, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    fn component(self, v: &mut Vec3) -> &mut f32 {
        match self {
            Axis::X => &mut v.x,
            Axis::Y => &mut v.y,
            Axis::Z => &mut v.z,
        }
    }
}

/// Placement of one scene object.
///
/// Rotation is kept as yaw/pitch/roll in degrees (about Y, X and Z). The matrix is rebuilt
/// from the components on every call, so repeated small edits never skew the basis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    /// `(pitch, yaw, roll)` stored as `(x, y, z)` in degrees.
    pub rotation_degrees: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self { position: Vec3::ZERO, rotation_degrees: Vec3::ZERO, scale: Vec3::ONE }
    }
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self { position, ..Self::default() }
    }

    pub fn rotation(&self) -> Quat {
        let r = self.rotation_degrees;
        Quat::from_euler(EulerRot::YXZ, r.y.to_radians(), r.x.to_radians(), r.z.to_radians())
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation(), self.position)
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    pub fn add_position(&mut self, delta: Vec3) {
        self.position += delta;
    }

    pub fn set_position_axis(&mut self, axis: Axis, value: f32) {
        *axis.component(&mut self.position) = value;
    }

    pub fn add_position_axis(&mut self, axis: Axis, delta: f32) {
        *axis.component(&mut self.position) += delta;
    }

    /// Sets rotation from yaw (about Y), pitch (about X) and roll (about Z), in degrees.
    pub fn set_rotation(&mut self, yaw: f32, pitch: f32, roll: f32) {
        self.rotation_degrees = Vec3::new(pitch, yaw, roll);
    }

    pub fn add_rotation(&mut self, yaw: f32, pitch: f32, roll: f32) {
        self.rotation_degrees += Vec3::new(pitch, yaw, roll);
        self.rotation_degrees = wrap_degrees(self.rotation_degrees);
    }

    pub fn set_rotation_axis(&mut self, axis: Axis, degrees: f32) {
        *axis.component(&mut self.rotation_degrees) = degrees;
    }

    pub fn add_rotation_axis(&mut self, axis: Axis, degrees: f32) {
        *axis.component(&mut self.rotation_degrees) += degrees;
        self.rotation_degrees = wrap_degrees(self.rotation_degrees);
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
    }

    pub fn set_uniform_scale(&mut self, scale: f32) {
        self.scale = Vec3::splat(scale);
    }

    pub fn add_scale(&mut self, delta: Vec3) {
        self.scale += delta;
    }

    pub fn set_scale_axis(&mut self, axis: Axis, value: f32) {
        *axis.component(&mut self.scale) = value;
    }

    pub fn add_scale_axis(&mut self, axis: Axis, delta: f32) {
        *axis.component(&mut self.scale) += delta;
    }
}

fn wrap_degrees(v: Vec3) -> Vec3 {
    Vec3::new(v.x.rem_euclid(360.0), v.y.rem_euclid(360.0), v.z.rem_euclid(360.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec3, b: Vec3) -> bool {
        a.abs_diff_eq(b, 1e-4)
    }

    #[test]
    fn matrix_applies_scale_then_rotation_then_translation() {
        let mut t = Transform::from_position(Vec3::new(1.0, 2.0, 3.0));
        t.set_uniform_scale(2.0);
        t.set_rotation(90.0, 0.0, 0.0);
        let p = t.matrix().transform_point3(Vec3::X);
        assert!(approx(p, Vec3::new(1.0, 2.0, 1.0)), "{p:?}");
    }

    #[test]
    fn per_axis_edits_touch_one_component() {
        let mut t = Transform::default();
        t.set_position_axis(Axis::Y, 4.0);
        t.add_position_axis(Axis::Y, 1.0);
        t.add_scale_axis(Axis::Z, 1.0);
        assert_eq!(t.position, Vec3::new(0.0, 5.0, 0.0));
        assert_eq!(t.scale, Vec3::new(1.0, 1.0, 2.0));
    }

    #[test]
    fn accumulated_rotation_stays_orthonormal() {
        let mut t = Transform::default();
        for _ in 0..10_000 {
            t.add_rotation(0.37, 0.11, 0.05);
        }
        let m = t.matrix();
        let x = m.x_axis.truncate();
        let y = m.y_axis.truncate();
        assert!((x.length() - 1.0).abs() < 1e-4);
        assert!(x.dot(y).abs() < 1e-4);
        assert!(t.rotation_degrees.max_element() < 360.0);
    }
}
