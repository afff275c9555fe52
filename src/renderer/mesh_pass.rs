use glam::{Mat3, Mat4, Vec3};

/// Per-draw uniform block. Field order and padding mirror `SceneConstants` in
/// `scene.wgsl`; every member is 16-byte aligned.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SceneConstants {
    pub model: [[f32; 4]; 4],
    pub view_proj: [[f32; 4]; 4],
    pub normal_matrix: [[f32; 4]; 4],
    pub camera_pos: [f32; 3],
    pub shininess: f32,
    pub light_view_proj: [[f32; 4]; 4],
    pub light_dir: [f32; 3],
    pub _pad0: f32,
    pub specular: [f32; 3],
    pub opacity: f32,
    pub emissive: [f32; 3],
    pub _pad1: f32,
}

/// Per-material scalars copied into each slice.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MaterialScalars {
    pub specular: Vec3,
    pub emissive: Vec3,
    pub shininess: f32,
    pub opacity: f32,
}

impl Default for MaterialScalars {
    fn default() -> Self {
        Self { specular: Vec3::ONE, emissive: Vec3::ZERO, shininess: 128.0, opacity: 1.0 }
    }
}

/// Frame-wide values shared by every slice.
#[derive(Clone, Copy, Debug)]
pub struct FrameConstants {
    pub view_proj: Mat4,
    pub camera_pos: Vec3,
    pub light_view_proj: Mat4,
    pub light_dir: Vec3,
}

impl SceneConstants {
    pub fn new(model: Mat4, frame: &FrameConstants, material: &MaterialScalars) -> Self {
        // Inverse-transpose of the upper 3x3 keeps normals perpendicular under non-uniform scale.
        // A collapsed (zero-scale) axis has no inverse; fall back to identity instead of NaNs.
        let upper = Mat3::from_mat4(model);
        let normal = if upper.determinant().abs() > f32::EPSILON {
            Mat4::from_mat3(upper.inverse().transpose())
        } else {
            Mat4::IDENTITY
        };
        Self {
            model: model.to_cols_array_2d(),
            view_proj: frame.view_proj.to_cols_array_2d(),
            normal_matrix: normal.to_cols_array_2d(),
            camera_pos: frame.camera_pos.to_array(),
            shininess: material.shininess,
            light_view_proj: frame.light_view_proj.to_cols_array_2d(),
            light_dir: frame.light_dir.normalize_or_zero().to_array(),
            _pad0: 0.0,
            specular: material.specular.to_array(),
            opacity: material.opacity,
            emissive: material.emissive.to_array(),
            _pad1: 0.0,
        }
    }
}

/// Open main color pass. Obtained from `Renderer::begin_main_pass` and handed back to
/// `Renderer::end_main_pass`; draws go through the renderer so they are counted.
pub struct MainPassScope {
    pub(super) pass: wgpu::RenderPass<'static>,
    pub(super) pipeline: super::pipeline::PipelineKind,
}

impl MainPassScope {
    pub fn pipeline(&self) -> super::pipeline::PipelineKind {
        self.pipeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn layout_matches_shader_block() {
        assert_eq!(size_of::<SceneConstants>(), 320);
        assert_eq!(offset_of!(SceneConstants, camera_pos), 192);
        assert_eq!(offset_of!(SceneConstants, shininess), 204);
        assert_eq!(offset_of!(SceneConstants, light_view_proj), 208);
        assert_eq!(offset_of!(SceneConstants, light_dir), 272);
        assert_eq!(offset_of!(SceneConstants, specular), 288);
        assert_eq!(offset_of!(SceneConstants, emissive), 304);
    }

    #[test]
    fn normal_matrix_undoes_non_uniform_scale() {
        let frame = FrameConstants {
            view_proj: Mat4::IDENTITY,
            camera_pos: Vec3::ZERO,
            light_view_proj: Mat4::IDENTITY,
            light_dir: Vec3::new(0.0, -2.0, 0.0),
        };
        let model = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let constants = SceneConstants::new(model, &frame, &MaterialScalars::default());
        assert!((constants.normal_matrix[0][0] - 0.5).abs() < 1e-6);
        assert_eq!(constants.light_dir, [0.0, -1.0, 0.0]);
        assert_eq!(constants.shininess, 128.0);
    }

    #[test]
    fn zero_scale_model_keeps_normals_finite() {
        let frame = FrameConstants {
            view_proj: Mat4::IDENTITY,
            camera_pos: Vec3::ZERO,
            light_view_proj: Mat4::IDENTITY,
            light_dir: Vec3::NEG_Y,
        };
        let model = Mat4::from_scale(Vec3::new(1.0, 0.0, 1.0));
        let constants = SceneConstants::new(model, &frame, &MaterialScalars::default());
        assert!(constants.normal_matrix.iter().flatten().all(|v| v.is_finite()));
        assert_eq!(constants.normal_matrix, Mat4::IDENTITY.to_cols_array_2d());
    }
}
