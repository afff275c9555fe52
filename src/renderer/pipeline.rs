use anyhow::{anyhow, Result};
use std::num::NonZeroU64;

use super::device::GpuDevice;
use super::DEPTH_FORMAT;
use crate::mesh::MeshVertex;

/// Bind group slots shared by every pipeline.
pub const SCENE_GROUP: u32 = 0;
pub const MATERIAL_GROUP: u32 = 1;
pub const SHADOW_GROUP: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    Opaque,
    Shadow,
    AlphaBlend,
}

impl PipelineKind {
    pub fn label(self) -> &'static str {
        match self {
            PipelineKind::Opaque => "Opaque Pipeline",
            PipelineKind::Shadow => "Shadow Pipeline",
            PipelineKind::AlphaBlend => "Alpha Pipeline",
        }
    }

    pub fn writes_depth(self) -> bool {
        !matches!(self, PipelineKind::AlphaBlend)
    }

    pub fn cull_mode(self) -> Option<wgpu::Face> {
        match self {
            PipelineKind::Opaque | PipelineKind::Shadow => Some(wgpu::Face::Back),
            PipelineKind::AlphaBlend => None,
        }
    }

    pub fn blend(self) -> Option<wgpu::BlendState> {
        match self {
            PipelineKind::AlphaBlend => Some(wgpu::BlendState::ALPHA_BLENDING),
            PipelineKind::Opaque | PipelineKind::Shadow => None,
        }
    }

    /// Shadow rendering is depth-only and binds nothing but scene constants.
    pub fn is_depth_only(self) -> bool {
        matches!(self, PipelineKind::Shadow)
    }
}

/// Bind group layouts: scene constants (dynamic offset), material textures and the
/// shadow map with its comparison sampler.
pub struct BindingLayouts {
    pub scene: wgpu::BindGroupLayout,
    pub material: wgpu::BindGroupLayout,
    pub shadow: wgpu::BindGroupLayout,
}

impl BindingLayouts {
    pub fn new(device: &wgpu::Device, scene_payload: NonZeroU64) -> Self {
        let scene = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Scene Constants BGL"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: Some(scene_payload),
                },
                count: None,
            }],
        });

        let texture_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let material = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Material BGL"),
            entries: &[
                texture_entry(0),
                texture_entry(1),
                texture_entry(2),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let shadow = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Shadow Sample BGL"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                    count: None,
                },
            ],
        });

        Self { scene, material, shadow }
    }
}

/// Depth bias applied when rendering into the shadow map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowBias {
    pub constant: i32,
    pub slope_scale: f32,
}

impl Default for ShadowBias {
    fn default() -> Self {
        Self { constant: 2, slope_scale: 2.0 }
    }
}

/// One immutable pipeline. Switching is a bind on the pass, never a mutation.
pub struct PipelineState {
    kind: PipelineKind,
    pipeline: wgpu::RenderPipeline,
}

impl PipelineState {
    /// Compiles the shaders and bakes fixed-function state for `kind`.
    ///
    /// Runs inside a validation error scope so shader or layout errors come back as an
    /// `Err` instead of reaching the uncaptured-error handler.
    pub fn create(
        gpu: &GpuDevice,
        layouts: &BindingLayouts,
        kind: PipelineKind,
        color_format: wgpu::TextureFormat,
        shadow_bias: ShadowBias,
    ) -> Result<Self> {
        let device = gpu.device();
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = if kind.is_depth_only() {
            build_shadow_pipeline(device, layouts, shadow_bias)
        } else {
            build_color_pipeline(device, layouts, kind, color_format)
        };
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(anyhow!("{} creation failed: {err}", kind.label()));
        }
        log::debug!("created {}", kind.label());
        Ok(Self { kind, pipeline })
    }

    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    pub fn raw(&self) -> &wgpu::RenderPipeline {
        &self.pipeline
    }
}

fn build_color_pipeline(
    device: &wgpu::Device,
    layouts: &BindingLayouts,
    kind: PipelineKind,
    color_format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Scene Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("../../assets/shaders/scene.wgsl").into()),
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Scene Pipeline Layout"),
        bind_group_layouts: &[&layouts.scene, &layouts.material, &layouts.shadow],
        push_constant_ranges: &[],
    });
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(kind.label()),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[MeshVertex::layout()],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: color_format,
                blend: kind.blend(),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: kind.cull_mode(),
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: kind.writes_depth(),
            depth_compare: wgpu::CompareFunction::LessEqual,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

fn build_shadow_pipeline(device: &wgpu::Device, layouts: &BindingLayouts, bias: ShadowBias) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Shadow Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("../../assets/shaders/shadow.wgsl").into()),
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Shadow Pipeline Layout"),
        bind_group_layouts: &[&layouts.scene],
        push_constant_ranges: &[],
    });
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(PipelineKind::Shadow.label()),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[MeshVertex::position_only_layout()],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: None,
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: PipelineKind::Shadow.cull_mode(),
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::LessEqual,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState { constant: bias.constant, slope_scale: bias.slope_scale, clamp: 0.0 },
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

/// The three pipelines a frame uses.
pub struct PipelineSet {
    pub opaque: PipelineState,
    pub shadow: PipelineState,
    pub alpha: PipelineState,
}

impl PipelineSet {
    pub fn create(
        gpu: &GpuDevice,
        layouts: &BindingLayouts,
        color_format: wgpu::TextureFormat,
        shadow_bias: ShadowBias,
    ) -> Result<Self> {
        Ok(Self {
            opaque: PipelineState::create(gpu, layouts, PipelineKind::Opaque, color_format, shadow_bias)?,
            shadow: PipelineState::create(gpu, layouts, PipelineKind::Shadow, color_format, shadow_bias)?,
            alpha: PipelineState::create(gpu, layouts, PipelineKind::AlphaBlend, color_format, shadow_bias)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_function_state_per_kind() {
        assert!(PipelineKind::Opaque.writes_depth());
        assert_eq!(PipelineKind::Opaque.cull_mode(), Some(wgpu::Face::Back));
        assert!(PipelineKind::Opaque.blend().is_none());

        assert!(!PipelineKind::AlphaBlend.writes_depth());
        assert!(PipelineKind::AlphaBlend.cull_mode().is_none());
        assert!(PipelineKind::AlphaBlend.blend().is_some());

        assert!(PipelineKind::Shadow.is_depth_only());
        assert!(PipelineKind::Shadow.writes_depth());
        assert!(!PipelineKind::Opaque.is_depth_only());
    }

    #[test]
    fn all_pipelines_compile_on_a_real_device() {
        let Some(gpu) = crate::renderer::test_support::headless_gpu() else { return };
        let payload = NonZeroU64::new(std::mem::size_of::<super::super::SceneConstants>() as u64).unwrap();
        let layouts = BindingLayouts::new(gpu.device(), payload);
        let set = PipelineSet::create(&gpu, &layouts, wgpu::TextureFormat::Bgra8UnormSrgb, ShadowBias::default())
            .expect("pipelines");
        assert_eq!(set.opaque.kind(), PipelineKind::Opaque);
        assert_eq!(set.shadow.kind(), PipelineKind::Shadow);
        assert_eq!(set.alpha.kind(), PipelineKind::AlphaBlend);
    }
}
