use glam::{Mat4, Vec3};

use super::device::GpuDevice;
use super::pipeline::BindingLayouts;
use super::{Viewport, DEPTH_FORMAT};

const MIN_RESOLUTION: u32 = 256;
const MAX_RESOLUTION: u32 = 8192;

/// Clamps to 256..=8192, further capped by the device's 2D texture limit.
fn clamp_resolution(gpu: &GpuDevice, resolution: u32) -> u32 {
    let limit = gpu.device().limits().max_texture_dimension_2d;
    let max = MAX_RESOLUTION.min(limit).max(MIN_RESOLUTION);
    resolution.clamp(MIN_RESOLUTION, max)
}

/// Depth image rendered from the light and sampled by the main pass.
///
/// Its resolution is independent of the swap surface. At rest it sits in the
/// shader-read state; the renderer moves it to depth-write only for the shadow pass.
pub struct ShadowTarget {
    texture: wgpu::Texture,
    depth_view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    bind_group: wgpu::BindGroup,
    resolution: u32,
}

impl ShadowTarget {
    pub fn new(gpu: &GpuDevice, layouts: &BindingLayouts, resolution: u32) -> Self {
        let resolution = clamp_resolution(gpu, resolution);
        let device = gpu.device();
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Shadow Map"),
            size: wgpu::Extent3d { width: resolution, height: resolution, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let depth_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Shadow Map View"),
            format: Some(DEPTH_FORMAT),
            dimension: Some(wgpu::TextureViewDimension::D2),
            ..Default::default()
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Shadow Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            lod_min_clamp: 0.0,
            lod_max_clamp: 0.0,
            compare: Some(wgpu::CompareFunction::LessEqual),
            anisotropy_clamp: 1,
            border_color: None,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Shadow Sample BG"),
            layout: &layouts.shadow,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(&depth_view) },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::Sampler(&sampler) },
            ],
        });
        Self { texture, depth_view, sampler, bind_group, resolution }
    }

    /// Rebuilds the map at a new resolution. The GPU must be idle and the old contents
    /// are lost; the caller re-renders the map before it is sampled again.
    pub fn resize(&mut self, gpu: &GpuDevice, layouts: &BindingLayouts, resolution: u32) {
        if clamp_resolution(gpu, resolution) == self.resolution {
            return;
        }
        *self = Self::new(gpu, layouts, resolution);
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn viewport(&self) -> Viewport {
        Viewport::full(self.resolution, self.resolution)
    }

    /// Scissor rectangle as `(x, y, width, height)`.
    pub fn scissor(&self) -> (u32, u32, u32, u32) {
        (0, 0, self.resolution, self.resolution)
    }

    pub fn depth_view(&self) -> &wgpu::TextureView {
        &self.depth_view
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }

    /// Texture plus comparison sampler, bound at the shadow group of the main pass.
    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }
}

/// Orthographic view-projection for a directional light.
///
/// The light sits `distance` units back from `focus` along `-direction` and covers a
/// square of `2 * extent` on each side.
pub fn light_view_projection(direction: Vec3, focus: Vec3, extent: f32, distance: f32) -> Mat4 {
    let mut dir = direction.normalize_or_zero();
    if dir.length_squared() < 1e-6 {
        dir = Vec3::new(-0.4, -1.0, -0.3).normalize();
    }
    let eye = focus - dir * distance;
    let up = if dir.abs().dot(Vec3::Y) > 0.99 { Vec3::Z } else { Vec3::Y };
    let view = Mat4::look_at_rh(eye, focus, up);
    let extent = extent.max(0.01);
    let proj = Mat4::orthographic_rh(-extent, extent, -extent, extent, 0.01, distance * 2.0);
    proj * view
}

/// Open shadow pass. Only depth is bound.
pub struct ShadowPassScope {
    pub(super) pass: wgpu::RenderPass<'static>,
}
