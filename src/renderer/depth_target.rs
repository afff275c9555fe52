use winit::dpi::PhysicalSize;

use super::device::GpuDevice;
use super::DEPTH_FORMAT;

/// Depth value the main pass clears to.
pub const DEPTH_CLEAR: f32 = 1.0;

/// Depth buffer matching the swap surface dimensions.
pub struct DepthTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: PhysicalSize<u32>,
}

impl DepthTarget {
    pub fn new(gpu: &GpuDevice, size: PhysicalSize<u32>) -> Self {
        let (texture, view) = create_depth_texture(gpu.device(), size);
        Self { texture, view, size }
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    /// Recreates the buffer. Call only with the GPU idle.
    pub fn resize(&mut self, gpu: &GpuDevice, size: PhysicalSize<u32>) {
        if size == self.size {
            return;
        }
        let (texture, view) = create_depth_texture(gpu.device(), size);
        self.texture = texture;
        self.view = view;
        self.size = size;
    }
}

fn create_depth_texture(device: &wgpu::Device, size: PhysicalSize<u32>) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth Texture"),
        size: wgpu::Extent3d { width: size.width.max(1), height: size.height.max(1), depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}
