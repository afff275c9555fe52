use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::renderer::device::GpuDevice;

/// How texel values are interpreted. Color maps are sRGB, data maps are linear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSpace {
    Srgb,
    Linear,
}

impl TextureSpace {
    fn format(self) -> wgpu::TextureFormat {
        match self {
            TextureSpace::Srgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            TextureSpace::Linear => wgpu::TextureFormat::Rgba8Unorm,
        }
    }
}

/// A sampled 2D texture with its default view.
pub struct Texture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: (u32, u32),
    space: TextureSpace,
}

impl Texture {
    /// Decodes an image file (png, jpeg, tga, bmp or hdr) and uploads it.
    pub fn load(gpu: &GpuDevice, path: &Path, space: TextureSpace) -> Result<Self> {
        let img = image::open(path).with_context(|| format!("Failed to decode texture {}", path.display()))?;
        let rgba = img.to_rgba8();
        let (w, h) = rgba.dimensions();
        let label = path.file_name().and_then(|name| name.to_str()).unwrap_or("Texture");
        Self::from_rgba8(gpu, label, w, h, rgba.as_raw(), space)
    }

    /// 1x1 texture of a single color.
    pub fn solid(gpu: &GpuDevice, label: &str, rgba: [u8; 4], space: TextureSpace) -> Result<Self> {
        Self::from_rgba8(gpu, label, 1, 1, &rgba, space)
    }

    pub fn from_rgba8(
        gpu: &GpuDevice,
        label: &str,
        width: u32,
        height: u32,
        rgba: &[u8],
        space: TextureSpace,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            bail!("texture '{label}' has zero size");
        }
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            bail!("texture '{label}' expects {expected} bytes, got {}", rgba.len());
        }
        let max = gpu.device().limits().max_texture_dimension_2d;
        if width > max || height > max {
            bail!("texture '{label}' is {width}x{height}, device limit is {max}");
        }
        let extent = wgpu::Extent3d { width, height, depth_or_array_layers: 1 };
        let texture = gpu.device().create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: space.format(),
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        gpu.queue().write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::TexelCopyBufferLayout { offset: 0, bytes_per_row: Some(4 * width), rows_per_image: Some(height) },
            extent,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(Self { texture, view, size: (width, height), space })
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn space(&self) -> TextureSpace {
        self.space
    }
}

pub fn create_material_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("Material Sampler"),
        address_mode_u: wgpu::AddressMode::Repeat,
        address_mode_v: wgpu::AddressMode::Repeat,
        address_mode_w: wgpu::AddressMode::Repeat,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::test_support::headless_gpu;

    #[test]
    fn rejects_mismatched_pixel_data() {
        let Some(gpu) = headless_gpu() else { return };
        assert!(Texture::from_rgba8(&gpu, "bad", 2, 2, &[0; 12], TextureSpace::Srgb).is_err());
        assert!(Texture::from_rgba8(&gpu, "empty", 0, 2, &[], TextureSpace::Srgb).is_err());
        let ok = Texture::solid(&gpu, "white", [255; 4], TextureSpace::Linear).unwrap();
        assert_eq!(ok.size(), (1, 1));
        assert_eq!(ok.space(), TextureSpace::Linear);
    }

    #[test]
    fn oversized_images_are_an_error() {
        let Some(gpu) = headless_gpu() else { return };
        let too_wide = gpu.device().limits().max_texture_dimension_2d + 1;
        let pixels = vec![255u8; too_wide as usize * 4];
        let err = Texture::from_rgba8(&gpu, "wide", too_wide, 1, &pixels, TextureSpace::Srgb)
            .err()
            .expect("oversized texture must be rejected");
        assert!(err.to_string().contains("device limit"), "{err}");
    }

    #[test]
    fn loads_png_from_disk() {
        let Some(gpu) = headless_gpu() else { return };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checker.png");
        let img = image::RgbaImage::from_fn(4, 2, |x, _| {
            if x % 2 == 0 {
                image::Rgba([255, 0, 0, 255])
            } else {
                image::Rgba([0, 0, 255, 255])
            }
        });
        img.save(&path).unwrap();
        let texture = Texture::load(&gpu, &path, TextureSpace::Srgb).unwrap();
        assert_eq!(texture.size(), (4, 2));
        assert!(Texture::load(&gpu, &dir.path().join("missing.png"), TextureSpace::Srgb).is_err());
    }
}
