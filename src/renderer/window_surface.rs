use anyhow::{anyhow, bail, Context, Result};
use winit::dpi::PhysicalSize;

use super::device::GpuDevice;

const HEADLESS_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Bgra8UnormSrgb;

/// One acquired color image, valid until presented.
#[derive(Debug)]
pub struct SurfaceImage {
    view: wgpu::TextureView,
    surface: Option<wgpu::SurfaceTexture>,
    index: u32,
}

impl SurfaceImage {
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Hands the image to the compositor. Headless images are simply released.
    pub fn present(mut self) {
        if let Some(surface) = self.surface.take() {
            surface.present();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceErrorAction {
    Reconfigure,
    Retry,
    OutOfMemory,
    Unknown,
}

enum Backing {
    Window { surface: wgpu::Surface<'static>, config: wgpu::SurfaceConfiguration, present_modes: Vec<wgpu::PresentMode> },
    Headless { images: Vec<wgpu::Texture> },
}

/// The ring of color images rendered into and presented.
///
/// `current_index` names the image the next frame renders into and is advanced only by
/// `update_frame_index` after present. wgpu does not expose the swapchain's own index,
/// so the ring is walked in order; the headless backing owns real images and uses the
/// same ordering.
pub struct SwapSurface {
    backing: Backing,
    size: PhysicalSize<u32>,
    format: wgpu::TextureFormat,
    image_count: u32,
    current_index: u32,
    vsync: bool,
    #[cfg(test)]
    surface_error_injector: Option<wgpu::SurfaceError>,
}

impl SwapSurface {
    pub fn create_for_window(
        gpu: &GpuDevice,
        surface: wgpu::Surface<'static>,
        size: PhysicalSize<u32>,
        vsync: bool,
        image_count: u32,
    ) -> Result<Self> {
        if size.width == 0 || size.height == 0 {
            bail!("swap surface requires non-zero dimensions, got {}x{}", size.width, size.height);
        }
        let caps = surface.get_capabilities(gpu.adapter());
        let format = choose_surface_format(&caps.formats).context("Surface reports no supported formats")?;
        let alpha_mode = caps.alpha_modes.first().copied().unwrap_or(wgpu::CompositeAlphaMode::Auto);
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width,
            height: size.height,
            present_mode: select_present_mode(vsync, &caps.present_modes),
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: image_count.max(1),
        };
        surface.configure(gpu.device(), &config);
        log::info!("swap surface {}x{} {:?} {:?}", size.width, size.height, format, config.present_mode);
        Ok(Self {
            backing: Backing::Window { surface, config, present_modes: caps.present_modes },
            size,
            format,
            image_count: image_count.max(1),
            current_index: 0,
            vsync,
            #[cfg(test)]
            surface_error_injector: None,
        })
    }

    pub fn create_headless(gpu: &GpuDevice, size: PhysicalSize<u32>, image_count: u32) -> Result<Self> {
        if size.width == 0 || size.height == 0 {
            bail!("swap surface requires non-zero dimensions, got {}x{}", size.width, size.height);
        }
        let image_count = image_count.max(1);
        let images = create_headless_images(gpu.device(), size, image_count);
        Ok(Self {
            backing: Backing::Headless { images },
            size,
            format: HEADLESS_FORMAT,
            image_count,
            current_index: 0,
            vsync: false,
            #[cfg(test)]
            surface_error_injector: None,
        })
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn image_count(&self) -> u32 {
        self.image_count
    }

    pub fn current_index(&self) -> u32 {
        self.current_index
    }

    pub fn is_headless(&self) -> bool {
        matches!(self.backing, Backing::Headless { .. })
    }

    pub fn vsync_enabled(&self) -> bool {
        self.vsync
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.size.height == 0 {
            1.0
        } else {
            self.size.width as f32 / self.size.height as f32
        }
    }

    /// Rebuilds every image at the new size and restarts the ring at 0.
    ///
    /// The GPU must be idle: callers wait on the fence first.
    pub fn resize(&mut self, gpu: &GpuDevice, size: PhysicalSize<u32>) -> Result<()> {
        if size.width == 0 || size.height == 0 {
            bail!("cannot resize swap surface to {}x{}", size.width, size.height);
        }
        match &mut self.backing {
            Backing::Window { surface, config, .. } => {
                config.width = size.width;
                config.height = size.height;
                surface.configure(gpu.device(), config);
            }
            Backing::Headless { images } => {
                *images = create_headless_images(gpu.device(), size, self.image_count);
            }
        }
        self.size = size;
        self.current_index = 0;
        log::debug!("swap surface resized to {}x{}", size.width, size.height);
        Ok(())
    }

    pub fn set_vsync(&mut self, gpu: &GpuDevice, enabled: bool) {
        if self.vsync == enabled {
            return;
        }
        self.vsync = enabled;
        if let Backing::Window { surface, config, present_modes } = &mut self.backing {
            config.present_mode = select_present_mode(enabled, present_modes);
            surface.configure(gpu.device(), config);
        }
    }

    /// Acquires the image at `current_index`.
    ///
    /// `Ok(None)` means the frame should be skipped: the surface was lost and has been
    /// reconfigured, or acquisition timed out.
    pub fn acquire(&mut self, gpu: &GpuDevice) -> Result<Option<SurfaceImage>> {
        #[cfg(test)]
        if let Some(err) = self.surface_error_injector.take() {
            return self.handle_surface_error(gpu, &err).map(|_| None);
        }
        let index = self.current_index;
        let acquired = match &self.backing {
            Backing::Window { surface, .. } => surface.get_current_texture().map(|frame| {
                let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
                SurfaceImage { view, surface: Some(frame), index }
            }),
            Backing::Headless { images } => {
                let texture = images.get(index as usize).context("headless image missing")?;
                let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
                Ok(SurfaceImage { view, surface: None, index })
            }
        };
        match acquired {
            Ok(image) => Ok(Some(image)),
            Err(err) => self.handle_surface_error(gpu, &err).map(|_| None),
        }
    }

    /// Headless backing only: the texture behind image `index`, for readback.
    pub fn headless_texture(&self, index: u32) -> Option<&wgpu::Texture> {
        match &self.backing {
            Backing::Headless { images } => images.get(index as usize),
            Backing::Window { .. } => None,
        }
    }

    /// Moves to the next image after present.
    pub fn update_frame_index(&mut self) {
        self.current_index = (self.current_index + 1) % self.image_count;
    }

    fn handle_surface_error(&mut self, gpu: &GpuDevice, error: &wgpu::SurfaceError) -> Result<()> {
        match surface_error_action(error) {
            SurfaceErrorAction::Reconfigure => {
                log::warn!("surface lost or outdated; reconfiguring");
                let size = self.size;
                self.resize(gpu, size)
            }
            SurfaceErrorAction::Retry => {
                log::debug!("surface acquisition timed out; skipping frame");
                Ok(())
            }
            SurfaceErrorAction::OutOfMemory => Err(anyhow!("Surface out of memory")),
            SurfaceErrorAction::Unknown => Err(anyhow!("Surface reported an unknown error")),
        }
    }

    #[cfg(test)]
    pub(crate) fn inject_surface_error_for_test(&mut self, error: wgpu::SurfaceError) {
        self.surface_error_injector = Some(error);
    }
}

fn create_headless_images(device: &wgpu::Device, size: PhysicalSize<u32>, count: u32) -> Vec<wgpu::Texture> {
    (0..count)
        .map(|i| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(&format!("Headless Swap Image {i}")),
                size: wgpu::Extent3d { width: size.width, height: size.height, depth_or_array_layers: 1 },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: HEADLESS_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            })
        })
        .collect()
}

fn choose_surface_format(formats: &[wgpu::TextureFormat]) -> Option<wgpu::TextureFormat> {
    formats.iter().copied().find(|f| f.is_srgb()).or_else(|| formats.first().copied())
}

fn select_present_mode(vsync: bool, modes: &[wgpu::PresentMode]) -> wgpu::PresentMode {
    if vsync {
        wgpu::PresentMode::Fifo
    } else {
        modes.iter().copied().find(|mode| *mode != wgpu::PresentMode::Fifo).unwrap_or(wgpu::PresentMode::Fifo)
    }
}

pub fn surface_error_action(error: &wgpu::SurfaceError) -> SurfaceErrorAction {
    match error {
        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => SurfaceErrorAction::Reconfigure,
        wgpu::SurfaceError::Timeout => SurfaceErrorAction::Retry,
        wgpu::SurfaceError::OutOfMemory => SurfaceErrorAction::OutOfMemory,
        wgpu::SurfaceError::Other => SurfaceErrorAction::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::test_support::headless_gpu;

    #[test]
    fn present_mode_respects_vsync_flag() {
        let modes = vec![wgpu::PresentMode::Immediate, wgpu::PresentMode::Fifo];
        assert_eq!(select_present_mode(false, &modes), wgpu::PresentMode::Immediate);
        assert_eq!(select_present_mode(true, &modes), wgpu::PresentMode::Fifo);
        assert_eq!(select_present_mode(false, &[wgpu::PresentMode::Fifo]), wgpu::PresentMode::Fifo);
    }

    #[test]
    fn prefers_srgb_formats() {
        let formats = [wgpu::TextureFormat::Bgra8Unorm, wgpu::TextureFormat::Rgba8UnormSrgb];
        assert_eq!(choose_surface_format(&formats), Some(wgpu::TextureFormat::Rgba8UnormSrgb));
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn surface_error_action_matches_variants() {
        assert_eq!(surface_error_action(&wgpu::SurfaceError::Lost), SurfaceErrorAction::Reconfigure);
        assert_eq!(surface_error_action(&wgpu::SurfaceError::Outdated), SurfaceErrorAction::Reconfigure);
        assert_eq!(surface_error_action(&wgpu::SurfaceError::Timeout), SurfaceErrorAction::Retry);
        assert_eq!(surface_error_action(&wgpu::SurfaceError::OutOfMemory), SurfaceErrorAction::OutOfMemory);
        assert_eq!(surface_error_action(&wgpu::SurfaceError::Other), SurfaceErrorAction::Unknown);
    }

    #[test]
    fn headless_ring_advances_and_recovers_from_loss() {
        let Some(gpu) = headless_gpu() else { return };
        let mut surface = SwapSurface::create_headless(&gpu, PhysicalSize::new(64, 32), 2).expect("surface");
        assert!(surface.is_headless());
        let image = surface.acquire(&gpu).expect("acquire").expect("image");
        assert_eq!(image.index(), 0);
        image.present();
        surface.update_frame_index();
        assert_eq!(surface.current_index(), 1);
        surface.update_frame_index();
        assert_eq!(surface.current_index(), 0);

        surface.update_frame_index();
        surface.inject_surface_error_for_test(wgpu::SurfaceError::Lost);
        assert!(surface.acquire(&gpu).expect("loss is recoverable").is_none());
        assert_eq!(surface.current_index(), 0, "reconfigure restarts the ring");

        surface.inject_surface_error_for_test(wgpu::SurfaceError::OutOfMemory);
        assert!(surface.acquire(&gpu).is_err());
    }

    #[test]
    fn zero_sized_surfaces_are_rejected() {
        let Some(gpu) = headless_gpu() else { return };
        assert!(SwapSurface::create_headless(&gpu, PhysicalSize::new(0, 10), 2).is_err());
        let mut surface = SwapSurface::create_headless(&gpu, PhysicalSize::new(8, 8), 2).expect("surface");
        assert!(surface.resize(&gpu, PhysicalSize::new(8, 0)).is_err());
        assert_eq!(surface.size(), PhysicalSize::new(8, 8));
    }
}
