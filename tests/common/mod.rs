#![allow(dead_code)]

use harrier::config::AppConfig;
use harrier::renderer::device::GpuDevice;
use harrier::renderer::window_surface::SwapSurface;
use harrier::scene::Scene;
use winit::dpi::PhysicalSize;

/// Headless device, or `None` when the machine has no usable adapter.
pub fn headless_gpu() -> Option<GpuDevice> {
    match pollster::block_on(GpuDevice::initialize_headless()) {
        Ok(gpu) => Some(gpu),
        Err(err) => {
            eprintln!("skipping GPU test: {err:#}");
            None
        }
    }
}

pub fn headless_scene(gpu: &GpuDevice, width: u32, height: u32) -> Scene {
    let mut config = AppConfig::default();
    config.shadow.resolution = 256;
    config.frame.max_draws_per_frame = 64;
    let surface = SwapSurface::create_headless(gpu, PhysicalSize::new(width, height), config.frame_slots() as u32)
        .expect("headless surface");
    Scene::new(gpu, surface, &config).expect("scene")
}
