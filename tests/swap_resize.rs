mod common;

use harrier::mesh::MeshData;
use harrier::renderer::window_surface::{surface_error_action, SurfaceErrorAction, SwapSurface};
use harrier::scene::Mesh;
use winit::dpi::PhysicalSize;

#[test]
fn resize_rebuilds_targets_and_keeps_rendering() {
    let Some(mut gpu) = common::headless_gpu() else { return };
    let mut scene = common::headless_scene(&gpu, 64, 64);
    let cube = Mesh::from_data(&gpu, scene.cache(), &MeshData::cube(1.0), "cube").expect("cube");
    scene.draw(&cube);
    scene.display(&mut gpu).expect("first frame");

    scene.resize(&mut gpu, 160, 90).expect("resize");
    assert_eq!(scene.surface().size(), PhysicalSize::new(160, 90));
    assert_eq!(scene.depth().size(), PhysicalSize::new(160, 90));
    assert_eq!(scene.surface().current_index(), 0);
    assert!((scene.camera().aspect - 160.0 / 90.0).abs() < 1e-5);

    scene.draw(&cube);
    let stats = scene.display(&mut gpu).expect("frame after resize");
    assert_eq!(stats.draw_calls, 1);
}

#[test]
fn shadow_resolution_change_rebuilds_the_map() {
    let Some(mut gpu) = common::headless_gpu() else { return };
    let mut scene = common::headless_scene(&gpu, 64, 64);
    assert_eq!(scene.shadow_resolution(), 256);
    scene.set_shadow_resolution(&mut gpu, 512).expect("shadow resize");
    assert_eq!(scene.shadow_resolution(), 512);

    let cube = Mesh::from_data(&gpu, scene.cache(), &MeshData::cube(1.0), "cube").expect("cube");
    scene.draw(&cube);
    let stats = scene.display(&mut gpu).expect("frame after shadow resize");
    assert_eq!(stats.shadow_draws, 1);
}

#[test]
fn minimised_window_is_ignored() {
    let Some(mut gpu) = common::headless_gpu() else { return };
    let mut scene = common::headless_scene(&gpu, 64, 64);
    scene.resize(&mut gpu, 0, 0).expect("zero size is not an error");
    assert_eq!(scene.surface().size(), PhysicalSize::new(64, 64));
}

#[test]
fn zero_sized_surface_is_rejected() {
    let Some(gpu) = common::headless_gpu() else { return };
    assert!(SwapSurface::create_headless(&gpu, PhysicalSize::new(0, 10), 2).is_err());
    let mut surface = SwapSurface::create_headless(&gpu, PhysicalSize::new(8, 8), 2).expect("surface");
    assert!(surface.resize(&gpu, PhysicalSize::new(8, 0)).is_err());
}

#[test]
fn lost_surfaces_are_recoverable() {
    assert_eq!(surface_error_action(&wgpu::SurfaceError::Lost), SurfaceErrorAction::Reconfigure);
    assert_eq!(surface_error_action(&wgpu::SurfaceError::Outdated), SurfaceErrorAction::Reconfigure);
    assert_eq!(surface_error_action(&wgpu::SurfaceError::Timeout), SurfaceErrorAction::Retry);
    assert_eq!(surface_error_action(&wgpu::SurfaceError::OutOfMemory), SurfaceErrorAction::OutOfMemory);
    assert_eq!(surface_error_action(&wgpu::SurfaceError::Other), SurfaceErrorAction::Unknown);
}
