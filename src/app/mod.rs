mod demo_scene;

use anyhow::{Context, Result};
use glam::Vec3;
use std::sync::Arc;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{DeviceEvent, ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};

use crate::camera3d::FlyCamera;
use crate::config::AppConfig;
use crate::input::{Input, InputEvent};
use crate::renderer::device::{DeviceConfig, GpuDevice};
use crate::renderer::window_surface::SwapSurface;
use crate::scene::Scene;
use crate::time::Time;
use demo_scene::DemoObjects;

const INPUT_CONFIG_PATH: &str = "config/input.json";
const STATS_LOG_INTERVAL: f32 = 5.0;

pub async fn run_with_config(config: AppConfig) -> Result<()> {
    let event_loop = EventLoop::new().context("Failed to create winit event loop")?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app).context("Event loop execution failed")?;
    match app.fatal.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Window, device and scene. Created on the first `resumed`.
struct Viewer {
    window: Arc<Window>,
    gpu: GpuDevice,
    scene: Scene,
    objects: DemoObjects,
    fly: FlyCamera,
}

pub struct App {
    config: AppConfig,
    viewer: Option<Viewer>,
    input: Input,
    time: Time,
    stats_timer: f32,
    should_close: bool,
    fatal: Option<anyhow::Error>,
}

impl App {
    fn new(config: AppConfig) -> Self {
        Self {
            config,
            viewer: None,
            input: Input::from_config(INPUT_CONFIG_PATH),
            time: Time::new(),
            stats_timer: 0.0,
            should_close: false,
            fatal: None,
        }
    }

    fn create_viewer(&self, event_loop: &ActiveEventLoop) -> Result<Viewer> {
        let window_cfg = &self.config.window;
        let attributes = Window::default_attributes()
            .with_title(window_cfg.title.clone())
            .with_inner_size(PhysicalSize::new(window_cfg.width, window_cfg.height));
        let window = Arc::new(event_loop.create_window(attributes).context("Failed to create window")?);

        let instance = wgpu::Instance::default();
        let surface = instance.create_surface(window.clone()).context("Failed to create surface")?;
        let gpu = pollster::block_on(GpuDevice::initialize(instance, Some(&surface), &DeviceConfig::default()))?;

        let size = window.inner_size();
        let swap = SwapSurface::create_for_window(
            &gpu,
            surface,
            size,
            window_cfg.vsync,
            self.config.frame_slots() as u32,
        )?;
        let mut scene = Scene::new(&gpu, swap, &self.config)?;
        scene.set_light_direction(Vec3::new(-0.4, -1.0, -0.3));
        let objects = DemoObjects::build(&gpu, &scene, self.config.mesh.as_deref())?;
        log::info!("demo scene holds {} objects", objects.object_count());

        let camera = scene.camera();
        let fly = FlyCamera::looking_at(camera.position, camera.target, &self.config.camera);
        Ok(Viewer { window, gpu, scene, objects, fly })
    }

    fn fail(&mut self, err: anyhow::Error) {
        log::error!("{err:#}");
        self.fatal = Some(err);
        self.should_close = true;
    }

    fn frame(&mut self) -> Result<()> {
        let Some(viewer) = self.viewer.as_mut() else {
            return Ok(());
        };
        self.time.tick();
        let dt = self.time.delta_seconds();

        if self.input.take_vsync_toggle() {
            let enabled = !viewer.scene.surface().vsync_enabled();
            viewer.scene.set_vsync(&viewer.gpu, enabled);
            log::info!("vsync {}", if enabled { "on" } else { "off" });
        }
        viewer.fly.update(dt, &self.input.fly_input());
        viewer.fly.apply_to(viewer.scene.camera_mut());
        self.input.clear_frame();

        viewer.objects.animate(dt);
        viewer.objects.submit(&mut viewer.scene);
        let stats = viewer.scene.display(&mut viewer.gpu)?;

        self.stats_timer += dt;
        if self.stats_timer >= STATS_LOG_INTERVAL {
            self.stats_timer = 0.0;
            log::debug!(
                "frame {}: {} draws, {} triangles, {} shadow draws",
                self.time.frame_count(),
                stats.draw_calls,
                stats.triangles,
                stats.shadow_draws
            );
        }
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.viewer.is_some() {
            return;
        }
        event_loop.set_control_flow(ControlFlow::Poll);
        match self.create_viewer(event_loop) {
            Ok(viewer) => self.viewer = Some(viewer),
            Err(err) => self.fail(err.context("Renderer initialization failed")),
        }
    }

    fn window_event(&mut self, _el: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        if self.viewer.as_ref().is_some_and(|viewer| viewer.window.id() != id) {
            return;
        }
        self.input.push(InputEvent::from_window_event(&event));
        match &event {
            WindowEvent::CloseRequested => self.should_close = true,
            WindowEvent::Resized(size) => {
                if let Some(viewer) = self.viewer.as_mut() {
                    if let Err(err) = viewer.scene.resize(&mut viewer.gpu, size.width, size.height) {
                        self.fail(err.context("Resize failed"));
                    }
                }
            }
            WindowEvent::KeyboardInput { event: KeyEvent { logical_key, state, .. }, .. } => {
                if let Key::Named(NamedKey::Escape) = logical_key {
                    if *state == ElementState::Pressed {
                        self.should_close = true;
                    }
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(err) = self.frame() {
                    self.fail(err.context("Frame failed"));
                }
            }
            _ => {}
        }
    }

    fn device_event(&mut self, _e: &ActiveEventLoop, _dev: winit::event::DeviceId, ev: DeviceEvent) {
        self.input.push(InputEvent::from_device_event(&ev));
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.should_close {
            if let Some(viewer) = self.viewer.as_mut() {
                if let Err(err) = viewer.gpu.wait_gpu() {
                    log::warn!("GPU drain on shutdown failed: {err:#}");
                }
            }
            event_loop.exit();
            return;
        }
        if let Some(viewer) = self.viewer.as_ref() {
            viewer.window.request_redraw();
        }
    }
}
