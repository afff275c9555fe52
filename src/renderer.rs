pub mod barriers;
pub mod command_recorder;
pub mod constant_ring;
pub mod depth_target;
pub mod device;
pub mod mesh_pass;
pub mod pipeline;
pub mod shadow_pass;
pub mod window_surface;

use anyhow::{bail, Context, Result};
use std::ops::Range;

use crate::mesh_asset::MeshAsset;
use barriers::{BarrierTracker, ResourceId, ResourceState, Transition};
use command_recorder::CommandRecorder;
use constant_ring::{ConstantRing, SliceAddress};
use depth_target::{DepthTarget, DEPTH_CLEAR};
use device::GpuDevice;
use pipeline::{PipelineKind, PipelineState, MATERIAL_GROUP, SCENE_GROUP, SHADOW_GROUP};
use shadow_pass::{ShadowPassScope, ShadowTarget};
use window_surface::{SurfaceImage, SwapSurface};

pub use mesh_pass::{FrameConstants, MainPassScope, MaterialScalars, SceneConstants};

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn full(width: u32, height: u32) -> Self {
        Self { x: 0.0, y: 0.0, width: width as f32, height: height as f32, min_depth: 0.0, max_depth: 1.0 }
    }

    fn apply(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_viewport(self.x, self.y, self.width, self.height, self.min_depth, self.max_depth);
    }
}

/// Where the frame loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    Idle,
    RecordingShadow,
    RecordingMain,
    Submitted,
    Presented,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub draw_calls: u32,
    pub triangles: u32,
    pub shadow_draws: u32,
}

/// Drives one frame at a time through
/// `Idle -> RecordingShadow -> RecordingMain -> Submitted -> Presented -> Idle`.
///
/// Every call checks the phase first and fails without side effects when it is called
/// out of order. Resource state changes go through the barrier tracker so the sequence
/// can be inspected after the fact.
pub struct Renderer {
    recorder: CommandRecorder,
    barriers: BarrierTracker,
    phase: FramePhase,
    frame_slot: usize,
    image: Option<SurfaceImage>,
    main_pass_done: bool,
    pass_open: bool,
    stats: FrameStats,
    last_fence: u64,
    swap_image_count: u32,
}

impl Renderer {
    pub fn new(frame_slots: usize, swap_image_count: u32) -> Self {
        let mut renderer = Self {
            recorder: CommandRecorder::new(frame_slots),
            barriers: BarrierTracker::new(),
            phase: FramePhase::Idle,
            frame_slot: 0,
            image: None,
            main_pass_done: false,
            pass_open: false,
            stats: FrameStats::default(),
            last_fence: 0,
            swap_image_count: 0,
        };
        renderer.register_swap_images(swap_image_count);
        renderer.barriers.register(ResourceId::Depth, ResourceState::DepthWrite);
        renderer.barriers.register(ResourceId::ShadowMap, ResourceState::ShaderRead);
        renderer
    }

    fn register_swap_images(&mut self, count: u32) {
        for index in 0..self.swap_image_count {
            self.barriers.forget(ResourceId::SwapImage(index));
        }
        for index in 0..count {
            self.barriers.register(ResourceId::SwapImage(index), ResourceState::Present);
        }
        self.swap_image_count = count;
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    pub fn frame_slot(&self) -> usize {
        self.frame_slot
    }

    pub fn frame_slot_count(&self) -> usize {
        self.recorder.slot_count()
    }

    pub fn barriers(&self) -> &BarrierTracker {
        &self.barriers
    }

    /// Drains the transitions of the current (or most recent) frame. The log is reset
    /// at every `begin_frame`.
    pub fn take_transitions(&mut self) -> Vec<Transition> {
        self.barriers.take_log()
    }

    /// Fence value that retired the most recent frame.
    pub fn last_frame_fence(&self) -> u64 {
        self.last_fence
    }

    pub fn recorded_frames(&self) -> u64 {
        self.recorder.recorded_frames()
    }

    fn expect_phase(&self, expected: FramePhase, op: &str) -> Result<()> {
        if self.phase != expected {
            bail!("{op} called in {:?}, expected {expected:?}", self.phase);
        }
        Ok(())
    }

    /// Acquires the current swap image, opens recording for this frame slot and moves
    /// the image to render-target state. Returns `false` when the surface asked to skip
    /// the frame; the renderer stays idle in that case.
    pub fn begin_frame(&mut self, gpu: &GpuDevice, surface: &mut SwapSurface) -> Result<bool> {
        self.expect_phase(FramePhase::Idle, "begin_frame")?;
        self.barriers.clear_log();
        if surface.image_count() != self.swap_image_count {
            self.register_swap_images(surface.image_count());
        }
        let Some(image) = surface.acquire(gpu)? else {
            return Ok(false);
        };
        self.recorder.begin(gpu, self.frame_slot)?;
        let swap = ResourceId::SwapImage(image.index());
        if let Err(err) = self.barriers.transition(swap, ResourceState::Present, ResourceState::RenderTarget) {
            // Drop the scope so the next frame can claim the slot.
            self.recorder.abort();
            return Err(err);
        }
        self.image = Some(image);
        self.main_pass_done = false;
        self.pass_open = false;
        self.stats = FrameStats::default();
        self.phase = FramePhase::RecordingMain;
        Ok(true)
    }

    /// Moves the shadow map to depth-write, clears it and binds the shadow pipeline.
    /// Only valid before the main pass.
    pub fn begin_shadow_pass(&mut self, shadow: &ShadowTarget, pipeline: &PipelineState) -> Result<ShadowPassScope> {
        self.expect_phase(FramePhase::RecordingMain, "begin_shadow_pass")?;
        if self.pass_open || self.main_pass_done {
            bail!("shadow pass must precede the main pass");
        }
        if pipeline.kind() != PipelineKind::Shadow {
            bail!("shadow pass needs the shadow pipeline, got {:?}", pipeline.kind());
        }
        self.barriers.transition(ResourceId::ShadowMap, ResourceState::ShaderRead, ResourceState::DepthWrite)?;
        let encoder = self.recorder.encoder_mut()?;
        let mut pass = encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Shadow Pass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: shadow.depth_view(),
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(DEPTH_CLEAR),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            })
            .forget_lifetime();
        pass.set_pipeline(pipeline.raw());
        shadow.viewport().apply(&mut pass);
        let (x, y, w, h) = shadow.scissor();
        pass.set_scissor_rect(x, y, w, h);
        self.pass_open = true;
        self.phase = FramePhase::RecordingShadow;
        Ok(ShadowPassScope { pass })
    }

    /// Draws `mesh` into the shadow map with the light matrix held in slice `address`.
    pub fn draw_mesh_shadow(
        &mut self,
        scope: &mut ShadowPassScope,
        mesh: &MeshAsset,
        constants: &ConstantRing,
        address: SliceAddress,
    ) -> Result<()> {
        self.expect_phase(FramePhase::RecordingShadow, "draw_mesh_shadow")?;
        let pass = &mut scope.pass;
        pass.set_bind_group(SCENE_GROUP, constants.bind_group(), &[address.offset]);
        pass.set_vertex_buffer(0, mesh.vertex_buffer().slice(..));
        pass.set_index_buffer(mesh.index_buffer().slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..mesh.index_count(), 0, 0..1);
        self.stats.shadow_draws += 1;
        Ok(())
    }

    /// Closes the shadow pass and returns the map to shader-read.
    pub fn end_shadow_pass(&mut self, scope: ShadowPassScope) -> Result<()> {
        self.expect_phase(FramePhase::RecordingShadow, "end_shadow_pass")?;
        drop(scope);
        self.barriers.transition(ResourceId::ShadowMap, ResourceState::DepthWrite, ResourceState::ShaderRead)?;
        self.pass_open = false;
        self.phase = FramePhase::RecordingMain;
        Ok(())
    }

    /// Binds the acquired image and `depth`, clears both, sets viewport and scissor to the
    /// full target and binds `pipeline` plus the shadow map for sampling.
    pub fn begin_main_pass(
        &mut self,
        depth: &DepthTarget,
        shadow: &ShadowTarget,
        pipeline: &PipelineState,
        clear_color: [f64; 4],
    ) -> Result<MainPassScope> {
        self.expect_phase(FramePhase::RecordingMain, "begin_main_pass")?;
        if self.pass_open || self.main_pass_done {
            bail!("main pass already recorded this frame");
        }
        if pipeline.kind() == PipelineKind::Shadow {
            bail!("main pass cannot bind the shadow pipeline");
        }
        let view = self.image.as_ref().context("no swap image acquired")?.view();
        let size = depth.size();
        let encoder = self.recorder.encoder_mut()?;
        let mut pass = encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Main Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: clear_color[0],
                            g: clear_color[1],
                            b: clear_color[2],
                            a: clear_color[3],
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth.view(),
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(DEPTH_CLEAR),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            })
            .forget_lifetime();
        Viewport::full(size.width, size.height).apply(&mut pass);
        pass.set_scissor_rect(0, 0, size.width, size.height);
        pass.set_pipeline(pipeline.raw());
        pass.set_bind_group(SHADOW_GROUP, shadow.bind_group(), &[]);
        self.pass_open = true;
        Ok(MainPassScope { pass, pipeline: pipeline.kind() })
    }

    /// Switches pipelines inside the main pass.
    pub fn set_pipeline(&mut self, scope: &mut MainPassScope, pipeline: &PipelineState) -> Result<()> {
        self.expect_phase(FramePhase::RecordingMain, "set_pipeline")?;
        if pipeline.kind() == PipelineKind::Shadow {
            bail!("main pass cannot bind the shadow pipeline");
        }
        if scope.pipeline != pipeline.kind() {
            scope.pass.set_pipeline(pipeline.raw());
            scope.pipeline = pipeline.kind();
        }
        Ok(())
    }

    /// Draws every index of `mesh` with `material` bound.
    pub fn draw_mesh(
        &mut self,
        scope: &mut MainPassScope,
        mesh: &MeshAsset,
        material: &wgpu::BindGroup,
        constants: &ConstantRing,
        address: SliceAddress,
    ) -> Result<()> {
        self.draw_mesh_range(scope, mesh, 0..mesh.index_count(), material, constants, address)
    }

    /// Draws the index sub-range `indices` of `mesh`, one submesh.
    pub fn draw_mesh_range(
        &mut self,
        scope: &mut MainPassScope,
        mesh: &MeshAsset,
        indices: Range<u32>,
        material: &wgpu::BindGroup,
        constants: &ConstantRing,
        address: SliceAddress,
    ) -> Result<()> {
        self.expect_phase(FramePhase::RecordingMain, "draw_mesh")?;
        validate_index_range(&indices, mesh.index_count())?;
        let pass = &mut scope.pass;
        pass.set_bind_group(SCENE_GROUP, constants.bind_group(), &[address.offset]);
        pass.set_bind_group(MATERIAL_GROUP, material, &[]);
        pass.set_vertex_buffer(0, mesh.vertex_buffer().slice(..));
        pass.set_index_buffer(mesh.index_buffer().slice(..), wgpu::IndexFormat::Uint32);
        let count = indices.end - indices.start;
        pass.draw_indexed(indices, 0, 0..1);
        self.stats.draw_calls += 1;
        self.stats.triangles += count / 3;
        Ok(())
    }

    pub fn end_main_pass(&mut self, scope: MainPassScope) -> Result<()> {
        self.expect_phase(FramePhase::RecordingMain, "end_main_pass")?;
        drop(scope);
        self.pass_open = false;
        self.main_pass_done = true;
        Ok(())
    }

    /// Returns the image to present state, submits, presents and waits for the GPU to
    /// drain before advancing the swap index.
    pub fn end_frame(&mut self, gpu: &mut GpuDevice, surface: &mut SwapSurface) -> Result<FrameStats> {
        self.expect_phase(FramePhase::RecordingMain, "end_frame")?;
        if self.pass_open {
            bail!("end_frame called with a render pass still open");
        }
        let image = self.image.take().context("no swap image acquired")?;
        self.barriers.transition(
            ResourceId::SwapImage(image.index()),
            ResourceState::RenderTarget,
            ResourceState::Present,
        )?;
        let (slot, commands) = self.recorder.end()?;
        let fence_value = gpu.submit(commands);
        self.recorder.retire(slot, fence_value)?;
        self.phase = FramePhase::Submitted;

        image.present();
        self.phase = FramePhase::Presented;

        // Full drain every frame; the per-slot retire values are tracked but not relied on.
        self.last_fence = gpu.wait_gpu()?;
        surface.update_frame_index();
        self.frame_slot = (slot + 1) % self.recorder.slot_count();
        self.phase = FramePhase::Idle;
        Ok(std::mem::take(&mut self.stats))
    }

    /// Abandons the frame in progress from any phase: the open encoder and acquired image
    /// are dropped unsubmitted and every tracked resource returns to its resting state.
    pub fn abort_frame(&mut self) {
        if self.phase == FramePhase::Idle && !self.recorder.is_recording() {
            return;
        }
        log::warn!("abandoning frame in {:?}", self.phase);
        self.recorder.abort();
        self.image = None;
        self.register_swap_images(self.swap_image_count);
        self.barriers.register(ResourceId::ShadowMap, ResourceState::ShaderRead);
        self.barriers.register(ResourceId::Depth, ResourceState::DepthWrite);
        self.main_pass_done = false;
        self.pass_open = false;
        self.stats = FrameStats::default();
        self.phase = FramePhase::Idle;
    }

    /// Re-registers swap images after the surface has been rebuilt. Only valid when idle.
    pub fn on_resize(&mut self, surface: &SwapSurface) -> Result<()> {
        self.expect_phase(FramePhase::Idle, "on_resize")?;
        self.register_swap_images(surface.image_count());
        Ok(())
    }
}

fn validate_index_range(indices: &Range<u32>, index_count: u32) -> Result<()> {
    if indices.start > indices.end || indices.end > index_count {
        bail!("index range {}..{} outside mesh with {index_count} indices", indices.start, indices.end);
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::device::GpuDevice;

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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_renderer_tracks_resting_states() {
        let renderer = Renderer::new(2, 3);
        assert_eq!(renderer.phase(), FramePhase::Idle);
        assert_eq!(renderer.frame_slot_count(), 2);
        for i in 0..3 {
            assert_eq!(renderer.barriers().state(ResourceId::SwapImage(i)), Some(ResourceState::Present));
        }
        assert_eq!(renderer.barriers().state(ResourceId::ShadowMap), Some(ResourceState::ShaderRead));
        assert_eq!(renderer.barriers().state(ResourceId::Depth), Some(ResourceState::DepthWrite));
    }

    #[test]
    fn index_ranges_are_bounded_by_mesh() {
        assert!(validate_index_range(&(0..36), 36).is_ok());
        assert!(validate_index_range(&(30..36), 36).is_ok());
        assert!(validate_index_range(&(30..37), 36).is_err());
        #[allow(clippy::reversed_empty_ranges)]
        let reversed = 6..3;
        assert!(validate_index_range(&reversed, 36).is_err());
    }

    #[test]
    fn resize_reregisters_swap_images() {
        let Some(gpu) = test_support::headless_gpu() else { return };
        let mut renderer = Renderer::new(2, 2);
        let surface = SwapSurface::create_headless(&gpu, winit::dpi::PhysicalSize::new(16, 16), 3).expect("surface");
        renderer.on_resize(&surface).expect("idle resize");
        assert_eq!(renderer.barriers().state(ResourceId::SwapImage(2)), Some(ResourceState::Present));
    }

    #[test]
    fn wrong_phase_calls_fail_without_side_effects() {
        let Some(mut gpu) = test_support::headless_gpu() else { return };
        let mut renderer = Renderer::new(2, 2);
        let mut surface =
            SwapSurface::create_headless(&gpu, winit::dpi::PhysicalSize::new(16, 16), 2).expect("surface");
        assert!(renderer.end_frame(&mut gpu, &mut surface).is_err());
        assert_eq!(renderer.phase(), FramePhase::Idle);

        assert!(renderer.begin_frame(&gpu, &mut surface).expect("begin"));
        assert!(renderer.begin_frame(&gpu, &mut surface).is_err());
        assert!(renderer.on_resize(&surface).is_err());
        assert_eq!(renderer.phase(), FramePhase::RecordingMain);

        let stats = renderer.end_frame(&mut gpu, &mut surface).expect("end");
        assert_eq!(stats, FrameStats::default());
        assert_eq!(renderer.phase(), FramePhase::Idle);
        assert_eq!(renderer.frame_slot(), 1);
        assert_eq!(surface.current_index(), 1);

        let log = renderer.take_transitions();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].after, ResourceState::RenderTarget);
        assert_eq!(log[1].after, ResourceState::Present);
    }

    #[test]
    fn transition_log_only_holds_the_latest_frame() {
        let Some(mut gpu) = test_support::headless_gpu() else { return };
        let mut renderer = Renderer::new(2, 2);
        let mut surface =
            SwapSurface::create_headless(&gpu, winit::dpi::PhysicalSize::new(16, 16), 2).expect("surface");
        for _ in 0..50 {
            assert!(renderer.begin_frame(&gpu, &mut surface).expect("begin"));
            renderer.end_frame(&mut gpu, &mut surface).expect("end");
        }
        assert_eq!(renderer.barriers().log().len(), 2);
    }

    #[test]
    fn aborted_frame_returns_to_idle_and_recovers() {
        let Some(mut gpu) = test_support::headless_gpu() else { return };
        let mut renderer = Renderer::new(2, 2);
        let mut surface =
            SwapSurface::create_headless(&gpu, winit::dpi::PhysicalSize::new(16, 16), 2).expect("surface");
        let image = surface.current_index();
        assert!(renderer.begin_frame(&gpu, &mut surface).expect("begin"));
        assert_eq!(renderer.barriers().state(ResourceId::SwapImage(image)), Some(ResourceState::RenderTarget));

        renderer.abort_frame();
        assert_eq!(renderer.phase(), FramePhase::Idle);
        assert_eq!(renderer.barriers().state(ResourceId::SwapImage(image)), Some(ResourceState::Present));
        assert_eq!(renderer.frame_slot(), 0);

        assert!(renderer.begin_frame(&gpu, &mut surface).expect("begin after abort"));
        renderer.end_frame(&mut gpu, &mut surface).expect("end after abort");
        assert_eq!(renderer.recorded_frames(), 1);
        assert_eq!(renderer.phase(), FramePhase::Idle);
    }
}
