use anyhow::{Context, Result};
use glam::{Mat4, Vec3};
use std::num::NonZeroU64;
use std::path::Path;
use std::sync::Arc;
use winit::dpi::PhysicalSize;

use crate::assets::ResourceCache;
use crate::camera3d::Camera3D;
use crate::config::{AppConfig, ShadowConfig};
use crate::mesh::MeshData;
use crate::mesh_asset::MeshAsset;
use crate::renderer::barriers::Transition;
use crate::renderer::constant_ring::{slice_index, ConstantRing, SliceAddress};
use crate::renderer::depth_target::DepthTarget;
use crate::renderer::device::GpuDevice;
use crate::renderer::pipeline::{BindingLayouts, PipelineSet, ShadowBias};
use crate::renderer::shadow_pass::{light_view_projection, ShadowTarget};
use crate::renderer::window_surface::SwapSurface;
use crate::renderer::{FrameConstants, FrameStats, Renderer, SceneConstants};
use crate::transform::Transform;

const MIN_SHININESS: f32 = 16.0;
const MAX_SHININESS: f32 = 256.0;

/// A placed instance of a shared mesh asset. Geometry is shared; placement is not.
#[derive(Clone)]
pub struct Mesh {
    asset: Arc<MeshAsset>,
    transform: Transform,
    shininess: Option<f32>,
    casts_shadows: bool,
}

impl Mesh {
    pub fn from_asset(asset: Arc<MeshAsset>) -> Self {
        Self { asset, transform: Transform::default(), shininess: None, casts_shadows: true }
    }

    pub fn from_obj(cache: &ResourceCache, gpu: &GpuDevice, path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_asset(cache.get_mesh_from_obj(gpu, path)?))
    }

    /// Uploads `data` as a private asset; it is not shared through the cache.
    pub fn from_data(gpu: &GpuDevice, cache: &ResourceCache, data: &MeshData, label: &str) -> Result<Self> {
        Ok(Self::from_asset(cache.mesh_from_data(gpu, data, label)?))
    }

    pub fn asset(&self) -> &Arc<MeshAsset> {
        &self.asset
    }

    pub fn index_count(&self) -> u32 {
        self.asset.index_count()
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn transform_mut(&mut self) -> &mut Transform {
        &mut self.transform
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.transform.set_position(position);
    }

    pub fn add_position(&mut self, delta: Vec3) {
        self.transform.add_position(delta);
    }

    pub fn set_rotation(&mut self, yaw: f32, pitch: f32, roll: f32) {
        self.transform.set_rotation(yaw, pitch, roll);
    }

    pub fn add_rotation(&mut self, yaw: f32, pitch: f32, roll: f32) {
        self.transform.add_rotation(yaw, pitch, roll);
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.transform.set_scale(scale);
    }

    pub fn set_uniform_scale(&mut self, scale: f32) {
        self.transform.set_uniform_scale(scale);
    }

    /// Overrides the specular exponent of every submesh for this instance only.
    /// Values outside 16..=256 are accepted but logged.
    pub fn set_shininess(&mut self, shininess: f32) {
        if !(MIN_SHININESS..=MAX_SHININESS).contains(&shininess) {
            log::warn!(
                "shininess {shininess} for '{}' is outside the usual {MIN_SHININESS}..={MAX_SHININESS} range",
                self.asset.label()
            );
        }
        self.shininess = Some(shininess);
    }

    pub fn shininess(&self) -> Option<f32> {
        self.shininess
    }

    pub fn set_casts_shadows(&mut self, casts: bool) {
        self.casts_shadows = casts;
    }

    pub fn casts_shadows(&self) -> bool {
        self.casts_shadows
    }
}

/// The single shadow-casting light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    /// Direction the light travels.
    pub direction: Vec3,
    /// Center of the region covered by the shadow map.
    pub focus: Vec3,
    pub extent: f32,
    pub distance: f32,
}

impl DirectionalLight {
    pub fn from_config(config: &ShadowConfig) -> Self {
        Self {
            direction: Vec3::new(-0.4, -1.0, -0.3).normalize(),
            focus: Vec3::ZERO,
            extent: config.extent,
            distance: config.distance,
        }
    }

    pub fn view_projection(&self) -> Mat4 {
        light_view_projection(self.direction, self.focus, self.extent, self.distance)
    }
}

struct DrawItem {
    asset: Arc<MeshAsset>,
    model: Mat4,
    shininess: Option<f32>,
    casts_shadows: bool,
}

/// Meshes submitted for the current frame, in submission order.
pub struct DrawList {
    items: Vec<DrawItem>,
    capacity: usize,
    overflow_warned: bool,
}

impl DrawList {
    pub fn new(capacity: usize) -> Self {
        Self { items: Vec::new(), capacity, overflow_warned: false }
    }

    /// Snapshots `mesh` (asset and current matrix). Returns false once full.
    pub fn push(&mut self, mesh: &Mesh) -> bool {
        if self.items.len() >= self.capacity {
            if !self.overflow_warned {
                log::warn!("draw list full ({} items); further draws this frame are dropped", self.capacity);
                self.overflow_warned = true;
            }
            return false;
        }
        self.items.push(DrawItem {
            asset: mesh.asset.clone(),
            model: mesh.transform.matrix(),
            shininess: mesh.shininess,
            casts_shadows: mesh.casts_shadows,
        });
        true
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.overflow_warned = false;
    }
}

struct PlannedDraw {
    item: usize,
    submesh: usize,
    address: SliceAddress,
    view_depth: f32,
}

/// Everything needed to turn a draw list into a presented frame.
pub struct Scene {
    surface: SwapSurface,
    depth: DepthTarget,
    shadow: ShadowTarget,
    layouts: BindingLayouts,
    pipelines: PipelineSet,
    ring: ConstantRing,
    renderer: Renderer,
    cache: ResourceCache,
    camera: Camera3D,
    light: DirectionalLight,
    draw_list: DrawList,
    clear_color: [f64; 4],
    shadow_map_dirty: bool,
    last_stats: FrameStats,
}

impl Scene {
    pub fn new(gpu: &GpuDevice, surface: SwapSurface, config: &AppConfig) -> Result<Self> {
        let payload = NonZeroU64::new(std::mem::size_of::<SceneConstants>() as u64)
            .context("scene constants must not be empty")?;
        let layouts = BindingLayouts::new(gpu.device(), payload);
        let bias = ShadowBias { constant: config.shadow.depth_bias, slope_scale: config.shadow.slope_bias };
        let pipelines = PipelineSet::create(gpu, &layouts, surface.format(), bias)?;
        let frame_slots = config.frame_slots();
        let slices_per_frame = config.frame.max_draws_per_frame.max(1);
        let ring = ConstantRing::new(gpu, &layouts, payload.get(), frame_slots, slices_per_frame)?;
        let depth = DepthTarget::new(gpu, surface.size());
        let shadow = ShadowTarget::new(gpu, &layouts, config.shadow.resolution);
        let cache = ResourceCache::new(gpu, &layouts)?;
        let camera = Camera3D::from_config(&config.camera, surface.aspect_ratio());
        let renderer = Renderer::new(frame_slots, surface.image_count());
        let [r, g, b, a] = config.frame.clear_color;
        log::info!(
            "scene ready: {} frame slots, {} swap images, shadow map {}",
            frame_slots,
            surface.image_count(),
            shadow.resolution()
        );
        Ok(Self {
            surface,
            depth,
            shadow,
            pipelines,
            ring,
            renderer,
            cache,
            camera,
            light: DirectionalLight::from_config(&config.shadow),
            draw_list: DrawList::new(slices_per_frame as usize),
            clear_color: [f64::from(r), f64::from(g), f64::from(b), f64::from(a)],
            // wgpu zero-fills new textures, which would read as fully shadowed.
            shadow_map_dirty: true,
            layouts,
            last_stats: FrameStats::default(),
        })
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    pub fn surface(&self) -> &SwapSurface {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut SwapSurface {
        &mut self.surface
    }

    pub fn depth(&self) -> &DepthTarget {
        &self.depth
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn ring(&self) -> &ConstantRing {
        &self.ring
    }

    pub fn camera(&self) -> &Camera3D {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera3D {
        &mut self.camera
    }

    pub fn camera_position(&self) -> Vec3 {
        self.camera.position
    }

    pub fn set_camera_look_at(&mut self, position: Vec3, target: Vec3) {
        self.camera.look_at(position, target);
    }

    pub fn set_camera_perspective(&mut self, fov_degrees: f32, near: f32, far: f32) {
        let aspect = self.surface.aspect_ratio();
        self.camera.set_perspective(fov_degrees.to_radians(), aspect, near, far);
    }

    pub fn light(&self) -> &DirectionalLight {
        &self.light
    }

    pub fn light_mut(&mut self) -> &mut DirectionalLight {
        &mut self.light
    }

    pub fn set_light_direction(&mut self, direction: Vec3) {
        self.light.direction = direction.normalize_or_zero();
    }

    pub fn set_clear_color(&mut self, color: [f64; 4]) {
        self.clear_color = color;
    }

    pub fn last_stats(&self) -> FrameStats {
        self.last_stats
    }

    pub fn pending_draws(&self) -> usize {
        self.draw_list.len()
    }

    pub fn take_transitions(&mut self) -> Vec<Transition> {
        self.renderer.take_transitions()
    }

    /// Queues `mesh` for the next `display`. Returns false when the draw list is full.
    pub fn draw(&mut self, mesh: &Mesh) -> bool {
        self.draw_list.push(mesh)
    }

    /// Renders and presents the queued draws, then clears the list.
    ///
    /// Shadow casters go through the shadow pass first, then opaque submeshes, then
    /// translucent submeshes sorted back to front. A failure part way through abandons
    /// the frame so the next `display` starts from idle.
    pub fn display(&mut self, gpu: &mut GpuDevice) -> Result<FrameStats> {
        if !self.renderer.begin_frame(gpu, &mut self.surface)? {
            self.draw_list.clear();
            return Ok(FrameStats::default());
        }
        let result = self.record_frame(gpu);
        if result.is_err() {
            self.renderer.abort_frame();
            self.shadow_map_dirty = true;
        }
        self.draw_list.clear();
        result
    }

    fn record_frame(&mut self, gpu: &mut GpuDevice) -> Result<FrameStats> {
        let planned = self.upload_constants(gpu)?;
        let has_casters = self.draw_list.items.iter().any(|item| item.casts_shadows);

        if has_casters || self.shadow_map_dirty {
            let mut scope = self.renderer.begin_shadow_pass(&self.shadow, &self.pipelines.shadow)?;
            let mut last_item = None;
            for draw in planned.iter() {
                let item = &self.draw_list.items[draw.item];
                if !item.casts_shadows || last_item == Some(draw.item) {
                    continue;
                }
                last_item = Some(draw.item);
                self.renderer.draw_mesh_shadow(&mut scope, &item.asset, &self.ring, draw.address)?;
            }
            self.renderer.end_shadow_pass(scope)?;
            self.shadow_map_dirty = has_casters;
        }

        let (mut translucent, opaque): (Vec<&PlannedDraw>, Vec<&PlannedDraw>) = planned
            .iter()
            .partition(|draw| self.draw_list.items[draw.item].asset.submeshes()[draw.submesh].translucent);

        let mut scope =
            self.renderer.begin_main_pass(&self.depth, &self.shadow, &self.pipelines.opaque, self.clear_color)?;
        for draw in opaque {
            let asset = &self.draw_list.items[draw.item].asset;
            let submesh = &asset.submeshes()[draw.submesh];
            self.renderer.draw_mesh_range(
                &mut scope,
                asset,
                submesh.indices.clone(),
                submesh.bind_group(),
                &self.ring,
                draw.address,
            )?;
        }
        if !translucent.is_empty() {
            translucent.sort_by(|a, b| b.view_depth.total_cmp(&a.view_depth));
            self.renderer.set_pipeline(&mut scope, &self.pipelines.alpha)?;
            for draw in translucent {
                let asset = &self.draw_list.items[draw.item].asset;
                let submesh = &asset.submeshes()[draw.submesh];
                self.renderer.draw_mesh_range(
                    &mut scope,
                    asset,
                    submesh.indices.clone(),
                    submesh.bind_group(),
                    &self.ring,
                    draw.address,
                )?;
            }
        }
        self.renderer.end_main_pass(scope)?;

        let stats = self.renderer.end_frame(gpu, &mut self.surface)?;
        self.last_stats = stats;
        Ok(stats)
    }

    // One slice per (item, submesh) in this frame slot's band of the ring.
    fn upload_constants(&mut self, gpu: &GpuDevice) -> Result<Vec<PlannedDraw>> {
        let frame = FrameConstants {
            view_proj: self.camera.view_projection(),
            camera_pos: self.camera.position,
            light_view_proj: self.light.view_projection(),
            light_dir: self.light.direction,
        };
        let view = self.camera.view_matrix();
        let frame_slot = self.renderer.frame_slot();
        let per_frame = self.ring.slices_per_frame();
        let mut planned = Vec::new();
        let mut object_slot = 0u32;
        'items: for (item_index, item) in self.draw_list.items.iter().enumerate() {
            let center = item.model.transform_point3(item.asset.bounds().center);
            let view_depth = -view.transform_point3(center).z;
            for (submesh_index, submesh) in item.asset.submeshes().iter().enumerate() {
                if object_slot >= per_frame {
                    log::warn!("constant ring exhausted at {per_frame} slices; remaining submeshes skipped");
                    break 'items;
                }
                let mut scalars = submesh.scalars;
                if let Some(shininess) = item.shininess {
                    scalars.shininess = shininess;
                }
                let constants = SceneConstants::new(item.model, &frame, &scalars);
                let index = slice_index(frame_slot, per_frame, object_slot);
                let address = self.ring.upload_slice(gpu.queue(), index, &constants)?;
                planned.push(PlannedDraw { item: item_index, submesh: submesh_index, address, view_depth });
                object_slot += 1;
            }
        }
        Ok(planned)
    }

    /// Drains the GPU, rebuilds size-dependent targets and updates the camera aspect.
    /// A zero-sized request (minimised window) is ignored.
    pub fn resize(&mut self, gpu: &mut GpuDevice, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            log::debug!("ignoring resize to {width}x{height}");
            return Ok(());
        }
        let size = PhysicalSize::new(width, height);
        gpu.wait_gpu()?;
        self.surface.resize(gpu, size)?;
        self.depth.resize(gpu, size);
        self.renderer.on_resize(&self.surface)?;
        self.camera.set_aspect(self.surface.aspect_ratio());
        Ok(())
    }

    pub fn set_vsync(&mut self, gpu: &GpuDevice, enabled: bool) {
        self.surface.set_vsync(gpu, enabled);
    }

    pub fn shadow_resolution(&self) -> u32 {
        self.shadow.resolution()
    }

    /// Rebuilds the shadow map at `resolution` (clamped to 256..=8192). The new map is
    /// cleared by the next frame's shadow pass even if nothing casts.
    pub fn set_shadow_resolution(&mut self, gpu: &mut GpuDevice, resolution: u32) -> Result<()> {
        gpu.wait_gpu()?;
        self.shadow.resize(gpu, &self.layouts, resolution);
        self.shadow_map_dirty = true;
        log::info!("shadow map resized to {}", self.shadow.resolution());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::test_support::headless_gpu;

    fn headless_scene(gpu: &GpuDevice, max_draws: u32) -> Scene {
        let mut config = AppConfig::default();
        config.frame.max_draws_per_frame = max_draws;
        config.shadow.resolution = 256;
        let surface = SwapSurface::create_headless(gpu, PhysicalSize::new(64, 48), 2).unwrap();
        Scene::new(gpu, surface, &config).unwrap()
    }

    #[test]
    fn draw_list_is_bounded() {
        let Some(gpu) = headless_gpu() else { return };
        let mut scene = headless_scene(&gpu, 2);
        let cube = Mesh::from_data(&gpu, scene.cache(), &MeshData::cube(1.0), "cube").unwrap();
        assert!(scene.draw(&cube));
        assert!(scene.draw(&cube));
        assert!(!scene.draw(&cube));
        assert_eq!(scene.pending_draws(), 2);
    }

    #[test]
    fn display_renders_and_clears_the_list() {
        let Some(mut gpu) = headless_gpu() else { return };
        let mut scene = headless_scene(&gpu, 16);
        let cube = Mesh::from_data(&gpu, scene.cache(), &MeshData::cube(1.0), "cube").unwrap();
        let mut glass = Mesh::from_data(
            &gpu,
            scene.cache(),
            &MeshData::sphere(1.0, 12, 8).with_material(crate::mesh::MaterialDesc {
                opacity: 0.5,
                ..Default::default()
            }),
            "glass",
        )
        .unwrap();
        glass.set_position(Vec3::new(2.0, 0.0, 0.0));
        scene.draw(&cube);
        scene.draw(&glass);
        let stats = scene.display(&mut gpu).unwrap();
        assert_eq!(stats.draw_calls, 2);
        assert_eq!(stats.shadow_draws, 2);
        assert_eq!(stats.triangles, 12 + glass.index_count() / 3);
        assert_eq!(scene.pending_draws(), 0);

        // The map still holds last frame's casters, so an empty frame clears it once.
        // The log only holds the latest frame.
        let stats = scene.display(&mut gpu).unwrap();
        assert_eq!(stats, FrameStats::default());
        assert_eq!(scene.take_transitions().len(), 4);
    }

    #[test]
    fn resize_updates_targets_and_aspect() {
        let Some(mut gpu) = headless_gpu() else { return };
        let mut scene = headless_scene(&gpu, 4);
        scene.resize(&mut gpu, 200, 100).unwrap();
        assert_eq!(scene.surface().size(), PhysicalSize::new(200, 100));
        assert_eq!(scene.depth().size(), PhysicalSize::new(200, 100));
        assert!((scene.camera().aspect - 2.0).abs() < 1e-6);
        scene.resize(&mut gpu, 0, 100).unwrap();
        assert_eq!(scene.surface().size(), PhysicalSize::new(200, 100));
    }
}
