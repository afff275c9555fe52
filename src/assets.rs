pub mod mtl;
pub mod obj;
pub mod weak_cache;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::mesh::{MaterialDesc, MeshData};
use crate::mesh_asset::{MaterialTextures, MeshAsset};
use crate::renderer::device::GpuDevice;
use crate::renderer::pipeline::BindingLayouts;
use crate::texture::{create_material_sampler, Texture, TextureSpace};
use weak_cache::WeakCache;

pub use obj::{load_obj, parse_obj, ObjError};

type TextureKey = (PathBuf, TextureSpace);

/// Deduplicating loader for meshes and textures.
///
/// Both caches hold weak handles only: an asset stays shared while some caller keeps its
/// `Arc`, and is reloaded from disk once every holder has dropped it. The default
/// textures are owned here and never expire.
pub struct ResourceCache {
    meshes: WeakCache<PathBuf, MeshAsset>,
    textures: WeakCache<TextureKey, Texture>,
    white: Arc<Texture>,
    flat_normal: Arc<Texture>,
    neutral_metal_rough: Arc<Texture>,
    material_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
}

impl ResourceCache {
    pub fn new(gpu: &GpuDevice, layouts: &BindingLayouts) -> Result<Self> {
        Ok(Self {
            meshes: WeakCache::new(),
            textures: WeakCache::new(),
            white: Arc::new(Texture::solid(gpu, "Default White", [255, 255, 255, 255], TextureSpace::Srgb)?),
            flat_normal: Arc::new(Texture::solid(gpu, "Default Normal", [128, 128, 255, 255], TextureSpace::Linear)?),
            neutral_metal_rough: Arc::new(Texture::solid(
                gpu,
                "Default Metal Rough",
                [0, 0, 0, 255],
                TextureSpace::Linear,
            )?),
            material_layout: layouts.material.clone(),
            sampler: create_material_sampler(gpu.device()),
        })
    }

    /// Loads an OBJ (and its MTL) or returns the live shared asset for `path`.
    ///
    /// Parse errors propagate. Missing or undecodable textures degrade to defaults.
    pub fn get_mesh_from_obj(&self, gpu: &GpuDevice, path: impl AsRef<Path>) -> Result<Arc<MeshAsset>> {
        let path = path.as_ref();
        let key = cache_key(path);
        self.meshes.get_or_try_insert_with(&key, || {
            log::info!("loading mesh {}", path.display());
            let data = load_obj(path)?;
            let label = path.file_stem().and_then(|stem| stem.to_str()).unwrap_or("Mesh");
            let asset = MeshAsset::upload(gpu, self, &data, label)
                .with_context(|| format!("Failed to upload mesh {}", path.display()))?;
            Ok(Arc::new(asset))
        })
    }

    /// Uploads procedural geometry. Not cached: every call creates a new asset.
    pub fn mesh_from_data(&self, gpu: &GpuDevice, data: &MeshData, label: &str) -> Result<Arc<MeshAsset>> {
        Ok(Arc::new(MeshAsset::upload(gpu, self, data, label)?))
    }

    /// Color texture at `path`, or the default white texture if it cannot be loaded.
    pub fn get_texture(&self, gpu: &GpuDevice, path: impl AsRef<Path>) -> Arc<Texture> {
        self.texture_or(gpu, path.as_ref(), TextureSpace::Srgb, &self.white)
    }

    fn texture_or(&self, gpu: &GpuDevice, path: &Path, space: TextureSpace, fallback: &Arc<Texture>) -> Arc<Texture> {
        let key = (cache_key(path), space);
        match self.textures.get_or_try_insert_with(&key, || Texture::load(gpu, path, space).map(Arc::new)) {
            Ok(texture) => texture,
            Err(err) => {
                log::warn!("{err:#}; using default texture");
                fallback.clone()
            }
        }
    }

    /// Resolves a material's maps. Albedo falls back to white, the normal map to a flat
    /// normal and the metal-rough map to a neutral texel.
    pub fn material_textures(&self, gpu: &GpuDevice, material: &MaterialDesc) -> MaterialTextures {
        let resolve = |path: &Option<PathBuf>, space, fallback: &Arc<Texture>| match path {
            Some(path) => self.texture_or(gpu, path, space, fallback),
            None => fallback.clone(),
        };
        MaterialTextures {
            albedo: resolve(&material.albedo_map, TextureSpace::Srgb, &self.white),
            normal: resolve(&material.normal_map, TextureSpace::Linear, &self.flat_normal),
            metal_rough: resolve(&material.metal_rough_map, TextureSpace::Linear, &self.neutral_metal_rough),
        }
    }

    pub fn default_white(&self) -> &Arc<Texture> {
        &self.white
    }

    pub fn flat_normal(&self) -> &Arc<Texture> {
        &self.flat_normal
    }

    pub fn material_layout(&self) -> &wgpu::BindGroupLayout {
        &self.material_layout
    }

    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }

    /// Live mesh for `path` without loading, if one is held somewhere.
    pub fn cached_mesh(&self, path: impl AsRef<Path>) -> Option<Arc<MeshAsset>> {
        self.meshes.get(&cache_key(path.as_ref()))
    }

    pub fn cached_mesh_count(&self) -> usize {
        self.meshes.live_count()
    }

    pub fn cached_texture_count(&self) -> usize {
        self.textures.live_count()
    }

    /// Drops dead entries from both caches. Returns how many were removed.
    pub fn purge(&self) -> usize {
        let removed = self.meshes.purge() + self.textures.purge();
        if removed > 0 {
            log::debug!("resource cache purged {removed} expired entries");
        }
        removed
    }
}

// Canonical paths make "a/../a/x.obj" and "a/x.obj" share one entry. Files that do not
// exist keep their literal path so the load reports the real error.
fn cache_key(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::test_support::headless_gpu;
    use std::num::NonZeroU64;

    fn cache(gpu: &GpuDevice) -> ResourceCache {
        let payload = NonZeroU64::new(std::mem::size_of::<crate::renderer::SceneConstants>() as u64).unwrap();
        let layouts = BindingLayouts::new(gpu.device(), payload);
        ResourceCache::new(gpu, &layouts).unwrap()
    }

    #[test]
    fn missing_textures_fall_back_to_white() {
        let Some(gpu) = headless_gpu() else { return };
        let cache = cache(&gpu);
        let texture = cache.get_texture(&gpu, "does/not/exist.png");
        assert!(Arc::ptr_eq(&texture, cache.default_white()));
        assert_eq!(cache.cached_texture_count(), 0);
    }

    #[test]
    fn material_without_maps_uses_defaults() {
        let Some(gpu) = headless_gpu() else { return };
        let cache = cache(&gpu);
        let textures = cache.material_textures(&gpu, &MaterialDesc::default());
        assert!(Arc::ptr_eq(&textures.albedo, cache.default_white()));
        assert_eq!(textures.normal.space(), TextureSpace::Linear);
    }

    #[test]
    fn procedural_meshes_are_not_cached() {
        let Some(gpu) = headless_gpu() else { return };
        let cache = cache(&gpu);
        let cube = cache.mesh_from_data(&gpu, &MeshData::cube(1.0), "cube").unwrap();
        assert_eq!(cube.index_count(), 36);
        assert_eq!(cache.cached_mesh_count(), 0);
    }
}
