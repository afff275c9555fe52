use anyhow::{bail, Result};
use std::ops::Range;
use std::sync::Arc;
use wgpu::util::DeviceExt;

use crate::assets::ResourceCache;
use crate::mesh::{MeshBounds, MeshData};
use crate::renderer::device::GpuDevice;
use crate::renderer::MaterialScalars;
use crate::texture::Texture;

/// Textures bound for one material. Missing maps are the cache's neutral defaults.
#[derive(Clone)]
pub struct MaterialTextures {
    pub albedo: Arc<Texture>,
    pub normal: Arc<Texture>,
    pub metal_rough: Arc<Texture>,
}

/// One material range of a mesh's index buffer.
pub struct SubmeshAsset {
    pub name: String,
    pub indices: Range<u32>,
    pub scalars: MaterialScalars,
    pub translucent: bool,
    bind_group: wgpu::BindGroup,
    // Held so the views in `bind_group` outlive any cache purge.
    _textures: MaterialTextures,
}

impl SubmeshAsset {
    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    pub fn triangle_count(&self) -> u32 {
        (self.indices.end - self.indices.start) / 3
    }
}

/// GPU-resident mesh: vertex and index buffers plus per-submesh material bindings.
/// Shared through `Arc`; never mutated after upload.
pub struct MeshAsset {
    label: String,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    vertex_count: u32,
    index_count: u32,
    submeshes: Vec<SubmeshAsset>,
    bounds: MeshBounds,
}

impl MeshAsset {
    /// Uploads `data` synchronously and resolves each submesh's textures through `cache`.
    pub fn upload(gpu: &GpuDevice, cache: &ResourceCache, data: &MeshData, label: &str) -> Result<Self> {
        if data.indices.is_empty() || data.vertices.is_empty() {
            bail!("mesh '{label}' has no geometry");
        }
        let vertex_count = data.vertices.len() as u32;
        if let Some(bad) = data.indices.iter().find(|index| **index >= vertex_count) {
            bail!("mesh '{label}' references vertex {bad} but has {vertex_count}");
        }
        let index_count = data.index_count();

        let device = gpu.device();
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} Vertices")),
            contents: bytemuck::cast_slice(&data.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} Indices")),
            contents: bytemuck::cast_slice(&data.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let mut submeshes = Vec::with_capacity(data.submeshes.len());
        for desc in &data.submeshes {
            let end = desc.index_start + desc.index_count;
            if end > index_count {
                bail!("submesh '{}' of '{label}' ends at index {end} past {index_count}", desc.material.name);
            }
            if desc.index_count == 0 {
                continue;
            }
            let textures = cache.material_textures(gpu, &desc.material);
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&format!("{label}/{} Material BG", desc.material.name)),
                layout: cache.material_layout(),
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(textures.albedo.view()),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(textures.normal.view()),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureView(textures.metal_rough.view()),
                    },
                    wgpu::BindGroupEntry { binding: 3, resource: wgpu::BindingResource::Sampler(cache.sampler()) },
                ],
            });
            submeshes.push(SubmeshAsset {
                name: desc.material.name.clone(),
                indices: desc.index_start..end,
                scalars: MaterialScalars {
                    specular: desc.material.specular,
                    emissive: desc.material.emissive,
                    shininess: desc.material.shininess,
                    opacity: desc.material.opacity.clamp(0.0, 1.0),
                },
                translucent: desc.material.is_translucent(),
                bind_group,
                _textures: textures,
            });
        }

        log::debug!(
            "uploaded mesh '{label}': {vertex_count} vertices, {index_count} indices, {} submeshes",
            submeshes.len()
        );
        Ok(Self {
            label: label.to_string(),
            vertex_buffer,
            index_buffer,
            vertex_count,
            index_count,
            submeshes,
            bounds: data.bounds(),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn vertex_buffer(&self) -> &wgpu::Buffer {
        &self.vertex_buffer
    }

    pub fn index_buffer(&self) -> &wgpu::Buffer {
        &self.index_buffer
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn triangle_count(&self) -> u32 {
        self.index_count / 3
    }

    pub fn submeshes(&self) -> &[SubmeshAsset] {
        &self.submeshes
    }

    pub fn bounds(&self) -> &MeshBounds {
        &self.bounds
    }
}
