use glam::{Vec2, Vec3};
use std::f32::consts::{PI, TAU};
use std::path::PathBuf;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 3],
    pub uv: [f32; 2],
    pub tangent: [f32; 3],
    pub bitangent: [f32; 3],
}

static VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 6] = [
    wgpu::VertexAttribute { offset: 0, shader_location: 0, format: wgpu::VertexFormat::Float32x3 },
    wgpu::VertexAttribute { offset: 12, shader_location: 1, format: wgpu::VertexFormat::Float32x3 },
    wgpu::VertexAttribute { offset: 24, shader_location: 2, format: wgpu::VertexFormat::Float32x3 },
    wgpu::VertexAttribute { offset: 36, shader_location: 3, format: wgpu::VertexFormat::Float32x2 },
    wgpu::VertexAttribute { offset: 44, shader_location: 4, format: wgpu::VertexFormat::Float32x3 },
    wgpu::VertexAttribute { offset: 56, shader_location: 5, format: wgpu::VertexFormat::Float32x3 },
];

impl MeshVertex {
    pub fn new(position: Vec3, normal: Vec3, uv: Vec2) -> Self {
        Self {
            position: position.to_array(),
            normal: normal.to_array(),
            color: [1.0; 3],
            uv: uv.to_array(),
            tangent: [1.0, 0.0, 0.0],
            bitangent: [0.0, 1.0, 0.0],
        }
    }

    pub fn with_color(mut self, color: Vec3) -> Self {
        self.color = color.to_array();
        self
    }

    /// Full vertex layout used by the opaque and alpha pipelines.
    pub fn layout<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<MeshVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &VERTEX_ATTRIBUTES,
        }
    }

    /// Same buffer, position attribute only. Used by the shadow pipeline.
    pub fn position_only_layout<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<MeshVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &VERTEX_ATTRIBUTES[..1],
        }
    }
}

/// Surface description for one submesh, as read from an MTL block.
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialDesc {
    pub name: String,
    pub diffuse: Vec3,
    pub specular: Vec3,
    pub emissive: Vec3,
    pub shininess: f32,
    pub opacity: f32,
    pub albedo_map: Option<PathBuf>,
    pub normal_map: Option<PathBuf>,
    pub metal_rough_map: Option<PathBuf>,
}

impl Default for MaterialDesc {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            diffuse: Vec3::ONE,
            specular: Vec3::ONE,
            emissive: Vec3::ZERO,
            shininess: 128.0,
            opacity: 1.0,
            albedo_map: None,
            normal_map: None,
            metal_rough_map: None,
        }
    }
}

impl MaterialDesc {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn is_translucent(&self) -> bool {
        self.opacity < 0.999
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubmeshDesc {
    pub index_start: u32,
    pub index_count: u32,
    pub material: MaterialDesc,
}

#[derive(Clone, Debug)]
pub struct MeshBounds {
    pub min: Vec3,
    pub max: Vec3,
    pub center: Vec3,
    pub radius: f32,
}

/// CPU-side geometry ready for upload.
#[derive(Clone, Debug)]
pub struct MeshData {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
    pub submeshes: Vec<SubmeshDesc>,
}

impl MeshData {
    /// Wraps raw arrays in a single default-material submesh.
    pub fn new(vertices: Vec<MeshVertex>, indices: Vec<u32>) -> Self {
        let submesh =
            SubmeshDesc { index_start: 0, index_count: indices.len() as u32, material: MaterialDesc::default() };
        Self { vertices, indices, submeshes: vec![submesh] }
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn triangle_count(&self) -> u32 {
        self.index_count() / 3
    }

    pub fn bounds(&self) -> MeshBounds {
        MeshBounds::from_vertices(&self.vertices)
    }

    /// Sets every vertex color and every submesh diffuse color.
    pub fn with_color(mut self, color: Vec3) -> Self {
        for vertex in &mut self.vertices {
            vertex.color = color.to_array();
        }
        for submesh in &mut self.submeshes {
            submesh.material.diffuse = color;
        }
        self
    }

    pub fn with_material(mut self, material: MaterialDesc) -> Self {
        for submesh in &mut self.submeshes {
            submesh.material = material.clone();
        }
        self
    }

    /// Flat grid on the XZ plane, `m` x `n` vertices, facing +Y.
    pub fn plane(width: f32, depth: f32, m: u32, n: u32) -> Self {
        let m = m.max(2);
        let n = n.max(2);
        let half_w = width * 0.5;
        let half_d = depth * 0.5;
        let mut vertices = Vec::with_capacity((m * n) as usize);
        for row in 0..n {
            let t = row as f32 / (n - 1) as f32;
            let z = -half_d + t * depth;
            for col in 0..m {
                let s = col as f32 / (m - 1) as f32;
                let x = -half_w + s * width;
                vertices.push(MeshVertex::new(Vec3::new(x, 0.0, z), Vec3::Y, Vec2::new(s, t)));
            }
        }
        let mut indices = Vec::with_capacity(((m - 1) * (n - 1) * 6) as usize);
        for row in 0..n - 1 {
            for col in 0..m - 1 {
                let i0 = row * m + col;
                let i1 = i0 + 1;
                let i2 = i0 + m;
                let i3 = i2 + 1;
                indices.extend_from_slice(&[i0, i2, i1, i1, i2, i3]);
            }
        }
        compute_tangents(&mut vertices, &indices);
        Self::new(vertices, indices)
    }

    /// Axis-aligned cube with per-face normals (24 vertices, 36 indices).
    pub fn cube(size: f32) -> Self {
        let hs = size * 0.5;
        let corners = [
            Vec3::new(-hs, -hs, -hs),
            Vec3::new(hs, -hs, -hs),
            Vec3::new(hs, hs, -hs),
            Vec3::new(-hs, hs, -hs),
            Vec3::new(-hs, -hs, hs),
            Vec3::new(hs, -hs, hs),
            Vec3::new(hs, hs, hs),
            Vec3::new(-hs, hs, hs),
        ];
        let uv_quad = [Vec2::new(0.0, 1.0), Vec2::new(1.0, 1.0), Vec2::new(1.0, 0.0), Vec2::new(0.0, 0.0)];
        let mut vertices = Vec::with_capacity(24);
        let mut face = |ids: [usize; 4], normal: Vec3| {
            for (corner, &id) in ids.iter().enumerate() {
                vertices.push(MeshVertex::new(corners[id], normal, uv_quad[corner]));
            }
        };
        face([1, 0, 3, 2], Vec3::NEG_Z);
        face([4, 5, 6, 7], Vec3::Z);
        face([0, 4, 7, 3], Vec3::NEG_X);
        face([5, 1, 2, 6], Vec3::X);
        face([7, 6, 2, 3], Vec3::Y);
        face([0, 1, 5, 4], Vec3::NEG_Y);

        let mut indices = Vec::with_capacity(36);
        for f in 0..6u32 {
            let base = f * 4;
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        compute_tangents(&mut vertices, &indices);
        Self::new(vertices, indices)
    }

    /// UV sphere centered at the origin.
    pub fn sphere(diameter: f32, slices: u16, stacks: u16) -> Self {
        let radius = diameter * 0.5;
        let slices = u32::from(slices.max(3));
        let stacks = u32::from(stacks.max(2));
        let mut vertices = Vec::with_capacity(((slices + 1) * (stacks + 1)) as usize);
        for stack in 0..=stacks {
            let v = stack as f32 / stacks as f32;
            let phi = v * PI;
            for slice in 0..=slices {
                let u = slice as f32 / slices as f32;
                let theta = u * TAU;
                let normal = Vec3::new(phi.sin() * theta.cos(), phi.cos(), phi.sin() * theta.sin());
                vertices.push(MeshVertex::new(normal * radius, normal, Vec2::new(u, v)));
            }
        }
        let ring = slices + 1;
        let mut indices = Vec::with_capacity((slices * stacks * 6) as usize);
        for stack in 0..stacks {
            for slice in 0..slices {
                let a = stack * ring + slice;
                let b = a + ring;
                indices.extend_from_slice(&[a, a + 1, b, a + 1, b + 1, b]);
            }
        }
        compute_tangents(&mut vertices, &indices);
        Self::new(vertices, indices)
    }

    /// Cylinder along +Y with its base at y = -height/2.
    pub fn cylinder(radius: f32, height: f32, slices: u32, with_caps: bool) -> Self {
        let slices = slices.max(3);
        let half = height * 0.5;
        let mut vertices = Vec::new();
        let mut indices = Vec::new();
        for slice in 0..=slices {
            let u = slice as f32 / slices as f32;
            let (sin, cos) = (u * TAU).sin_cos();
            let normal = Vec3::new(cos, 0.0, sin);
            vertices.push(MeshVertex::new(Vec3::new(cos * radius, -half, sin * radius), normal, Vec2::new(u, 1.0)));
            vertices.push(MeshVertex::new(Vec3::new(cos * radius, half, sin * radius), normal, Vec2::new(u, 0.0)));
        }
        for slice in 0..slices {
            let bottom = slice * 2;
            let top = bottom + 1;
            let next_bottom = bottom + 2;
            let next_top = bottom + 3;
            indices.extend_from_slice(&[bottom, top, next_bottom, next_bottom, top, next_top]);
        }
        if with_caps {
            push_disc(&mut vertices, &mut indices, radius, half, slices, Vec3::Y);
            push_disc(&mut vertices, &mut indices, radius, -half, slices, Vec3::NEG_Y);
        }
        compute_tangents(&mut vertices, &indices);
        Self::new(vertices, indices)
    }

    /// Cone along +Y with its apex at y = height/2.
    pub fn cone(radius: f32, height: f32, slices: u32, with_base: bool) -> Self {
        let slices = slices.max(3);
        let half = height * 0.5;
        let slope = radius / height.max(f32::EPSILON);
        let mut vertices = Vec::new();
        let mut indices = Vec::new();
        for slice in 0..slices {
            let u0 = slice as f32 / slices as f32;
            let u1 = (slice + 1) as f32 / slices as f32;
            let mid = (u0 + u1) * 0.5;
            let ring_normal = |u: f32| {
                let (sin, cos) = (u * TAU).sin_cos();
                Vec3::new(cos, slope, sin).normalize()
            };
            let ring_point = |u: f32| {
                let (sin, cos) = (u * TAU).sin_cos();
                Vec3::new(cos * radius, -half, sin * radius)
            };
            let base = vertices.len() as u32;
            vertices.push(MeshVertex::new(ring_point(u0), ring_normal(u0), Vec2::new(u0, 1.0)));
            vertices.push(MeshVertex::new(Vec3::new(0.0, half, 0.0), ring_normal(mid), Vec2::new(mid, 0.0)));
            vertices.push(MeshVertex::new(ring_point(u1), ring_normal(u1), Vec2::new(u1, 1.0)));
            indices.extend_from_slice(&[base, base + 1, base + 2]);
        }
        if with_base {
            push_disc(&mut vertices, &mut indices, radius, -half, slices, Vec3::NEG_Y);
        }
        compute_tangents(&mut vertices, &indices);
        Self::new(vertices, indices)
    }
}

/// Appends a triangle-fan disc at height `y` facing `normal`.
fn push_disc(vertices: &mut Vec<MeshVertex>, indices: &mut Vec<u32>, radius: f32, y: f32, slices: u32, normal: Vec3) {
    let center = vertices.len() as u32;
    vertices.push(MeshVertex::new(Vec3::new(0.0, y, 0.0), normal, Vec2::splat(0.5)));
    for slice in 0..=slices {
        let (sin, cos) = (slice as f32 / slices as f32 * TAU).sin_cos();
        let uv = Vec2::new(cos * 0.5 + 0.5, sin * 0.5 + 0.5);
        vertices.push(MeshVertex::new(Vec3::new(cos * radius, y, sin * radius), normal, uv));
    }
    for slice in 0..slices {
        let a = center + 1 + slice;
        let b = a + 1;
        if normal.y > 0.0 {
            indices.extend_from_slice(&[center, b, a]);
        } else {
            indices.extend_from_slice(&[center, a, b]);
        }
    }
}

/// Area-weighted smooth normals. Vertices with no contributing face get +Y.
pub fn compute_normals(vertices: &mut [MeshVertex], indices: &[u32]) {
    let mut accum = vec![Vec3::ZERO; vertices.len()];
    for tri in indices.chunks_exact(3) {
        let [i0, i1, i2] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        if i0 >= vertices.len() || i1 >= vertices.len() || i2 >= vertices.len() {
            continue;
        }
        let a = Vec3::from_array(vertices[i0].position);
        let b = Vec3::from_array(vertices[i1].position);
        let c = Vec3::from_array(vertices[i2].position);
        let normal = (b - a).cross(c - a);
        accum[i0] += normal;
        accum[i1] += normal;
        accum[i2] += normal;
    }
    for (vertex, normal) in vertices.iter_mut().zip(accum) {
        vertex.normal = normal.try_normalize().unwrap_or(Vec3::Y).to_array();
    }
}

/// Per-vertex tangent frame from UV gradients, Gram-Schmidt against the normal.
pub fn compute_tangents(vertices: &mut [MeshVertex], indices: &[u32]) {
    if vertices.is_empty() || indices.is_empty() {
        return;
    }
    let mut tan1 = vec![Vec3::ZERO; vertices.len()];
    let mut tan2 = vec![Vec3::ZERO; vertices.len()];

    for tri in indices.chunks_exact(3) {
        let [i0, i1, i2] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        if i0 >= vertices.len() || i1 >= vertices.len() || i2 >= vertices.len() {
            continue;
        }
        let v0 = Vec3::from_array(vertices[i0].position);
        let v1 = Vec3::from_array(vertices[i1].position);
        let v2 = Vec3::from_array(vertices[i2].position);
        let uv0 = Vec2::from_array(vertices[i0].uv);
        let uv1 = Vec2::from_array(vertices[i1].uv);
        let uv2 = Vec2::from_array(vertices[i2].uv);

        let delta_pos1 = v1 - v0;
        let delta_pos2 = v2 - v0;
        let delta_uv1 = uv1 - uv0;
        let delta_uv2 = uv2 - uv0;
        let denom = delta_uv1.x * delta_uv2.y - delta_uv1.y * delta_uv2.x;
        if denom.abs() < 1e-8 {
            continue;
        }
        let r = 1.0 / denom;
        let sdir = (delta_pos1 * delta_uv2.y - delta_pos2 * delta_uv1.y) * r;
        let tdir = (delta_pos2 * delta_uv1.x - delta_pos1 * delta_uv2.x) * r;
        for i in [i0, i1, i2] {
            tan1[i] += sdir;
            tan2[i] += tdir;
        }
    }

    for (i, vertex) in vertices.iter_mut().enumerate() {
        let normal = Vec3::from_array(vertex.normal);
        let t1 = tan1[i];
        let tangent = (t1 - normal * normal.dot(t1)).try_normalize().unwrap_or_else(|| normal.any_orthonormal_vector());
        let handedness = if normal.cross(t1).dot(tan2[i]) < 0.0 { -1.0 } else { 1.0 };
        let bitangent = normal.cross(tangent) * handedness;
        vertex.tangent = tangent.to_array();
        vertex.bitangent = bitangent.to_array();
    }
}

impl MeshBounds {
    pub fn from_vertices(vertices: &[MeshVertex]) -> Self {
        if vertices.is_empty() {
            return MeshBounds { min: Vec3::ZERO, max: Vec3::ZERO, center: Vec3::ZERO, radius: 0.0 };
        }
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for vertex in vertices {
            let pos = Vec3::from_array(vertex.position);
            min = min.min(pos);
            max = max.max(pos);
        }
        let center = (min + max) * 0.5;
        let radius = vertices
            .iter()
            .map(|v| (Vec3::from_array(v.position) - center).length())
            .fold(0.0_f32, f32::max);
        MeshBounds { min, max, center, radius }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_indices_in_range(data: &MeshData) {
        let count = data.vertices.len() as u32;
        assert!(data.indices.iter().all(|&i| i < count), "index out of range");
        assert_eq!(data.indices.len() % 3, 0);
    }

    #[test]
    fn vertex_layout_matches_struct() {
        assert_eq!(std::mem::size_of::<MeshVertex>(), 68);
        let layout = MeshVertex::layout();
        assert_eq!(layout.array_stride, 68);
        assert_eq!(layout.attributes.len(), 6);
        let shadow = MeshVertex::position_only_layout();
        assert_eq!(shadow.array_stride, layout.array_stride);
        assert_eq!(shadow.attributes.len(), 1);
        assert_eq!(shadow.attributes[0].shader_location, 0);
    }

    #[test]
    fn cube_has_expected_counts() {
        let cube = MeshData::cube(2.0);
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.index_count(), 36);
        assert_eq!(cube.submeshes.len(), 1);
        assert_eq!(cube.submeshes[0].index_count, 36);
        let bounds = cube.bounds();
        assert!((bounds.max - Vec3::ONE).length() < 1e-5);
        assert_indices_in_range(&cube);
    }

    #[test]
    fn cube_faces_wind_outward() {
        let cube = MeshData::cube(1.0);
        for tri in cube.indices.chunks_exact(3) {
            let a = Vec3::from_array(cube.vertices[tri[0] as usize].position);
            let b = Vec3::from_array(cube.vertices[tri[1] as usize].position);
            let c = Vec3::from_array(cube.vertices[tri[2] as usize].position);
            let face_normal = (b - a).cross(c - a).normalize();
            let stored = Vec3::from_array(cube.vertices[tri[0] as usize].normal);
            assert!(face_normal.dot(stored) > 0.99, "triangle winds against its normal");
        }
    }

    #[test]
    fn primitives_produce_valid_geometry() {
        let plane = MeshData::plane(10.0, 10.0, 4, 3);
        assert_eq!(plane.vertices.len(), 12);
        assert_eq!(plane.triangle_count(), 3 * 2 * 2);
        assert_indices_in_range(&plane);

        let sphere = MeshData::sphere(1.0, 16, 16);
        assert_eq!(sphere.vertices.len(), 17 * 17);
        assert_indices_in_range(&sphere);
        for v in &sphere.vertices {
            assert!((Vec3::from_array(v.position).length() - 0.5).abs() < 1e-4);
        }

        let cylinder = MeshData::cylinder(1.0, 2.0, 16, true);
        assert_indices_in_range(&cylinder);
        assert_eq!(cylinder.triangle_count(), 16 * 2 + 16 * 2);

        let cone = MeshData::cone(1.0, 1.0, 32, false);
        assert_eq!(cone.triangle_count(), 32);
        assert_indices_in_range(&cone);
    }

    #[test]
    fn tangent_frame_is_orthonormal() {
        let plane = MeshData::plane(1.0, 1.0, 2, 2);
        for v in &plane.vertices {
            let n = Vec3::from_array(v.normal);
            let t = Vec3::from_array(v.tangent);
            let b = Vec3::from_array(v.bitangent);
            assert!(n.dot(t).abs() < 1e-4);
            assert!((t.length() - 1.0).abs() < 1e-4);
            assert!((b.length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn smooth_normals_fall_back_to_up() {
        let mut vertices = vec![
            MeshVertex::new(Vec3::ZERO, Vec3::ZERO, Vec2::ZERO),
            MeshVertex::new(Vec3::X, Vec3::ZERO, Vec2::ZERO),
            MeshVertex::new(Vec3::Z, Vec3::ZERO, Vec2::ZERO),
            MeshVertex::new(Vec3::splat(5.0), Vec3::ZERO, Vec2::ZERO),
        ];
        compute_normals(&mut vertices, &[0, 2, 1]);
        assert!((Vec3::from_array(vertices[0].normal) - Vec3::Y).length() < 1e-5);
        assert_eq!(vertices[3].normal, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn with_color_updates_vertices_and_material() {
        let data = MeshData::cube(1.0).with_color(Vec3::new(1.0, 0.0, 0.0));
        assert!(data.vertices.iter().all(|v| v.color == [1.0, 0.0, 0.0]));
        assert_eq!(data.submeshes[0].material.diffuse, Vec3::new(1.0, 0.0, 0.0));
    }
}
