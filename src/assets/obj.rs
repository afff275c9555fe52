use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use glam::{Vec2, Vec3};
use smallvec::SmallVec;
use thiserror::Error;

use super::mtl::{parse_mtl, resolve_texture_paths, MaterialLibrary};
use crate::mesh::{compute_normals, compute_tangents, MaterialDesc, MeshData, MeshVertex, SubmeshDesc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Position,
    TexCoord,
    Normal,
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AttributeKind::Position => "position",
            AttributeKind::TexCoord => "texcoord",
            AttributeKind::Normal => "normal",
        })
    }
}

#[derive(Debug, Error)]
pub enum ObjError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: {kind} index {index} out of range ({len} defined)")]
    IndexOutOfRange { line: usize, kind: AttributeKind, index: i64, len: usize },
    #[error("line {line}: malformed vertex reference '{token}'")]
    MalformedVertexRef { line: usize, token: String },
    #[error("line {line}: malformed number '{token}'")]
    MalformedNumber { line: usize, token: String },
    #[error("line {line}: face has {count} vertices, at least 3 required")]
    FaceTooSmall { line: usize, count: usize },
    #[error("no faces found")]
    NoGeometry,
}

/// Reads an OBJ file and every MTL library it names.
///
/// Missing MTL files are logged and skipped. Texture paths inside the libraries are
/// resolved against the OBJ's directory.
pub fn load_obj(path: impl AsRef<Path>) -> Result<MeshData, ObjError> {
    let path = path.as_ref();
    let source =
        fs::read_to_string(path).map_err(|source| ObjError::Io { path: path.to_path_buf(), source })?;
    let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    parse_obj(&source, |name| {
        let mtl_path = base_dir.join(name);
        match fs::read_to_string(&mtl_path) {
            Ok(text) => {
                let mut library = parse_mtl(&text);
                resolve_texture_paths(&mut library, &base_dir);
                log::debug!("loaded {} materials from {}", library.len(), mtl_path.display());
                library
            }
            Err(err) => {
                log::warn!("material library {} unavailable: {err}", mtl_path.display());
                MaterialLibrary::new()
            }
        }
    })
}

/// Parses OBJ text into indexed triangle geometry.
///
/// Polygons are fan-triangulated from their first corner. Corners are deduplicated on
/// the raw `v/vt/vn` token, so two references spelled identically share one vertex.
/// `open_library` is invoked once per `mtllib` statement.
pub fn parse_obj<F>(source: &str, mut open_library: F) -> Result<MeshData, ObjError>
where
    F: FnMut(&str) -> MaterialLibrary,
{
    let mut builder = ObjBuilder::default();

    for (line_index, raw_line) in source.lines().enumerate() {
        let line = line_index + 1;
        let text = raw_line.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }
        let mut tokens = text.split_whitespace();
        let Some(directive) = tokens.next() else { continue };
        match directive {
            "v" => {
                let [x, y, z] = parse_floats::<3>(line, &mut tokens, 3)?;
                builder.positions.push(Vec3::new(x, y, z));
            }
            "vt" => {
                let [u, v] = parse_floats::<2>(line, &mut tokens, 1)?;
                builder.texcoords.push(Vec2::new(u, v));
            }
            "vn" => {
                let [x, y, z] = parse_floats::<3>(line, &mut tokens, 3)?;
                builder.normals.push(Vec3::new(x, y, z));
            }
            "f" => {
                let corners: SmallVec<[&str; 8]> = tokens.collect();
                if corners.len() < 3 {
                    return Err(ObjError::FaceTooSmall { line, count: corners.len() });
                }
                let mut face: SmallVec<[u32; 8]> = SmallVec::with_capacity(corners.len());
                for token in corners {
                    face.push(builder.vertex_for(line, token)?);
                }
                for i in 2..face.len() {
                    builder.indices.extend_from_slice(&[face[0], face[i - 1], face[i]]);
                }
            }
            "mtllib" => {
                for name in tokens {
                    builder.materials.extend(open_library(name));
                }
            }
            "usemtl" => {
                let name = tokens.collect::<Vec<_>>().join(" ");
                builder.use_material(&name);
            }
            _ => {}
        }
    }
    builder.finish()
}

fn parse_floats<'a, const N: usize>(
    line: usize,
    tokens: &mut impl Iterator<Item = &'a str>,
    required: usize,
) -> Result<[f32; N], ObjError> {
    let mut out = [0.0; N];
    for (slot, value) in out.iter_mut().enumerate() {
        match tokens.next() {
            Some(token) => {
                *value = token
                    .parse()
                    .map_err(|_| ObjError::MalformedNumber { line, token: token.to_string() })?;
            }
            None if slot < required => {
                return Err(ObjError::MalformedNumber { line, token: String::new() });
            }
            None => break,
        }
    }
    Ok(out)
}

/// Absolute zero-based `(v, vt, vn)` indices of a face corner.
type VertexKey = (usize, Option<usize>, Option<usize>);

#[derive(Default)]
struct ObjBuilder {
    positions: Vec<Vec3>,
    texcoords: Vec<Vec2>,
    normals: Vec<Vec3>,
    materials: MaterialLibrary,
    vertex_map: HashMap<VertexKey, u32>,
    vertices: Vec<MeshVertex>,
    has_normal: Vec<bool>,
    indices: Vec<u32>,
    submeshes: Vec<SubmeshDesc>,
    active: MaterialDesc,
    active_start: u32,
}

impl ObjBuilder {
    fn vertex_for(&mut self, line: usize, token: &str) -> Result<u32, ObjError> {
        let (v, vt, vn) = split_vertex_ref(line, token)?;
        let key: VertexKey = (
            resolve(line, AttributeKind::Position, v, self.positions.len())?,
            vt.map(|raw| resolve(line, AttributeKind::TexCoord, raw, self.texcoords.len())).transpose()?,
            vn.map(|raw| resolve(line, AttributeKind::Normal, raw, self.normals.len())).transpose()?,
        );
        if let Some(&index) = self.vertex_map.get(&key) {
            return Ok(index);
        }
        let position = self.positions[key.0];
        let uv = key.1.map_or(Vec2::ZERO, |i| Vec2::new(self.texcoords[i].x, 1.0 - self.texcoords[i].y));
        let normal = key.2.map(|i| self.normals[i]);
        let vertex = MeshVertex::new(position, normal.unwrap_or(Vec3::ZERO), uv).with_color(self.active.diffuse);
        let index = self.vertices.len() as u32;
        self.vertices.push(vertex);
        self.has_normal.push(normal.is_some());
        self.vertex_map.insert(key, index);
        Ok(index)
    }

    fn use_material(&mut self, name: &str) {
        let material = match self.materials.get(name) {
            Some(found) => found.clone(),
            None => {
                log::warn!("material '{name}' not found in any loaded library, using defaults");
                MaterialDesc::named(name)
            }
        };
        self.close_group();
        self.active = material;
    }

    fn close_group(&mut self) {
        let end = self.indices.len() as u32;
        if end > self.active_start {
            self.submeshes.push(SubmeshDesc {
                index_start: self.active_start,
                index_count: end - self.active_start,
                material: self.active.clone(),
            });
        }
        self.active_start = end;
    }

    fn finish(mut self) -> Result<MeshData, ObjError> {
        self.close_group();
        if self.indices.is_empty() {
            return Err(ObjError::NoGeometry);
        }
        if self.has_normal.iter().any(|present| !present) {
            let mut smoothed = self.vertices.clone();
            compute_normals(&mut smoothed, &self.indices);
            for ((vertex, smooth), present) in self.vertices.iter_mut().zip(&smoothed).zip(&self.has_normal) {
                if !present {
                    vertex.normal = smooth.normal;
                }
            }
        }
        compute_tangents(&mut self.vertices, &self.indices);
        Ok(MeshData { vertices: self.vertices, indices: self.indices, submeshes: self.submeshes })
    }
}

/// Splits `v`, `v/vt`, `v//vn` or `v/vt/vn` into raw signed indices.
fn split_vertex_ref(line: usize, token: &str) -> Result<(i64, Option<i64>, Option<i64>), ObjError> {
    let malformed = || ObjError::MalformedVertexRef { line, token: token.to_string() };
    let mut parts = token.split('/');
    let parse_part = |part: Option<&str>| -> Result<Option<i64>, ObjError> {
        match part {
            None | Some("") => Ok(None),
            Some(text) => text.parse::<i64>().map(Some).map_err(|_| malformed()),
        }
    };
    let v = parse_part(parts.next())?.ok_or_else(|| malformed())?;
    let vt = parse_part(parts.next())?;
    let vn = parse_part(parts.next())?;
    if parts.next().is_some() {
        return Err(malformed());
    }
    Ok((v, vt, vn))
}

/// Turns a 1-based or negative (relative to the latest element) OBJ index into a
/// zero-based index below `len`.
fn resolve(line: usize, kind: AttributeKind, raw: i64, len: usize) -> Result<usize, ObjError> {
    let resolved = match raw {
        0 => None,
        r if r > 0 => usize::try_from(r - 1).ok(),
        r => usize::try_from(len as i64 + r).ok(),
    };
    resolved
        .filter(|&i| i < len)
        .ok_or(ObjError::IndexOutOfRange { line, kind, index: raw, len })
}
