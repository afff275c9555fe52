use std::collections::HashMap;
use std::path::{Path, PathBuf};

use glam::Vec3;

use crate::mesh::MaterialDesc;

pub type MaterialLibrary = HashMap<String, MaterialDesc>;

/// Parses MTL text. Directives outside a `newmtl` block and malformed values are
/// skipped with a warning; an MTL file never fails a mesh load.
pub fn parse_mtl(source: &str) -> MaterialLibrary {
    let mut library = MaterialLibrary::new();
    let mut current: Option<String> = None;

    for (line_index, raw_line) in source.lines().enumerate() {
        let line_no = line_index + 1;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let Some(directive) = tokens.next() else { continue };
        let args: Vec<&str> = tokens.collect();

        if directive == "newmtl" {
            let name = args.join(" ");
            library.insert(name.clone(), MaterialDesc::named(name.clone()));
            current = Some(name);
            continue;
        }
        let Some(material) = current.as_ref().and_then(|name| library.get_mut(name)) else {
            log::debug!("mtl line {line_no}: '{directive}' before any newmtl, skipped");
            continue;
        };
        let applied = match directive {
            "Kd" => parse_color(&args).map(|c| material.diffuse = c),
            "Ks" => parse_color(&args).map(|c| material.specular = c),
            "Ke" => parse_color(&args).map(|c| material.emissive = c),
            "Ns" => parse_scalar(&args).map(|v| material.shininess = v),
            "d" => parse_scalar(&args).map(|v| material.opacity = v.clamp(0.0, 1.0)),
            "Tr" => parse_scalar(&args).map(|v| material.opacity = (1.0 - v).clamp(0.0, 1.0)),
            "map_Kd" => map_path(&args).map(|p| material.albedo_map = Some(p)),
            "map_Bump" | "map_bump" | "bump" | "norm" => map_path(&args).map(|p| material.normal_map = Some(p)),
            "map_Pr" | "map_Pm" | "map_MR" => map_path(&args).map(|p| material.metal_rough_map = Some(p)),
            _ => Some(()),
        };
        if applied.is_none() {
            log::warn!("mtl line {line_no}: malformed '{line}', skipped");
        }
    }
    library
}

/// Rewrites relative texture paths so they resolve against `base_dir`.
pub fn resolve_texture_paths(library: &mut MaterialLibrary, base_dir: &Path) {
    for material in library.values_mut() {
        for slot in [&mut material.albedo_map, &mut material.normal_map, &mut material.metal_rough_map] {
            if let Some(path) = slot.as_mut() {
                if path.is_relative() {
                    *path = base_dir.join(&*path);
                }
            }
        }
    }
}

fn parse_color(args: &[&str]) -> Option<Vec3> {
    match args {
        [r, g, b, ..] => Some(Vec3::new(r.parse().ok()?, g.parse().ok()?, b.parse().ok()?)),
        // A single value is a grey level.
        [v] => Some(Vec3::splat(v.parse().ok()?)),
        _ => None,
    }
}

fn parse_scalar(args: &[&str]) -> Option<f32> {
    args.first()?.parse().ok()
}

// Map statements may carry options (`-bm 0.5 file.png`); the file is always last.
fn map_path(args: &[&str]) -> Option<PathBuf> {
    args.last().map(|p| PathBuf::from(p.replace('\\', "/")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# two materials
newmtl red
Kd 1 0 0
Ks 0.5 0.5 0.5
Ns 64
map_Kd textures/red.png

newmtl glass
Kd 0.8 0.9 1.0
d 0.25
Ke 0.1 0.1 0.1
map_Bump -bm 0.5 glass_n.png
map_MR glass_mr.png
";

    #[test]
    fn parses_every_supported_field() {
        let lib = parse_mtl(SAMPLE);
        assert_eq!(lib.len(), 2);
        let red = &lib["red"];
        assert_eq!(red.diffuse, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(red.specular, Vec3::splat(0.5));
        assert_eq!(red.shininess, 64.0);
        assert_eq!(red.albedo_map.as_deref(), Some(Path::new("textures/red.png")));
        assert!(!red.is_translucent());

        let glass = &lib["glass"];
        assert!((glass.opacity - 0.25).abs() < 1e-6);
        assert!(glass.is_translucent());
        assert_eq!(glass.emissive, Vec3::splat(0.1));
        assert_eq!(glass.normal_map.as_deref(), Some(Path::new("glass_n.png")));
        assert_eq!(glass.metal_rough_map.as_deref(), Some(Path::new("glass_mr.png")));
    }

    #[test]
    fn transparency_is_inverse_of_dissolve() {
        let lib = parse_mtl("newmtl a\nTr 0.75\n");
        assert!((lib["a"].opacity - 0.25).abs() < 1e-6);
    }

    #[test]
    fn malformed_values_keep_defaults() {
        let lib = parse_mtl("Kd 0 0 0\nnewmtl m\nKd one two three\nNs\n");
        let m = &lib["m"];
        assert_eq!(m.diffuse, Vec3::ONE);
        assert_eq!(m.shininess, 128.0);
    }

    #[test]
    fn relative_maps_resolve_against_base_dir() {
        let mut lib = parse_mtl(SAMPLE);
        resolve_texture_paths(&mut lib, Path::new("assets/models"));
        assert_eq!(lib["red"].albedo_map.as_deref(), Some(Path::new("assets/models/textures/red.png")));
    }
}
