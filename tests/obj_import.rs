use harrier::assets::{load_obj, mtl::MaterialLibrary, parse_obj, ObjError};
use harrier::mesh::MaterialDesc;
use std::fs;

const QUAD_AND_TRIANGLE: &str = "\
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
v 2 0 0
f 1 2 3 4
f 2 5 3
";

#[test]
fn quads_fan_into_triangles_and_share_vertices() {
    let mesh = parse_obj(QUAD_AND_TRIANGLE, |_| MaterialLibrary::new()).expect("parse");
    assert_eq!(mesh.vertices.len(), 5);
    assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3, 1, 4, 2]);
    assert_eq!(mesh.submeshes.len(), 1);
    assert_eq!(mesh.submeshes[0].index_count, 9);
}

#[test]
fn missing_normals_are_generated() {
    let mesh = parse_obj(QUAD_AND_TRIANGLE, |_| MaterialLibrary::new()).expect("parse");
    for vertex in &mesh.vertices {
        let n = glam::Vec3::from_array(vertex.normal);
        assert!((n - glam::Vec3::Z).length() < 1e-4, "normal {n:?}");
    }
}

#[test]
fn out_of_range_index_is_reported_with_line() {
    let err = parse_obj("v 0 0 0\nv 1 0 0\nf 1 2 7\n", |_| MaterialLibrary::new()).unwrap_err();
    assert!(matches!(err, ObjError::IndexOutOfRange { line: 3, .. }), "{err}");
}

#[test]
fn degenerate_face_is_rejected() {
    let err = parse_obj("v 0 0 0\nv 1 0 0\nf 1 2\n", |_| MaterialLibrary::new()).unwrap_err();
    assert!(matches!(err, ObjError::FaceTooSmall { line: 3, count: 2 }), "{err}");
}

#[test]
fn load_obj_resolves_mtl_next_to_the_model() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(
        dir.path().join("scene.mtl"),
        "newmtl tinted\nKd 0.2 0.4 0.6\nNs 32\nd 0.5\nmap_Kd albedo.png\n",
    )
    .expect("write mtl");
    let obj_path = dir.path().join("scene.obj");
    fs::write(&obj_path, "mtllib scene.mtl\nv 0 0 0\nv 1 0 0\nv 0 1 0\nusemtl tinted\nf 1 2 3\n").expect("write obj");

    let mesh = load_obj(&obj_path).expect("load");
    let material: &MaterialDesc = &mesh.submeshes.last().expect("submesh").material;
    assert_eq!(material.name, "tinted");
    assert!(material.is_translucent());
    assert_eq!(material.shininess, 32.0);
    assert_eq!(material.albedo_map.as_deref(), Some(dir.path().join("albedo.png").as_path()));
    assert_eq!(mesh.vertices[0].color, [0.2, 0.4, 0.6]);
}

#[test]
fn missing_file_is_an_io_error() {
    let err = load_obj("definitely/not/here.obj").unwrap_err();
    assert!(matches!(err, ObjError::Io { .. }));
}
