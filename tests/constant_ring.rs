mod common;

use glam::{Mat4, Vec3};
use harrier::mesh::MeshData;
use harrier::renderer::constant_ring::{aligned_slice_size, slice_index, RingLayout};
use harrier::renderer::SceneConstants;
use harrier::scene::Mesh;

#[test]
fn scene_constants_fill_whole_alignment_slots() {
    let payload = std::mem::size_of::<SceneConstants>() as u64;
    assert_eq!(payload, 320);
    assert_eq!(aligned_slice_size(payload, 256), 512);
    let layout = RingLayout::new(payload, 256, 2 * 19_000);
    assert_eq!(layout.address(19_000).expect("in range").offset, 19_000 * 512);
    assert!(layout.address(38_000).is_err());
}

#[test]
fn frame_slots_own_disjoint_bands() {
    let per_frame = 8;
    let first: Vec<u32> = (0..per_frame).map(|i| slice_index(0, per_frame, i)).collect();
    let second: Vec<u32> = (0..per_frame).map(|i| slice_index(1, per_frame, i)).collect();
    assert!(first.iter().all(|i| !second.contains(i)));
    assert_eq!(second[0], per_frame);
}

#[test]
fn display_writes_one_slice_per_draw() {
    let Some(mut gpu) = common::headless_gpu() else { return };
    let mut scene = common::headless_scene(&gpu, 64, 64);
    let mut left = Mesh::from_data(&gpu, scene.cache(), &MeshData::cube(1.0), "left").expect("cube");
    left.set_position(Vec3::new(-2.0, 0.0, 0.0));
    let mut right = left.clone();
    right.set_position(Vec3::new(3.0, 1.0, 0.0));
    right.set_shininess(32.0);

    scene.draw(&left);
    scene.draw(&right);
    let frame_slot = scene.renderer().frame_slot() as u32;
    scene.display(&mut gpu).expect("display");

    let per_frame = scene.ring().slices_per_frame();
    let payload = std::mem::size_of::<SceneConstants>();
    let read = |object: u32| -> SceneConstants {
        let bytes = scene.ring().slice_bytes(frame_slot * per_frame + object).expect("slice");
        bytemuck::pod_read_unaligned(&bytes[..payload])
    };
    let first = read(0);
    let second = read(1);
    assert_eq!(Mat4::from_cols_array_2d(&first.model).w_axis.truncate(), Vec3::new(-2.0, 0.0, 0.0));
    assert_eq!(Mat4::from_cols_array_2d(&second.model).w_axis.truncate(), Vec3::new(3.0, 1.0, 0.0));
    assert_eq!(first.shininess, 128.0);
    assert_eq!(second.shininess, 32.0);
    assert_eq!(first.view_proj, second.view_proj);
}
