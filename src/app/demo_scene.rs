use anyhow::Result;
use glam::Vec3;
use std::path::Path;

use crate::mesh::{MaterialDesc, MeshData};
use crate::renderer::device::GpuDevice;
use crate::scene::{Mesh, Scene};

/// Objects placed by the demo shell, kept separately so the loop can animate them.
pub(crate) struct DemoObjects {
    pub ground: Mesh,
    pub spinners: Vec<Mesh>,
    pub props: Vec<Mesh>,
    pub model: Option<Mesh>,
}

impl DemoObjects {
    /// Ground plane, a ring of cubes, a few primitives and an optional OBJ model.
    ///
    /// A model that fails to load is logged and left out; the rest of the scene still renders.
    pub fn build(gpu: &GpuDevice, scene: &Scene, model_path: Option<&Path>) -> Result<Self> {
        let cache = scene.cache();

        let ground_data = MeshData::plane(40.0, 40.0, 2, 2).with_color(Vec3::new(0.55, 0.57, 0.6));
        let mut ground = Mesh::from_data(gpu, cache, &ground_data, "Ground")?;
        ground.set_casts_shadows(false);
        ground.set_shininess(16.0);

        let cube_asset = cache.mesh_from_data(gpu, &MeshData::cube(1.0).with_color(Vec3::new(0.85, 0.3, 0.25)), "Cube")?;
        let mut spinners = Vec::new();
        for i in 0..6 {
            let angle = i as f32 / 6.0 * std::f32::consts::TAU;
            let mut cube = Mesh::from_asset(cube_asset.clone());
            cube.set_position(Vec3::new(angle.cos() * 4.0, 0.5, angle.sin() * 4.0));
            cube.set_rotation(angle.to_degrees(), 0.0, 0.0);
            spinners.push(cube);
        }

        let mut props = Vec::new();
        let sphere_data = MeshData::sphere(1.5, 32, 16).with_color(Vec3::new(0.25, 0.45, 0.9));
        let mut sphere = Mesh::from_data(gpu, cache, &sphere_data, "Sphere")?;
        sphere.set_position(Vec3::new(0.0, 0.75, 0.0));
        sphere.set_shininess(256.0);
        props.push(sphere);

        let cylinder_data = MeshData::cylinder(0.4, 2.0, 24, true).with_color(Vec3::new(0.3, 0.75, 0.35));
        let mut cylinder = Mesh::from_data(gpu, cache, &cylinder_data, "Cylinder")?;
        cylinder.set_position(Vec3::new(-6.5, 1.0, -2.0));
        props.push(cylinder);

        let cone_data = MeshData::cone(0.6, 1.5, 24, true).with_color(Vec3::new(0.9, 0.75, 0.2));
        let mut cone = Mesh::from_data(gpu, cache, &cone_data, "Cone")?;
        cone.set_position(Vec3::new(6.5, 0.75, -2.0));
        props.push(cone);

        let glass = MaterialDesc { opacity: 0.4, diffuse: Vec3::new(0.6, 0.85, 1.0), ..MaterialDesc::named("glass") };
        let pane_data = MeshData::cube(1.0).with_material(glass).with_color(Vec3::new(0.6, 0.85, 1.0));
        let mut pane = Mesh::from_data(gpu, cache, &pane_data, "Glass Pane")?;
        pane.set_position(Vec3::new(0.0, 1.25, 3.0));
        pane.set_scale(Vec3::new(3.0, 2.5, 0.1));
        pane.set_casts_shadows(false);
        props.push(pane);

        let model = match model_path {
            Some(path) => match Mesh::from_obj(cache, gpu, path) {
                Ok(mut mesh) => {
                    mesh.set_position(Vec3::new(0.0, 0.0, -5.0));
                    log::info!("placed model {} ({} indices)", path.display(), mesh.index_count());
                    Some(mesh)
                }
                Err(err) => {
                    log::error!("failed to load model {}: {err:#}", path.display());
                    None
                }
            },
            None => None,
        };

        Ok(Self { ground, spinners, props, model })
    }

    pub fn animate(&mut self, dt: f32) {
        for (i, cube) in self.spinners.iter_mut().enumerate() {
            let speed = 30.0 + i as f32 * 10.0;
            cube.add_rotation(speed * dt, speed * 0.5 * dt, 0.0);
        }
        if let Some(model) = self.model.as_mut() {
            model.add_rotation(15.0 * dt, 0.0, 0.0);
        }
    }

    /// Queues every object for the next `display`.
    pub fn submit(&self, scene: &mut Scene) {
        scene.draw(&self.ground);
        for mesh in self.spinners.iter().chain(&self.props).chain(self.model.iter()) {
            scene.draw(mesh);
        }
    }

    pub fn object_count(&self) -> usize {
        1 + self.spinners.len() + self.props.len() + usize::from(self.model.is_some())
    }
}
