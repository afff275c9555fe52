pub mod app;
pub mod assets;
pub mod camera3d;
pub mod cli;
pub mod config;
pub mod input;
pub mod logging;
pub mod mesh;
pub mod mesh_asset;
pub mod renderer;
pub mod scene;
pub mod texture;
pub mod time;
pub mod transform;

pub use app::{run_with_config, App};
