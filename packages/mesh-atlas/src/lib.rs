pub mod gpu;
pub mod pipeline;
pub mod host;
pub mod frame;

// Scene side
pub mod camera;
pub mod mesh_asset;
pub mod scene;
pub mod scene_file;
pub mod settings;
pub mod objects;

// Atlas packing and CPU reference kernels
pub mod config;
pub mod layout;
pub mod accumulate;

pub mod cli;
