//! flow-playground
//!
//! A three-dimensional playground scene built on a small flow-based wgpu
//! engine. The engine part of this crate owns the window, the GPU context and
//! the render pipelines; the `showcase` module assembles the demo scene
//! (primitives, textures, a glTF model, lights, fog, a skybox and a shader
//! material), binds a parameter panel to it and animates it every frame.
//! It runs natively and in the browser.
//!
//! High-level modules
//! - `camera`: camera types, orbit controller and uniforms for view/projection
//! - `config`: compile-time scene configuration
//! - `context`: central GPU and window context that owns device/queue/pipelines
//! - `data_structures`: scene graph, geometry, materials, animation and textures
//! - `flow`: high level flow control (scenes / update loops)
//! - `panel`: the parameter panel overlay
//! - `pick`: ray casting against scene meshes
//! - `pipelines`: definitions for the render pipelines (meshes, shadow, sky, lines, gui)
//! - `resources`: helpers to load images, shader sources and glTF models
//! - `render`: render composition and the GPU mirror of a scene graph
//! - `showcase`: the playground scene itself
//!

pub mod camera;
pub mod config;
pub mod context;
pub mod data_structures;
pub mod flow;
pub mod panel;
pub mod pick;
pub mod pipelines;
pub mod render;
pub mod resources;
pub mod showcase;

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath::*;
pub use winit::dpi::PhysicalPosition;
pub use winit::event::WindowEvent;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

/// Browser entry point.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn run_web() -> Result<(), wasm_bindgen::JsValue> {
    showcase::run().map_err(|e| wasm_bindgen::JsValue::from_str(&format!("{:#}", e)))
}
