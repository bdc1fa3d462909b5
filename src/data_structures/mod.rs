//! Scene data structures: geometry, materials, transforms, animation and the scene graph.
//!
//! Everything in here is plain CPU data except [`texture`], which wraps GPU textures.
//!
//! - `geometry` contains flat vertex attributes and the primitive generators
//! - `material` holds colours, materials and texture references
//! - `instance` holds local transforms and their GPU representation
//! - `model` defines the vertex formats uploaded to the GPU
//! - `animation` contains keyframe clips and the mixer
//! - `scene_graph` enables hierarchical scene organization
//! - `texture` contains GPU texture wrapper and creation utilities

pub mod animation;
pub mod geometry;
pub mod instance;
pub mod material;
pub mod model;
pub mod scene_graph;
pub mod texture;
