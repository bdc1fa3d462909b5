//! Render pipelines owned by the [`Context`](crate::context::Context).
//!
//! Every built-in pipeline is created once at startup. Mesh pipelines come in
//! one variant per [`MeshPipelineKey`] so that a material switch between
//! draws is only a `set_pipeline`. Pipelines for user supplied shaders are
//! built on demand by [`custom::mk_custom_pipeline`].

use std::collections::HashMap;

use crate::data_structures::material::Side;

pub mod basic;
pub mod custom;
pub mod gui;
pub mod light;
pub mod lines;
pub mod skybox;

/// Selects one of the mesh pipeline variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MeshPipelineKey {
    pub side: Side,
    pub blended: bool,
    pub wireframe: bool,
}

impl MeshPipelineKey {
    pub const ALL_SIDES: [Side; 3] = [Side::Front, Side::Back, Side::Double];
}

#[derive(Debug)]
pub struct Pipelines {
    pub meshes: HashMap<MeshPipelineKey, wgpu::RenderPipeline>,
    pub shadow: wgpu::RenderPipeline,
    pub skybox: wgpu::RenderPipeline,
    pub lines: wgpu::RenderPipeline,
    pub gui: wgpu::RenderPipeline,
    pub material_layout: wgpu::BindGroupLayout,
    pub skybox_layout: wgpu::BindGroupLayout,
}

impl Pipelines {
    pub fn new(
        device: &wgpu::Device,
        config: &wgpu::SurfaceConfiguration,
        camera_bind_group_layout: &wgpu::BindGroupLayout,
        light_bind_group_layout: &wgpu::BindGroupLayout,
    ) -> Self {
        let material_layout = basic::mk_material_bind_group_layout(device);
        let mut meshes = HashMap::new();
        for side in MeshPipelineKey::ALL_SIDES {
            for blended in [false, true] {
                for wireframe in [false, true] {
                    let key = MeshPipelineKey {
                        side,
                        blended,
                        wireframe,
                    };
                    meshes.insert(
                        key,
                        basic::mk_mesh_pipeline(
                            device,
                            config,
                            camera_bind_group_layout,
                            light_bind_group_layout,
                            &material_layout,
                            key,
                        ),
                    );
                }
            }
        }
        let skybox_layout = skybox::mk_bind_group_layout(device);
        Self {
            meshes,
            shadow: light::mk_shadow_pipeline(device, camera_bind_group_layout),
            skybox: skybox::mk_skybox_pipeline(
                device,
                config,
                camera_bind_group_layout,
                &skybox_layout,
            ),
            lines: lines::mk_lines_pipeline(device, config, camera_bind_group_layout),
            gui: gui::mk_gui_pipeline(device, config),
            material_layout,
            skybox_layout,
        }
    }

    pub fn mesh(&self, key: MeshPipelineKey) -> Option<&wgpu::RenderPipeline> {
        self.meshes.get(&key)
    }
}
