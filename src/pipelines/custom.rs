use crate::{
    data_structures::{
        instance::InstanceRaw,
        material::ShaderSource,
        model::{ModelVertex, Vertex},
        texture::Texture,
    },
    pipelines::basic::{Rasterization, mk_render_pipeline_from_modules},
};

/// Pipeline for a material with user supplied stages.
///
/// The vertex source must define `vs_main` and the fragment source `fs_main`.
/// Bind group 0 is the camera; the vertex inputs are [`ModelVertex`] on
/// locations 0 to 2 and [`InstanceRaw`] on locations 5 to 12.
pub fn mk_custom_pipeline(
    device: &wgpu::Device,
    color_format: wgpu::TextureFormat,
    camera_bind_group_layout: &wgpu::BindGroupLayout,
    source: &ShaderSource,
) -> wgpu::RenderPipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Custom Shader Pipeline Layout"),
        bind_group_layouts: &[camera_bind_group_layout],
        push_constant_ranges: &[],
    });
    let vertex = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Custom Vertex Shader"),
        source: wgpu::ShaderSource::Wgsl(source.vertex.as_str().into()),
    });
    let fragment = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Custom Fragment Shader"),
        source: wgpu::ShaderSource::Wgsl(source.fragment.as_str().into()),
    });
    mk_render_pipeline_from_modules(
        device,
        &layout,
        color_format,
        Some(wgpu::BlendState::REPLACE),
        Some(Texture::DEPTH_FORMAT),
        &[ModelVertex::desc(), InstanceRaw::desc()],
        (&vertex, &fragment),
        Rasterization::default(),
    )
}
