use crate::{
    data_structures::{
        instance::InstanceRaw,
        model::{LineVertex, Vertex},
        texture::Texture,
    },
    pipelines::basic::{Rasterization, mk_render_pipeline},
};

/// Coloured line segments for the grid, axes and light helpers.
pub fn mk_lines_pipeline(
    device: &wgpu::Device,
    config: &wgpu::SurfaceConfiguration,
    camera_bind_group_layout: &wgpu::BindGroupLayout,
) -> wgpu::RenderPipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Lines Pipeline Layout"),
        bind_group_layouts: &[camera_bind_group_layout],
        push_constant_ranges: &[],
    });
    let shader = wgpu::ShaderModuleDescriptor {
        label: Some("Lines Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/lines.wgsl").into()),
    };
    mk_render_pipeline(
        device,
        &layout,
        config.format,
        Some(wgpu::BlendState::REPLACE),
        Some(Texture::DEPTH_FORMAT),
        &[LineVertex::desc(), InstanceRaw::desc()],
        shader,
        Rasterization {
            topology: wgpu::PrimitiveTopology::LineList,
            cull_mode: None,
            ..Default::default()
        },
    )
}
