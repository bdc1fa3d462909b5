use crate::{
    data_structures::texture,
    panel::PanelVertex,
    pipelines::basic::{Rasterization, mk_render_pipeline},
};

fn mk_pipeline_layout(device: &wgpu::Device) -> wgpu::PipelineLayout {
    device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Panel Render Pipeline Layout"),
        bind_group_layouts: &[],
        push_constant_ranges: &[],
    })
}

/// Screen-space overlay drawn on top of the scene; it ignores the depth
/// buffer but shares the main pass.
pub fn mk_gui_pipeline(
    device: &wgpu::Device,
    config: &wgpu::SurfaceConfiguration,
) -> wgpu::RenderPipeline {
    let shader = wgpu::ShaderModuleDescriptor {
        label: Some("Panel Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/panel.wgsl").into()),
    };
    let render_pipeline_layout = mk_pipeline_layout(device);
    mk_render_pipeline(
        device,
        &render_pipeline_layout,
        config.format,
        Some(wgpu::BlendState {
            color: wgpu::BlendComponent::OVER,
            alpha: wgpu::BlendComponent::OVER,
        }),
        Some(texture::Texture::DEPTH_FORMAT),
        &[PanelVertex::desc()],
        shader,
        Rasterization {
            cull_mode: None,
            depth_write: false,
            depth_compare: wgpu::CompareFunction::Always,
            ..Default::default()
        },
    )
}
