use crate::{
    data_structures::{
        instance::InstanceRaw,
        material::{Material, Side},
        model::{self, Vertex},
        texture::Texture,
    },
    pipelines::MeshPipelineKey,
};

/// Per-material uniform of the mesh shader (group 2, binding 0).
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialUniform {
    /// Linear rgb and opacity.
    color: [f32; 4],
    /// x: lit, y: has a colour map, z: receives shadows, w: fogged.
    flags: [f32; 4],
}

impl MaterialUniform {
    pub fn new(material: &Material, receive_shadow: bool, fog: bool) -> Self {
        let [r, g, b] = material.color.to_linear();
        let flag = |on: bool| if on { 1.0 } else { 0.0 };
        Self {
            color: [r, g, b, material.opacity],
            flags: [
                flag(material.is_lit()),
                flag(material.map.is_some()),
                flag(receive_shadow),
                flag(fog),
            ],
        }
    }
}

/// Primitive and depth state of a pipeline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rasterization {
    pub topology: wgpu::PrimitiveTopology,
    pub cull_mode: Option<wgpu::Face>,
    pub depth_write: bool,
    pub depth_compare: wgpu::CompareFunction,
}

impl Default for Rasterization {
    fn default() -> Self {
        Self {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: Some(wgpu::Face::Back),
            depth_write: true,
            depth_compare: wgpu::CompareFunction::Less,
        }
    }
}

impl Rasterization {
    /// Counter-clockwise triangles face the viewer; culling follows the material side.
    pub fn for_mesh(key: MeshPipelineKey) -> Self {
        let cull_mode = match key.side {
            _ if key.wireframe => None,
            Side::Front => Some(wgpu::Face::Back),
            Side::Back => Some(wgpu::Face::Front),
            Side::Double => None,
        };
        Self {
            topology: if key.wireframe {
                wgpu::PrimitiveTopology::LineList
            } else {
                wgpu::PrimitiveTopology::TriangleList
            },
            cull_mode,
            depth_write: !key.blended,
            depth_compare: wgpu::CompareFunction::Less,
        }
    }
}

pub fn mk_material_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
        label: Some("material_bind_group_layout"),
    })
}

pub fn mk_mesh_pipeline(
    device: &wgpu::Device,
    config: &wgpu::SurfaceConfiguration,
    camera_bind_group_layout: &wgpu::BindGroupLayout,
    light_bind_group_layout: &wgpu::BindGroupLayout,
    material_bind_group_layout: &wgpu::BindGroupLayout,
    key: MeshPipelineKey,
) -> wgpu::RenderPipeline {
    let render_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Mesh Pipeline Layout"),
        bind_group_layouts: &[
            camera_bind_group_layout,
            light_bind_group_layout,
            material_bind_group_layout,
        ],
        push_constant_ranges: &[],
    });

    let shader = wgpu::ShaderModuleDescriptor {
        label: Some("Mesh Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/mesh.wgsl").into()),
    };

    let blend = if key.blended {
        Some(wgpu::BlendState::ALPHA_BLENDING)
    } else {
        Some(wgpu::BlendState::REPLACE)
    };

    mk_render_pipeline(
        device,
        &render_pipeline_layout,
        config.format,
        blend,
        Some(Texture::DEPTH_FORMAT),
        &[model::ModelVertex::desc(), InstanceRaw::desc()],
        shader,
        Rasterization::for_mesh(key),
    )
}

#[allow(clippy::too_many_arguments)]
pub fn mk_render_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    color_format: wgpu::TextureFormat,
    blend: Option<wgpu::BlendState>,
    depth_format: Option<wgpu::TextureFormat>,
    vertex_layouts: &[wgpu::VertexBufferLayout],
    shader: wgpu::ShaderModuleDescriptor,
    rasterization: Rasterization,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(shader);
    mk_render_pipeline_from_modules(
        device,
        layout,
        color_format,
        blend,
        depth_format,
        vertex_layouts,
        (&shader, &shader),
        rasterization,
    )
}

/// Like [`mk_render_pipeline`] with the vertex (`vs_main`) and fragment
/// (`fs_main`) stages taken from separate modules.
#[allow(clippy::too_many_arguments)]
pub fn mk_render_pipeline_from_modules(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    color_format: wgpu::TextureFormat,
    blend: Option<wgpu::BlendState>,
    depth_format: Option<wgpu::TextureFormat>,
    vertex_layouts: &[wgpu::VertexBufferLayout],
    (vertex, fragment): (&wgpu::ShaderModule, &wgpu::ShaderModule),
    rasterization: Rasterization,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        cache: None,
        label: Some("Render Pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: vertex,
            entry_point: Some("vs_main"),
            buffers: vertex_layouts,
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: fragment,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: color_format,
                blend,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: rasterization.topology,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: rasterization.cull_mode,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: depth_format.map(|format| wgpu::DepthStencilState {
            format,
            depth_write_enabled: rasterization.depth_write,
            depth_compare: rasterization.depth_compare,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
    })
}
