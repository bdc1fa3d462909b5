//! Scene lighting, fog and the spot light shadow map.
//!
//! [`LightResources`] holds the uniform the mesh shader reads in bind group 1
//! together with the shadow map and its comparison sampler. The shadow pass
//! renders casters from the spot light with a [`CameraUniform`] of its own,
//! so it shares the camera bind group layout.

use cgmath::{Deg, InnerSpace, Matrix4, Point3, Rad, SquareMatrix, Vector3, perspective};
use wgpu::util::DeviceExt;

use crate::{
    camera::{CameraUniform, OPENGL_TO_WGPU_MATRIX},
    data_structures::{
        instance::InstanceRaw,
        model::{ModelVertex, Vertex},
        scene_graph::{FogExp2, NodeKind, SceneGraph, SpotLight},
        texture::Texture,
    },
};

pub const SHADOW_MAP_SIZE: u32 = 2048;
const SHADOW_NEAR: f32 = 0.5;
const SHADOW_FAR: f32 = 500.0;

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightUniform {
    /// Linear rgb times intensity of all ambient lights.
    pub ambient: [f32; 4],
    /// Linear rgb times intensity; w is 1 when a spot light exists.
    pub spot_color: [f32; 4],
    /// World position; w is the cut-off distance (0 = infinite).
    pub spot_position: [f32; 4],
    /// Unit direction towards the target; w is the decay exponent.
    pub spot_direction: [f32; 4],
    /// x: cos of the outer angle, y: cos of the inner angle, z: shadows on.
    pub spot_cone: [f32; 4],
    /// Linear rgb; w is the exp2 density (0 = no fog).
    pub fog: [f32; 4],
    pub light_view_proj: [[f32; 4]; 4],
}

impl Default for LightUniform {
    fn default() -> Self {
        Self {
            ambient: [0.0; 4],
            spot_color: [0.0; 4],
            spot_position: [0.0; 4],
            spot_direction: [0.0, -1.0, 0.0, 0.0],
            spot_cone: [1.0, 1.0, 0.0, 0.0],
            fog: [0.0; 4],
            light_view_proj: Matrix4::identity().into(),
        }
    }
}

impl LightUniform {
    pub fn set_ambient(&mut self, linear: [f32; 3]) {
        self.ambient = [linear[0], linear[1], linear[2], 1.0];
    }

    pub fn set_fog(&mut self, fog: Option<&FogExp2>) {
        self.fog = match fog {
            Some(fog) => {
                let [r, g, b] = fog.color.to_linear();
                [r, g, b, fog.density]
            }
            None => [0.0; 4],
        };
    }

    /// Upload a spot light placed at `position` in world space.
    pub fn set_spot(&mut self, position: Vector3<f32>, spot: &SpotLight, shadows: bool) {
        let [r, g, b] = spot.color.to_linear();
        self.spot_color = [r * spot.intensity, g * spot.intensity, b * spot.intensity, 1.0];
        self.spot_position = [position.x, position.y, position.z, spot.distance];
        let direction = spot_direction(position, spot.target);
        self.spot_direction = [direction.x, direction.y, direction.z, spot.decay];
        let angle = spot.angle.clamp(0.0, std::f32::consts::FRAC_PI_2);
        let outer = angle.cos();
        let inner = (angle * (1.0 - spot.penumbra.clamp(0.0, 1.0))).cos();
        self.spot_cone = [outer, inner, if shadows { 1.0 } else { 0.0 }, 0.0];
        self.light_view_proj = spot_view_proj(position, spot).into();
    }

    pub fn clear_spot(&mut self) {
        self.spot_color = [0.0; 4];
        self.spot_cone = [1.0, 1.0, 0.0, 0.0];
    }

    /// Sum the visible ambient lights, take the first visible spot light and
    /// the fog of `scene`. World transforms must be up to date.
    pub fn from_scene(scene: &SceneGraph) -> Self {
        let mut uniform = Self::default();
        let mut ambient = [0.0f32; 3];
        let mut spot = None;
        for node in scene.visible_nodes() {
            match &node.kind {
                NodeKind::AmbientLight(light) => {
                    let linear = light.color.to_linear();
                    ambient
                        .iter_mut()
                        .zip(linear)
                        .for_each(|(sum, c)| *sum += c * light.intensity);
                }
                NodeKind::SpotLight(light) if spot.is_none() => {
                    spot = Some((node.world().position, light));
                }
                _ => (),
            }
        }
        uniform.set_ambient(ambient);
        match spot {
            Some((position, light)) => uniform.set_spot(position, light, light.cast_shadow),
            None => uniform.clear_spot(),
        }
        uniform.set_fog(scene.fog.as_ref());
        uniform
    }
}

fn spot_direction(position: Vector3<f32>, target: Vector3<f32>) -> Vector3<f32> {
    let direction = target - position;
    if direction.magnitude2() > f32::EPSILON {
        direction.normalize()
    } else {
        -Vector3::unit_y()
    }
}

/// View-projection of the shadow camera: it looks along the cone with a
/// field of view of twice the cone angle.
pub fn spot_view_proj(position: Vector3<f32>, spot: &SpotLight) -> Matrix4<f32> {
    let direction = spot_direction(position, spot.target);
    let up = if direction.y.abs() > 0.99 {
        Vector3::unit_z()
    } else {
        Vector3::unit_y()
    };
    let eye = Point3::new(position.x, position.y, position.z);
    let view = Matrix4::look_at_rh(eye, eye + direction, up);
    let min = Rad::from(Deg(1.0f32)).0;
    let max = Rad::from(Deg(179.0f32)).0;
    let fovy = Rad((2.0 * spot.angle).clamp(min, max));
    let far = if spot.distance > 0.0 { spot.distance } else { SHADOW_FAR };
    OPENGL_TO_WGPU_MATRIX * perspective(fovy, 1.0, SHADOW_NEAR, far) * view
}

#[derive(Debug)]
pub struct LightResources {
    pub uniform: LightUniform,
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub bind_group_layout: wgpu::BindGroupLayout,
    pub shadow_map: Texture,
    /// Camera uniform of the shadow pass.
    pub shadow_camera: CameraUniform,
    pub shadow_buffer: wgpu::Buffer,
    pub shadow_bind_group: wgpu::BindGroup,
}

impl LightResources {
    pub fn new(
        device: &wgpu::Device,
        camera_bind_group_layout: &wgpu::BindGroupLayout,
        shadow_map_size: u32,
    ) -> Self {
        let uniform = LightUniform::default();
        let buffer = mk_buffer(device, "Light Buffer", bytemuck::cast_slice(&[uniform]));
        let bind_group_layout = mk_bind_group_layout(device);
        let shadow_map = Texture::create_shadow_map(device, shadow_map_size);
        let bind_group = mk_bind_group(device, &bind_group_layout, &buffer, &shadow_map);

        let shadow_camera = CameraUniform::new();
        let shadow_buffer = mk_buffer(
            device,
            "Shadow Camera Buffer",
            bytemuck::cast_slice(&[shadow_camera]),
        );
        let shadow_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: camera_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: shadow_buffer.as_entire_binding(),
            }],
            label: Some("shadow_camera_bind_group"),
        });

        Self {
            uniform,
            buffer,
            bind_group,
            bind_group_layout,
            shadow_map,
            shadow_camera,
            shadow_buffer,
            shadow_bind_group,
        }
    }

    pub fn shadows_enabled(&self) -> bool {
        self.uniform.spot_cone[2] > 0.5
    }

    /// Write the current uniforms to the GPU.
    pub fn upload(&mut self, queue: &wgpu::Queue) {
        self.shadow_camera.view_proj = self.uniform.light_view_proj;
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&[self.uniform]));
        queue.write_buffer(
            &self.shadow_buffer,
            0,
            bytemuck::cast_slice(&[self.shadow_camera]),
        );
    }
}

fn mk_buffer(device: &wgpu::Device, label: &str, contents: &[u8]) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    })
}

pub fn mk_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
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
                    sample_type: wgpu::TextureSampleType::Depth,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                count: None,
            },
        ],
        label: Some("light_bind_group_layout"),
    })
}

fn mk_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    buffer: &wgpu::Buffer,
    shadow_map: &Texture,
) -> wgpu::BindGroup {
    let mut entries = vec![
        wgpu::BindGroupEntry {
            binding: 0,
            resource: buffer.as_entire_binding(),
        },
        wgpu::BindGroupEntry {
            binding: 1,
            resource: wgpu::BindingResource::TextureView(&shadow_map.view),
        },
    ];
    if let Some(sampler) = &shadow_map.sampler {
        entries.push(wgpu::BindGroupEntry {
            binding: 2,
            resource: wgpu::BindingResource::Sampler(sampler),
        });
    }
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout,
        entries: &entries,
        label: Some("light_bind_group"),
    })
}

/// Depth-only pipeline rendering shadow casters from the spot light.
pub fn mk_shadow_pipeline(
    device: &wgpu::Device,
    camera_bind_group_layout: &wgpu::BindGroupLayout,
) -> wgpu::RenderPipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Shadow Pipeline Layout"),
        bind_group_layouts: &[camera_bind_group_layout],
        push_constant_ranges: &[],
    });
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Shadow Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/shadow.wgsl").into()),
    });
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        cache: None,
        label: Some("Shadow Pipeline"),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[ModelVertex::desc(), InstanceRaw::desc()],
            compilation_options: Default::default(),
        },
        fragment: None,
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: Texture::DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::LessEqual,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState {
                constant: 2,
                slope_scale: 2.0,
                clamp: 0.0,
            },
        }),
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::material::Color;
    use cgmath::Vector4;

    #[test]
    fn spot_cone_narrows_with_penumbra() {
        let mut spot = SpotLight::new(Color::WHITE);
        spot.angle = 0.2;
        let mut uniform = LightUniform::default();
        uniform.set_spot(Vector3::new(-100.0, 100.0, 0.0), &spot, true);
        assert_eq!(uniform.spot_cone[0], uniform.spot_cone[1]);
        assert!(uniform.shadows_flag());

        spot.penumbra = 0.5;
        uniform.set_spot(Vector3::new(-100.0, 100.0, 0.0), &spot, false);
        assert!(uniform.spot_cone[1] > uniform.spot_cone[0]);
        assert!(!uniform.shadows_flag());
    }

    #[test]
    fn shadow_camera_sees_the_target() {
        let mut spot = SpotLight::new(Color::WHITE);
        spot.angle = 0.2;
        let clip = spot_view_proj(Vector3::new(-100.0, 100.0, 0.0), &spot)
            * Vector4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-3 && ndc.y.abs() < 1e-3);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn scene_lights_are_collected() {
        use crate::data_structures::scene_graph::{AmbientLight, NodeTemplate};

        let mut scene = SceneGraph::new();
        scene.add(NodeTemplate::new(NodeKind::AmbientLight(AmbientLight {
            color: Color::from_hex(0x333333),
            intensity: 1.0,
        })));
        let mut spot = SpotLight::new(Color::WHITE);
        spot.cast_shadow = true;
        scene.add(NodeTemplate::new(NodeKind::SpotLight(spot)).at(-100.0, 100.0, 0.0));
        scene.fog = Some(FogExp2 {
            color: Color::WHITE,
            density: 0.01,
        });
        scene.update_world_transforms();

        let uniform = LightUniform::from_scene(&scene);
        let expected = Color::from_hex(0x333333).to_linear()[0];
        assert!((uniform.ambient[0] - expected).abs() < 1e-6);
        assert_eq!(uniform.spot_color[3], 1.0);
        assert_eq!(&uniform.spot_position[..3], &[-100.0, 100.0, 0.0]);
        assert!(uniform.shadows_flag());
        assert_eq!(uniform.fog[3], 0.01);
    }

    #[test]
    fn no_spot_light_means_no_shadows() {
        let uniform = LightUniform::from_scene(&SceneGraph::new());
        assert_eq!(uniform.spot_color, [0.0; 4]);
        assert!(!uniform.shadows_flag());
        assert_eq!(uniform.fog, [0.0; 4]);
    }

    impl LightUniform {
        fn shadows_flag(&self) -> bool {
            self.spot_cone[2] > 0.5
        }
    }
}
