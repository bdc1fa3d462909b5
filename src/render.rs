//! Render composition and the GPU mirror of a scene graph.
//!
//! Flows describe what to draw with the [`Render`] enum. The engine sorts
//! the renders of all flows into [`Batches`] (sky, opaque, transparent,
//! lines, overlay) and draws each batch with its pipeline.
//!
//! [`SceneRenderer`] keeps GPU buffers in sync with a [`SceneGraph`]: it
//! creates vertex, index, instance and material resources on first sight of
//! a node and re-uploads vertex data when an attribute version changes.
//!
//! # Key types
//!
//! - [`Render<'a>`] is the primary enum describing render operations
//! - [`Instanced<'a>`] is one indexed draw of a mesh with its shading
//! - [`Flat<'a>`] contains screen-space overlay geometry

use std::{
    collections::{BTreeMap, HashMap},
    ops::Range,
    sync::Arc,
};

use cgmath::{MetricSpace, Point3, Vector3};
use log::{debug, warn};
use wgpu::util::DeviceExt;

use crate::{
    context::{Context, InitContext},
    data_structures::{
        geometry::{Geometry, Group, Lines},
        instance::Instance,
        material::{Material, ShaderSource, Shading, TextureId, TextureImage},
        model::{LineVertex, ModelVertex},
        scene_graph::{Background, Mesh, NodeId, NodeKind, SceneGraph},
        texture::Texture,
    },
    panel::Panel,
    pipelines::{MeshPipelineKey, basic::MaterialUniform, custom::mk_custom_pipeline, skybox},
};

/// How an [`Instanced`] draw is shaded.
#[derive(Clone, Copy)]
pub enum Shade<'a> {
    /// Built-in mesh pipeline selected by key, with the material bind group.
    Mesh(MeshPipelineKey, &'a wgpu::BindGroup),
    /// Pipeline built from user supplied shader stages.
    Custom(&'a wgpu::RenderPipeline),
}

/// One indexed draw of a mesh (or of one material group of it).
#[derive(Clone)]
pub struct Instanced<'a> {
    pub vertex: &'a wgpu::Buffer,
    pub index: &'a wgpu::Buffer,
    pub indices: Range<u32>,
    pub instance: &'a wgpu::Buffer,
    pub shade: Shade<'a>,
    pub cast_shadow: bool,
    /// World position, used to order transparent draws.
    pub position: Vector3<f32>,
}

impl Instanced<'_> {
    /// Wireframe draws use a line list and are not rendered into the shadow map.
    pub fn is_wireframe(&self) -> bool {
        matches!(self.shade, Shade::Mesh(key, _) if key.wireframe)
    }
}

/// Coloured line segments drawn with the line pipeline.
#[derive(Clone)]
pub struct Segments<'a> {
    pub vertex: &'a wgpu::Buffer,
    pub instance: &'a wgpu::Buffer,
    pub amount: u32,
}

/// Screen-space overlay geometry in normalized device coordinates.
#[derive(Clone)]
pub struct Flat<'a> {
    pub vertex: &'a wgpu::Buffer,
    pub index: &'a wgpu::Buffer,
    pub amount: u32,
}

/// Cube map background.
#[derive(Clone)]
pub struct Sky<'a> {
    pub group: &'a wgpu::BindGroup,
}

/// Specifies how a flow should be rendered.
///
/// # Variants
///
/// - `None` renders nothing
/// - `Sky(Sky)` sets the background cube map
/// - `Default(Instanced)` renders a single opaque draw
/// - `Defaults(Vec<Instanced>)` renders a batch of opaque draws
/// - `Transparent(Instanced)` renders a single blended draw
/// - `Transparents(Vec<Instanced>)` renders a batch of blended draws, far to near
/// - `Lines(Vec<Segments>)` renders helper lines
/// - `GUI(Flat)` renders 2D elements on top of everything
/// - `Composed(Vec<Render>)` recursively renders a composition of renders
pub enum Render<'a> {
    None,
    Sky(Sky<'a>),
    Default(Instanced<'a>),
    Defaults(Vec<Instanced<'a>>),
    Transparent(Instanced<'a>),
    Transparents(Vec<Instanced<'a>>),
    Lines(Vec<Segments<'a>>),
    GUI(Flat<'a>),
    Composed(Vec<Render<'a>>),
}

/// Renders of all flows sorted by pipeline.
#[derive(Default)]
pub(crate) struct Batches<'a> {
    pub sky: Option<Sky<'a>>,
    pub opaque: Vec<Instanced<'a>>,
    pub transparent: Vec<Instanced<'a>>,
    pub lines: Vec<Segments<'a>>,
    pub guis: Vec<Flat<'a>>,
}

impl<'a> Batches<'a> {
    /// Order transparent draws back to front as seen from `eye`.
    pub fn sort_transparent(&mut self, eye: Point3<f32>) {
        far_to_near(eye, &mut self.transparent, |instanced| instanced.position);
    }

    pub fn shadow_casters(&self) -> impl Iterator<Item = &Instanced<'a>> {
        self.opaque
            .iter()
            .chain(self.transparent.iter())
            .filter(|instanced| instanced.cast_shadow && !instanced.is_wireframe())
    }
}

fn far_to_near<T>(eye: Point3<f32>, items: &mut [T], position: impl Fn(&T) -> Vector3<f32>) {
    let distance = |item: &T| {
        let p = position(item);
        eye.distance2(Point3::new(p.x, p.y, p.z))
    };
    items.sort_by(|a, b| distance(b).total_cmp(&distance(a)));
}

impl<'a> Render<'a> {
    pub(crate) fn set_pipelines(self, batches: &mut Batches<'a>) {
        match self {
            Render::Sky(sky) => {
                if batches.sky.replace(sky).is_some() {
                    warn!("More than one sky was rendered this frame, the last one wins.");
                }
            }
            Render::Default(instanced) => batches.opaque.push(instanced),
            Render::Defaults(mut vec) => batches.opaque.append(&mut vec),
            Render::Transparent(instanced) => batches.transparent.push(instanced),
            Render::Transparents(mut vec) => batches.transparent.append(&mut vec),
            Render::Lines(mut vec) => batches.lines.append(&mut vec),
            Render::GUI(flat) => batches.guis.push(flat),
            Render::Composed(renders) => renders
                .into_iter()
                .for_each(|render| render.set_pipelines(batches)),
            Render::None => (),
        }
    }
}

/// Identity of a custom shader pair, stable while its `Arc` lives.
fn shader_key(source: &Arc<ShaderSource>) -> usize {
    Arc::as_ptr(source) as usize
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum MaterialShade {
    Mesh(MeshPipelineKey),
    Custom(usize),
}

fn material_shade(material: &Material) -> MaterialShade {
    match &material.shading {
        Shading::Shader(source) => MaterialShade::Custom(shader_key(source)),
        Shading::Basic | Shading::Standard => MaterialShade::Mesh(MeshPipelineKey {
            side: material.side,
            blended: material.is_blended(),
            wireframe: material.wireframe,
        }),
    }
}

struct GpuMaterial {
    shade: MaterialShade,
    blended: bool,
    map: Option<TextureId>,
    uniform: MaterialUniform,
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

struct GpuMesh {
    vertex: wgpu::Buffer,
    vertex_count: usize,
    /// Versions of position, normal and uv as uploaded.
    versions: [u32; 3],
    index: wgpu::Buffer,
    wire_index: wgpu::Buffer,
    index_count: usize,
    groups: Vec<Group>,
    materials: Vec<GpuMaterial>,
    instance: wgpu::Buffer,
    cast_shadow: bool,
    position: Vector3<f32>,
}

struct GpuLines {
    vertex: wgpu::Buffer,
    amount: u32,
    version: u32,
    instance: wgpu::Buffer,
}

struct GpuSky {
    faces: [TextureId; 6],
    group: wgpu::BindGroup,
}

struct GpuOverlay {
    version: u32,
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    amount: u32,
}

fn attribute_versions(geometry: &Geometry) -> [u32; 3] {
    [
        geometry.position.version(),
        geometry.normal.version(),
        geometry.uv.version(),
    ]
}

fn mk_buffer(device: &wgpu::Device, label: &str, contents: &[u8], usage: wgpu::BufferUsages) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents,
        usage: usage | wgpu::BufferUsages::COPY_DST,
    })
}

fn mk_instance_buffer(device: &wgpu::Device, world: &Instance) -> wgpu::Buffer {
    mk_buffer(
        device,
        "Instance Buffer",
        bytemuck::cast_slice(&[world.to_raw()]),
        wgpu::BufferUsages::VERTEX,
    )
}

/// GPU resources of every mesh, helper and texture of one scene graph.
pub struct SceneRenderer {
    white: Texture,
    textures: HashMap<TextureId, Texture>,
    meshes: BTreeMap<NodeId, GpuMesh>,
    lines: BTreeMap<NodeId, GpuLines>,
    custom_pipelines: HashMap<usize, wgpu::RenderPipeline>,
    sky: Option<GpuSky>,
    overlay: Option<GpuOverlay>,
    /// Visible drawable nodes of the last `prepare`, depth first.
    visible: Vec<NodeId>,
}

impl SceneRenderer {
    pub fn new(ctx: &InitContext) -> Self {
        Self {
            white: Texture::from_image(&ctx.device, &ctx.queue, &TextureImage::placeholder("white")),
            textures: HashMap::new(),
            meshes: BTreeMap::new(),
            lines: BTreeMap::new(),
            custom_pipelines: HashMap::new(),
            sky: None,
            overlay: None,
            visible: Vec::new(),
        }
    }

    /// Bring the GPU mirror up to date with `scene`. Call once per frame
    /// after world transforms were updated.
    pub fn prepare(&mut self, ctx: &Context, scene: &SceneGraph) {
        self.prepare_sky(ctx, scene);
        self.visible.clear();
        let fog = scene.fog.is_some();

        for node in scene.visible_nodes() {
            match &node.kind {
                NodeKind::Mesh(mesh) => {
                    mesh.materials
                        .iter()
                        .filter_map(|material| material.map)
                        .for_each(|id| self.upload_texture(ctx, scene, id));
                    self.prepare_custom_pipelines(ctx, mesh);
                    self.prepare_mesh(ctx, node.id(), mesh, node.world(), fog);
                    self.visible.push(node.id());
                }
                NodeKind::Lines(lines) => {
                    self.prepare_lines(ctx, node.id(), lines, node.world());
                    self.visible.push(node.id());
                }
                NodeKind::SpotLightHelper(helper) => {
                    self.prepare_lines(ctx, node.id(), &helper.cone, node.world());
                    self.visible.push(node.id());
                }
                NodeKind::Group | NodeKind::AmbientLight(_) | NodeKind::SpotLight(_) => (),
            }
        }

        self.meshes.retain(|id, _| scene.node(*id).is_some());
        self.lines.retain(|id, _| scene.node(*id).is_some());
    }

    /// Re-upload the overlay geometry when the panel changed.
    pub fn prepare_overlay(&mut self, ctx: &Context, panel: &Panel) {
        if self
            .overlay
            .as_ref()
            .is_some_and(|overlay| overlay.version == panel.version())
        {
            return;
        }
        let (vertices, indices) = panel.vertices();
        self.overlay = Some(GpuOverlay {
            version: panel.version(),
            vertex: mk_buffer(
                &ctx.device,
                "Panel Vertex Buffer",
                bytemuck::cast_slice(&vertices),
                wgpu::BufferUsages::VERTEX,
            ),
            index: mk_buffer(
                &ctx.device,
                "Panel Index Buffer",
                bytemuck::cast_slice(&indices),
                wgpu::BufferUsages::INDEX,
            ),
            amount: indices.len() as u32,
        });
    }

    fn prepare_sky(&mut self, ctx: &Context, scene: &SceneGraph) {
        let Background::CubeMap(faces) = &scene.background else {
            self.sky = None;
            return;
        };
        if self.sky.as_ref().is_some_and(|sky| sky.faces == *faces) {
            return;
        }
        let placeholder = TextureImage::placeholder("missing sky face");
        let images = (*faces).map(|id| scene.texture(id).unwrap_or(&placeholder));
        let texture = Texture::from_cube_faces(&ctx.device, &ctx.queue, images, "skybox");
        self.sky = skybox::mk_bind_group(&ctx.device, &ctx.pipelines.skybox_layout, &texture)
            .map(|group| GpuSky {
                faces: *faces,
                group,
            });
    }

    fn upload_texture(&mut self, ctx: &Context, scene: &SceneGraph, id: TextureId) {
        if self.textures.contains_key(&id) {
            return;
        }
        match scene.texture(id) {
            Some(image) => {
                debug!("Uploading texture {}", image.label);
                self.textures
                    .insert(id, Texture::from_image(&ctx.device, &ctx.queue, image));
            }
            None => warn!("Texture {:?} is not part of the scene, drawing white.", id),
        }
    }

    fn prepare_custom_pipelines(&mut self, ctx: &Context, mesh: &Mesh) {
        for material in &mesh.materials {
            if let Shading::Shader(source) = &material.shading {
                self.custom_pipelines
                    .entry(shader_key(source))
                    .or_insert_with(|| {
                        mk_custom_pipeline(
                            &ctx.device,
                            ctx.config.format,
                            &ctx.camera.bind_group_layout,
                            source,
                        )
                    });
            }
        }
    }

    fn mk_material(&self, ctx: &Context, material: &Material, uniform: MaterialUniform) -> GpuMaterial {
        let buffer = mk_buffer(
            &ctx.device,
            "Material Buffer",
            bytemuck::cast_slice(&[uniform]),
            wgpu::BufferUsages::UNIFORM,
        );
        let texture = material
            .map
            .and_then(|id| self.textures.get(&id))
            .unwrap_or(&self.white);
        let sampler = texture.sampler.as_ref().or(self.white.sampler.as_ref());
        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&texture.view),
            },
        ];
        if let Some(sampler) = sampler {
            entries.push(wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &ctx.pipelines.material_layout,
            entries: &entries,
            label: Some("material_bind_group"),
        });
        GpuMaterial {
            shade: material_shade(material),
            blended: material.is_blended(),
            map: material.map,
            uniform,
            buffer,
            bind_group,
        }
    }

    fn prepare_mesh(&mut self, ctx: &Context, id: NodeId, mesh: &Mesh, world: &Instance, fog: bool) {
        let geometry = &mesh.geometry;
        let uniforms: Vec<MaterialUniform> = mesh
            .materials
            .iter()
            .map(|material| MaterialUniform::new(material, mesh.receive_shadow, fog))
            .collect();

        let Some(gpu) = self.meshes.get_mut(&id) else {
            let materials = mesh
                .materials
                .iter()
                .zip(uniforms)
                .map(|(material, uniform)| self.mk_material(ctx, material, uniform))
                .collect();
            let gpu = GpuMesh {
                vertex: mk_buffer(
                    &ctx.device,
                    "Vertex Buffer",
                    bytemuck::cast_slice(&ModelVertex::interleave(geometry)),
                    wgpu::BufferUsages::VERTEX,
                ),
                vertex_count: geometry.vertex_count(),
                versions: attribute_versions(geometry),
                index: mk_buffer(
                    &ctx.device,
                    "Index Buffer",
                    bytemuck::cast_slice(&geometry.indices),
                    wgpu::BufferUsages::INDEX,
                ),
                wire_index: mk_buffer(
                    &ctx.device,
                    "Wireframe Index Buffer",
                    bytemuck::cast_slice(&geometry.wireframe_indices()),
                    wgpu::BufferUsages::INDEX,
                ),
                index_count: geometry.indices.len(),
                groups: geometry.draw_groups(),
                materials,
                instance: mk_instance_buffer(&ctx.device, world),
                cast_shadow: mesh.cast_shadow,
                position: world.position,
            };
            self.meshes.insert(id, gpu);
            return;
        };

        if gpu.versions != attribute_versions(geometry) {
            let vertices = ModelVertex::interleave(geometry);
            if gpu.vertex_count == geometry.vertex_count() {
                ctx.queue
                    .write_buffer(&gpu.vertex, 0, bytemuck::cast_slice(&vertices));
            } else {
                gpu.vertex = mk_buffer(
                    &ctx.device,
                    "Vertex Buffer",
                    bytemuck::cast_slice(&vertices),
                    wgpu::BufferUsages::VERTEX,
                );
                gpu.vertex_count = geometry.vertex_count();
            }
            gpu.versions = attribute_versions(geometry);
        }
        if gpu.index_count != geometry.indices.len() {
            gpu.index = mk_buffer(
                &ctx.device,
                "Index Buffer",
                bytemuck::cast_slice(&geometry.indices),
                wgpu::BufferUsages::INDEX,
            );
            gpu.wire_index = mk_buffer(
                &ctx.device,
                "Wireframe Index Buffer",
                bytemuck::cast_slice(&geometry.wireframe_indices()),
                wgpu::BufferUsages::INDEX,
            );
            gpu.index_count = geometry.indices.len();
            gpu.groups = geometry.draw_groups();
        }

        ctx.queue
            .write_buffer(&gpu.instance, 0, bytemuck::cast_slice(&[world.to_raw()]));
        gpu.cast_shadow = mesh.cast_shadow;
        gpu.position = world.position;

        let rebuild = gpu.materials.len() != mesh.materials.len()
            || gpu
                .materials
                .iter()
                .zip(&mesh.materials)
                .any(|(gpu, material)| gpu.map != material.map);
        if rebuild {
            let materials = mesh
                .materials
                .iter()
                .zip(uniforms)
                .map(|(material, uniform)| self.mk_material(ctx, material, uniform))
                .collect();
            if let Some(gpu) = self.meshes.get_mut(&id) {
                gpu.materials = materials;
            }
            return;
        }
        for ((gpu, material), uniform) in gpu.materials.iter_mut().zip(&mesh.materials).zip(uniforms) {
            gpu.shade = material_shade(material);
            gpu.blended = material.is_blended();
            if gpu.uniform != uniform {
                ctx.queue
                    .write_buffer(&gpu.buffer, 0, bytemuck::cast_slice(&[uniform]));
                gpu.uniform = uniform;
            }
        }
    }

    fn prepare_lines(&mut self, ctx: &Context, id: NodeId, lines: &Lines, world: &Instance) {
        match self.lines.get_mut(&id) {
            Some(gpu) => {
                if gpu.version != lines.version() || gpu.amount as usize != lines.positions.len() {
                    gpu.vertex = mk_buffer(
                        &ctx.device,
                        "Line Vertex Buffer",
                        bytemuck::cast_slice(&LineVertex::from_lines(lines)),
                        wgpu::BufferUsages::VERTEX,
                    );
                    gpu.amount = lines.positions.len() as u32;
                    gpu.version = lines.version();
                }
                ctx.queue
                    .write_buffer(&gpu.instance, 0, bytemuck::cast_slice(&[world.to_raw()]));
            }
            None => {
                self.lines.insert(
                    id,
                    GpuLines {
                        vertex: mk_buffer(
                            &ctx.device,
                            "Line Vertex Buffer",
                            bytemuck::cast_slice(&LineVertex::from_lines(lines)),
                            wgpu::BufferUsages::VERTEX,
                        ),
                        amount: lines.positions.len() as u32,
                        version: lines.version(),
                        instance: mk_instance_buffer(&ctx.device, world),
                    },
                );
            }
        }
    }

    fn draws<'a>(&'a self, gpu: &'a GpuMesh, opaque: &mut Vec<Instanced<'a>>, transparent: &mut Vec<Instanced<'a>>) {
        for group in &gpu.groups {
            let Some(material) = gpu
                .materials
                .get(group.material_index)
                .or_else(|| gpu.materials.first())
            else {
                continue;
            };
            let (shade, index, indices) = match material.shade {
                MaterialShade::Mesh(key) if key.wireframe => (
                    Shade::Mesh(key, &material.bind_group),
                    &gpu.wire_index,
                    group.start * 2..(group.start + group.count) * 2,
                ),
                MaterialShade::Mesh(key) => (
                    Shade::Mesh(key, &material.bind_group),
                    &gpu.index,
                    group.start..group.start + group.count,
                ),
                MaterialShade::Custom(key) => match self.custom_pipelines.get(&key) {
                    Some(pipeline) => (
                        Shade::Custom(pipeline),
                        &gpu.index,
                        group.start..group.start + group.count,
                    ),
                    None => continue,
                },
            };
            let instanced = Instanced {
                vertex: &gpu.vertex,
                index,
                indices,
                instance: &gpu.instance,
                shade,
                cast_shadow: gpu.cast_shadow,
                position: gpu.position,
            };
            if material.blended {
                transparent.push(instanced);
            } else {
                opaque.push(instanced);
            }
        }
    }

    /// Everything prepared for this frame, ready to be returned from `on_render`.
    pub fn render(&self) -> Render<'_> {
        let mut opaque = Vec::new();
        let mut transparent = Vec::new();
        let mut lines = Vec::new();
        for id in &self.visible {
            if let Some(gpu) = self.meshes.get(id) {
                self.draws(gpu, &mut opaque, &mut transparent);
            } else if let Some(gpu) = self.lines.get(id) {
                lines.push(Segments {
                    vertex: &gpu.vertex,
                    instance: &gpu.instance,
                    amount: gpu.amount,
                });
            }
        }

        let mut renders = Vec::with_capacity(5);
        if let Some(sky) = &self.sky {
            renders.push(Render::Sky(Sky { group: &sky.group }));
        }
        renders.push(Render::Defaults(opaque));
        renders.push(Render::Transparents(transparent));
        renders.push(Render::Lines(lines));
        if let Some(overlay) = &self.overlay {
            renders.push(Render::GUI(Flat {
                vertex: &overlay.vertex,
                index: &overlay.index,
                amount: overlay.amount,
            }));
        }
        Render::Composed(renders)
    }
}

impl<'a> From<&'a SceneRenderer> for Render<'a> {
    fn from(renderer: &'a SceneRenderer) -> Self {
        renderer.render()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::material::{Color, Side};

    #[test]
    fn transparent_draws_are_ordered_back_to_front() {
        let mut items = vec![
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(0.0, 0.0, 10.0),
            Vector3::new(0.0, 0.0, 5.0),
        ];
        far_to_near(Point3::new(0.0, 0.0, 0.0), &mut items, |p| *p);
        assert_eq!(items[0].z, 10.0);
        assert_eq!(items[1].z, 5.0);
        assert_eq!(items[2].z, 1.0);
    }

    #[test]
    fn material_shade_selects_pipeline_variant() {
        let material = Material::standard(Color::WHITE)
            .with_side(Side::Double)
            .with_wireframe(true);
        assert_eq!(
            material_shade(&material),
            MaterialShade::Mesh(MeshPipelineKey {
                side: Side::Double,
                blended: false,
                wireframe: true,
            })
        );

        let mut glass = Material::basic(Color::WHITE);
        glass.transparent = true;
        glass.opacity = 0.5;
        assert!(matches!(
            material_shade(&glass),
            MaterialShade::Mesh(MeshPipelineKey { blended: true, .. })
        ));
    }

    #[test]
    fn custom_shaders_are_keyed_by_identity() {
        let source = Arc::new(ShaderSource {
            vertex: String::new(),
            fragment: String::new(),
        });
        let a = Material::shader(source.clone());
        let b = Material::shader(source);
        let other = Material::shader(Arc::new(ShaderSource {
            vertex: String::new(),
            fragment: String::new(),
        }));
        assert_eq!(material_shade(&a), material_shade(&b));
        assert_ne!(material_shade(&a), material_shade(&other));
    }
}
