//! glTF 2.0 (`.gltf` / `.glb`) model loading.
//!
//! The loader resolves buffers and images (embedded, or referenced relative
//! to the asset root) asynchronously and then converts the default scene
//! into a [`NodeTemplate`] tree, decoded images and animation clips. Node
//! templates keep the glTF node index in `source_index` so that animation
//! channels can be bound after the tree is inserted into a scene graph.

use anyhow::{Context as _, anyhow};
use cgmath::{InnerSpace, Quaternion, Vector3, Zero};
use log::{info, warn};

use crate::{
    data_structures::{
        animation::{AnimationClip, Channel, Interpolation, Keyframes},
        geometry::Geometry,
        material::{Color, Material, Side, TextureId, TextureImage},
        scene_graph::{Mesh, NodeKind, NodeTemplate},
    },
    resources::{decode_image, load_binary},
};

/// A decoded model: CPU data only, safe to send across threads.
#[derive(Clone, Debug)]
pub struct LoadedModel {
    /// Group holding the top-level nodes of the default scene.
    pub root: NodeTemplate,
    /// Images referenced by materials as `TextureId(index)`.
    pub images: Vec<TextureImage>,
    pub clips: Vec<AnimationClip>,
}

impl LoadedModel {
    /// Opacity of the first material of the second top-level node.
    pub fn second_child_opacity(&self) -> Option<f32> {
        match &self.root.children.get(1)?.kind {
            NodeKind::Mesh(mesh) => mesh.materials.first().map(|material| material.opacity),
            _ => None,
        }
    }
}

pub async fn load_model_gltf(file_name: &str) -> anyhow::Result<LoadedModel> {
    let bytes = load_binary(file_name).await?;
    let gltf = gltf::Gltf::from_slice(&bytes)
        .with_context(|| format!("cannot parse glTF {}", file_name))?;

    let mut buffers = Vec::new();
    for buffer in gltf.buffers() {
        match buffer.source() {
            gltf::buffer::Source::Bin => {
                let blob = gltf
                    .blob
                    .as_deref()
                    .ok_or_else(|| anyhow!("{} references a missing binary chunk", file_name))?;
                buffers.push(blob.to_vec());
            }
            gltf::buffer::Source::Uri(uri) => {
                buffers.push(load_binary(uri).await?);
            }
        }
    }

    let mut encoded_images = Vec::new();
    for image in gltf.images() {
        let bytes = match image.source() {
            gltf::image::Source::View { view, .. } => {
                let buffer = &buffers[view.buffer().index()];
                let start = view.offset();
                let end = start + view.length();
                buffer
                    .get(start..end)
                    .ok_or_else(|| anyhow!("image view {} is out of bounds", view.index()))?
                    .to_vec()
            }
            gltf::image::Source::Uri { uri, .. } => load_binary(uri).await?,
        };
        encoded_images.push(bytes);
    }

    let images = decode_images(file_name, &encoded_images);
    let model = build_model(&gltf.document, &buffers, images)?;
    info!(
        "Loaded {} with {} clip(s) and {} image(s)",
        file_name,
        model.clips.len(),
        model.images.len()
    );
    Ok(model)
}

/// Decode the images of `file_name`, labelled `<file_name>#image<N>`. An
/// image that fails to decode becomes a placeholder under the same label.
fn decode_images(file_name: &str, encoded: &[Vec<u8>]) -> Vec<TextureImage> {
    encoded
        .iter()
        .enumerate()
        .map(|(idx, bytes)| {
            let label = format!("{}#image{}", file_name, idx);
            decode_image(bytes, &label).unwrap_or_else(|e| {
                warn!("{:#}", e);
                TextureImage::placeholder(&label)
            })
        })
        .collect()
}

/// Convert a parsed document with resolved buffers into a [`LoadedModel`].
pub fn build_model(
    document: &gltf::Document,
    buffers: &[Vec<u8>],
    images: Vec<TextureImage>,
) -> anyhow::Result<LoadedModel> {
    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or_else(|| anyhow!("the model contains no scene"))?;

    let materials: Vec<Material> = document.materials().map(convert_material).collect();

    let mut root = NodeTemplate::new(NodeKind::Group).named(scene.name().unwrap_or("Scene"));
    for node in scene.nodes() {
        root.children.push(convert_node(&node, buffers, &materials)?);
    }

    let clips = document
        .animations()
        .enumerate()
        .map(|(idx, animation)| convert_animation(idx, &animation, buffers))
        .collect();

    Ok(LoadedModel {
        root,
        images,
        clips,
    })
}

fn srgb_from_linear(c: f32) -> f32 {
    if c <= 0.0031308 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

fn convert_material(material: gltf::Material) -> Material {
    let pbr = material.pbr_metallic_roughness();
    let [r, g, b, a] = pbr.base_color_factor();
    let mut converted = Material::standard(Color::new(
        srgb_from_linear(r),
        srgb_from_linear(g),
        srgb_from_linear(b),
    ));
    converted.opacity = a;
    converted.transparent = material.alpha_mode() == gltf::material::AlphaMode::Blend;
    if material.double_sided() {
        converted.side = Side::Double;
    }
    converted.map = pbr
        .base_color_texture()
        .map(|info| TextureId(info.texture().source().index()));
    converted
}

fn convert_node(
    node: &gltf::Node,
    buffers: &[Vec<u8>],
    materials: &[Material],
) -> anyhow::Result<NodeTemplate> {
    let mut meshes = match node.mesh() {
        Some(mesh) => mesh
            .primitives()
            .filter_map(|primitive| convert_primitive(&primitive, buffers, materials))
            .collect(),
        None => Vec::new(),
    };

    let mut template = if meshes.len() == 1 {
        NodeTemplate::mesh(meshes.remove(0))
    } else {
        let mut group = NodeTemplate::new(NodeKind::Group);
        group.children = meshes.into_iter().map(NodeTemplate::mesh).collect();
        group
    };
    template.name = node.name().unwrap_or_default().to_string();
    template.source_index = Some(node.index());

    let (translation, [x, y, z, w], scale) = node.transform().decomposed();
    template.transform.position = translation.into();
    template
        .transform
        .set_rotation_quaternion(Quaternion::new(w, x, y, z));
    template.transform.scale = scale.into();

    for child in node.children() {
        template
            .children
            .push(convert_node(&child, buffers, materials)?);
    }
    Ok(template)
}

fn convert_primitive(
    primitive: &gltf::Primitive,
    buffers: &[Vec<u8>],
    materials: &[Material],
) -> Option<Mesh> {
    if primitive.mode() != gltf::mesh::Mode::Triangles {
        warn!(
            "Skipping primitive {} with unsupported mode {:?}",
            primitive.index(),
            primitive.mode()
        );
        return None;
    }
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(Vec::as_slice));
    let Some(positions) = reader.read_positions() else {
        warn!("Skipping primitive {} without positions", primitive.index());
        return None;
    };
    let positions: Vec<[f32; 3]> = positions.collect();
    let indices: Vec<u32> = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect(),
        None => (0..positions.len() as u32).collect(),
    };
    if let Some(index) = indices.iter().find(|&&i| i as usize >= positions.len()) {
        warn!(
            "Skipping primitive {}: index {} is out of range for {} vertices",
            primitive.index(),
            index,
            positions.len()
        );
        return None;
    }
    let normals: Vec<[f32; 3]> = match reader.read_normals().map(|normals| normals.collect::<Vec<_>>()) {
        Some(normals) if normals.len() == positions.len() => normals,
        _ => vertex_normals(&positions, &indices),
    };
    let uvs: Vec<[f32; 2]> = match reader.read_tex_coords(0) {
        Some(uvs) => uvs.into_f32().collect(),
        None => vec![[0.0; 2]; positions.len()],
    };

    let geometry = Geometry::new(
        positions.into_iter().flatten().collect(),
        normals.into_iter().flatten().collect(),
        uvs.into_iter().flatten().collect(),
        indices,
    );
    let material = primitive
        .material()
        .index()
        .and_then(|idx| materials.get(idx).cloned())
        .unwrap_or_else(|| Material::standard(Color::WHITE));
    let mut mesh = Mesh::new(geometry, material);
    mesh.cast_shadow = true;
    mesh.receive_shadow = true;
    Some(mesh)
}

/// Area weighted vertex normals for primitives that come without them.
fn vertex_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
    let mut normals = vec![Vector3::zero(); positions.len()];
    for tri in indices.chunks_exact(3) {
        let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| Vector3::from(positions[i as usize]));
        let face = (b - a).cross(c - a);
        for i in tri {
            normals[*i as usize] += face;
        }
    }
    normals
        .into_iter()
        .map(|n: Vector3<f32>| {
            if n.magnitude2() > 0.0 {
                n.normalize().into()
            } else {
                [0.0, 1.0, 0.0]
            }
        })
        .collect()
}

fn convert_animation(idx: usize, animation: &gltf::Animation, buffers: &[Vec<u8>]) -> AnimationClip {
    let name = animation
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("animation_{}", idx));
    let mut channels = Vec::new();
    for channel in animation.channels() {
        let reader = channel.reader(|buffer| buffers.get(buffer.index()).map(Vec::as_slice));
        let Some(timestamps) = reader.read_inputs() else {
            warn!("No keyframe times in channel {} of {}", channel.index(), name);
            continue;
        };
        let timestamps: Vec<f32> = timestamps.collect();

        let interpolation = match channel.sampler().interpolation() {
            gltf::animation::Interpolation::Step => Interpolation::Step,
            gltf::animation::Interpolation::Linear => Interpolation::Linear,
            gltf::animation::Interpolation::CubicSpline => {
                warn!("Cubic spline channel in {} is sampled linearly", name);
                Interpolation::Linear
            }
        };
        // cubic splines store (in-tangent, value, out-tangent) per key
        let values_only = |count: usize| -> Box<dyn Fn(usize) -> bool> {
            if channel.sampler().interpolation() == gltf::animation::Interpolation::CubicSpline
                && count == timestamps.len() * 3
            {
                Box::new(|i| i % 3 == 1)
            } else {
                Box::new(|_| true)
            }
        };

        let keyframes = match reader.read_outputs() {
            Some(gltf::animation::util::ReadOutputs::Translations(values)) => {
                let values: Vec<[f32; 3]> = values.collect();
                let keep = values_only(values.len());
                Keyframes::Translation(
                    values
                        .into_iter()
                        .enumerate()
                        .filter(|(i, _)| keep(*i))
                        .map(|(_, v)| v.into())
                        .collect(),
                )
            }
            Some(gltf::animation::util::ReadOutputs::Rotations(values)) => {
                let values: Vec<[f32; 4]> = values.into_f32().collect();
                let keep = values_only(values.len());
                Keyframes::Rotation(
                    values
                        .into_iter()
                        .enumerate()
                        .filter(|(i, _)| keep(*i))
                        .map(|(_, [x, y, z, w])| Quaternion::new(w, x, y, z))
                        .collect(),
                )
            }
            Some(gltf::animation::util::ReadOutputs::Scales(values)) => {
                let values: Vec<[f32; 3]> = values.collect();
                let keep = values_only(values.len());
                Keyframes::Scale(
                    values
                        .into_iter()
                        .enumerate()
                        .filter(|(i, _)| keep(*i))
                        .map(|(_, v)| v.into())
                        .collect(),
                )
            }
            Some(gltf::animation::util::ReadOutputs::MorphTargetWeights(_)) => {
                warn!("Morph target weights in {} are not supported", name);
                Keyframes::Other
            }
            None => {
                warn!("No keyframes found in channel {} of {}", channel.index(), name);
                Keyframes::Other
            }
        };

        channels.push(Channel {
            target: channel.target().node().index(),
            timestamps,
            keyframes,
            interpolation,
        });
    }
    AnimationClip::new(&name, channels)
}
