//! Scene graph and hierarchical scene organization.
//!
//! The graph is an arena of [`SceneNode`]s keyed by [`NodeId`]. Ids are
//! handed out in insertion order and never reused, which makes them usable
//! as stable identity handles (the frame loop compares picked nodes against
//! a remembered id). Every node is owned by exactly one parent; the root is
//! created with the graph and cannot be removed.
//!
//! Nodes are described by [`NodeTemplate`]s, which may nest. The glTF
//! loader produces templates on a worker and the graph turns them into
//! live nodes on the event-loop thread.

use std::collections::{BTreeMap, HashMap};

use cgmath::{InnerSpace, Rotation3, Vector3};
use log::warn;

use crate::data_structures::{
    geometry::{Geometry, Lines},
    instance::{Instance, Transform},
    material::{Color, Material, TextureId, TextureImage},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn raw(&self) -> u32 {
        self.0
    }
}

#[derive(Clone, Debug)]
pub struct Mesh {
    pub geometry: Geometry,
    /// One material, or one per geometry group.
    pub materials: Vec<Material>,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
}

impl Mesh {
    pub fn new(geometry: Geometry, material: Material) -> Self {
        Self::with_materials(geometry, vec![material])
    }

    pub fn with_materials(geometry: Geometry, materials: Vec<Material>) -> Self {
        Self {
            geometry,
            materials,
            cast_shadow: false,
            receive_shadow: false,
        }
    }

    /// Material used for a geometry group, falling back to the first one.
    pub fn material_for(&self, material_index: usize) -> Option<&Material> {
        self.materials
            .get(material_index)
            .or_else(|| self.materials.first())
    }
}

#[derive(Clone, Debug)]
pub struct AmbientLight {
    pub color: Color,
    pub intensity: f32,
}

#[derive(Clone, Debug)]
pub struct SpotLight {
    pub color: Color,
    pub intensity: f32,
    /// Half-angle of the cone in radians.
    pub angle: f32,
    /// Fraction of the cone that fades out, in `[0, 1]`.
    pub penumbra: f32,
    /// Range of the light; zero means unlimited.
    pub distance: f32,
    pub decay: f32,
    pub cast_shadow: bool,
    /// World-space point the light aims at.
    pub target: Vector3<f32>,
}

impl SpotLight {
    pub fn new(color: Color) -> Self {
        Self {
            color,
            intensity: 1.0,
            angle: std::f32::consts::FRAC_PI_3,
            penumbra: 0.0,
            distance: 0.0,
            decay: 2.0,
            cast_shadow: false,
            target: Vector3::new(0.0, 0.0, 0.0),
        }
    }
}

/// Wireframe cone that mirrors a spot light once [`SceneGraph::update_spot_light_helper`] runs.
#[derive(Clone, Debug)]
pub struct SpotLightHelper {
    pub light: NodeId,
    pub cone: Lines,
}

#[derive(Clone, Debug)]
pub enum NodeKind {
    Group,
    Mesh(Mesh),
    Lines(Lines),
    AmbientLight(AmbientLight),
    SpotLight(SpotLight),
    SpotLightHelper(SpotLightHelper),
}

/// Description of a node (and its subtree) that is not part of a graph yet.
#[derive(Clone, Debug)]
pub struct NodeTemplate {
    pub name: String,
    pub transform: Transform,
    pub kind: NodeKind,
    pub children: Vec<NodeTemplate>,
    /// Index of the node in the file it was loaded from, if any.
    pub source_index: Option<usize>,
}

impl NodeTemplate {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            name: String::new(),
            transform: Transform::new(),
            kind,
            children: Vec::new(),
            source_index: None,
        }
    }

    pub fn mesh(mesh: Mesh) -> Self {
        Self::new(NodeKind::Mesh(mesh))
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn at(mut self, x: f32, y: f32, z: f32) -> Self {
        self.transform.position = Vector3::new(x, y, z);
        self
    }

    pub fn with_child(mut self, child: NodeTemplate) -> Self {
        self.children.push(child);
        self
    }

    /// Visit this template and its descendants depth first.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a NodeTemplate)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    fn walk_mut(&mut self, visit: &mut dyn FnMut(&mut NodeTemplate)) {
        visit(self);
        for child in &mut self.children {
            child.walk_mut(visit);
        }
    }
}

#[derive(Clone, Debug)]
pub struct SceneNode {
    id: NodeId,
    pub name: String,
    pub transform: Transform,
    pub visible: bool,
    pub kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    world: Instance,
}

impl SceneNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// World transform as of the last [`SceneGraph::update_world_transforms`].
    pub fn world(&self) -> &Instance {
        &self.world
    }

    pub fn as_mesh(&self) -> Option<&Mesh> {
        match &self.kind {
            NodeKind::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }

    pub fn as_mesh_mut(&mut self) -> Option<&mut Mesh> {
        match &mut self.kind {
            NodeKind::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }
}

/// Exponential squared fog.
#[derive(Clone, Debug, PartialEq)]
pub struct FogExp2 {
    pub color: Color,
    pub density: f32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum Background {
    #[default]
    None,
    /// Faces in the order +X, -X, +Y, -Y, +Z, -Z.
    CubeMap([TextureId; 6]),
}

#[derive(Debug)]
pub struct SceneGraph {
    nodes: BTreeMap<NodeId, SceneNode>,
    root: NodeId,
    next_id: u32,
    textures: Vec<TextureImage>,
    pub background: Background,
    pub fog: Option<FogExp2>,
}

impl SceneGraph {
    pub fn new() -> Self {
        let root = NodeId(0);
        let mut nodes = BTreeMap::new();
        nodes.insert(
            root,
            SceneNode {
                id: root,
                name: "Scene".to_string(),
                transform: Transform::new(),
                visible: true,
                kind: NodeKind::Group,
                parent: None,
                children: Vec::new(),
                world: Instance::new(),
            },
        );
        Self {
            nodes,
            root,
            next_id: 1,
            textures: Vec::new(),
            background: Background::None,
            fog: None,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Insert a template (and its subtree) under the root.
    pub fn add(&mut self, template: NodeTemplate) -> NodeId {
        self.add_child(self.root, template)
    }

    /// Insert a template under `parent`. Falls back to the root if `parent`
    /// is unknown.
    pub fn add_child(&mut self, parent: NodeId, template: NodeTemplate) -> NodeId {
        self.add_tracked(parent, template).0
    }

    /// Like [`add_child`](Self::add_child), additionally returning the ids
    /// assigned to templates that carry a `source_index`.
    pub fn add_tracked(
        &mut self,
        parent: NodeId,
        template: NodeTemplate,
    ) -> (NodeId, HashMap<usize, NodeId>) {
        let parent = if self.nodes.contains_key(&parent) {
            parent
        } else {
            warn!("Parent {:?} does not exist, attaching to the scene root.", parent);
            self.root
        };
        let mut by_source = HashMap::new();
        let id = self.insert(parent, template, &mut by_source);
        (id, by_source)
    }

    fn insert(
        &mut self,
        parent: NodeId,
        template: NodeTemplate,
        by_source: &mut HashMap<usize, NodeId>,
    ) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        if let Some(source) = template.source_index {
            by_source.insert(source, id);
        }
        self.nodes.insert(
            id,
            SceneNode {
                id,
                name: template.name,
                transform: template.transform,
                visible: true,
                kind: template.kind,
                parent: Some(parent),
                children: Vec::new(),
                world: Instance::new(),
            },
        );
        if let Some(parent) = self.nodes.get_mut(&parent) {
            parent.children.push(id);
        }
        for child in template.children {
            self.insert(id, child, by_source);
        }
        id
    }

    /// Insert a subtree whose materials reference `images` by local index
    /// (`TextureId(0)` is `images[0]`). The images are appended to the
    /// texture table and the references rewritten.
    pub fn add_with_textures(
        &mut self,
        parent: NodeId,
        mut template: NodeTemplate,
        images: Vec<TextureImage>,
    ) -> (NodeId, HashMap<usize, NodeId>) {
        let base = self.textures.len();
        self.textures.extend(images);
        template.walk_mut(&mut |node| {
            if let NodeKind::Mesh(mesh) = &mut node.kind {
                mesh.materials.iter_mut().for_each(|material| {
                    if let Some(TextureId(local)) = material.map {
                        material.map = Some(TextureId(base + local));
                    }
                });
            }
        });
        self.add_tracked(parent, template)
    }

    /// Detach and drop a node with its subtree. The root cannot be removed.
    pub fn remove(&mut self, id: NodeId) -> bool {
        if id == self.root || !self.nodes.contains_key(&id) {
            return false;
        }
        let doomed = self.subtree(id);
        if let Some(parent) = self.nodes[&id].parent {
            if let Some(parent) = self.nodes.get_mut(&parent) {
                parent.children.retain(|child| *child != id);
            }
        }
        doomed.into_iter().for_each(|node| {
            self.nodes.remove(&node);
        });
        true
    }

    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(&id)
    }

    pub fn mesh(&self, id: NodeId) -> Option<&Mesh> {
        self.node(id).and_then(SceneNode::as_mesh)
    }

    pub fn mesh_mut(&mut self, id: NodeId) -> Option<&mut Mesh> {
        self.node_mut(id).and_then(SceneNode::as_mesh_mut)
    }

    pub fn spot_light_mut(&mut self, id: NodeId) -> Option<&mut SpotLight> {
        match self.node_mut(id).map(|node| &mut node.kind) {
            Some(NodeKind::SpotLight(light)) => Some(light),
            _ => None,
        }
    }

    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .find(|id| self.nodes[id].name == name)
    }

    /// `id` followed by all of its descendants, depth first.
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes.get(&next) {
                out.push(next);
                // reversed so that children come out in insertion order
                stack.extend(node.children.iter().rev());
            }
        }
        out
    }

    /// All descendants of `id` (excluding `id` itself), depth first.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut nodes = self.subtree(id);
        if !nodes.is_empty() {
            nodes.remove(0);
        }
        nodes
    }

    /// Nodes that are visible along their whole ancestry, depth first.
    pub fn visible_nodes(&self) -> Vec<&SceneNode> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes.get(&next) {
                if !node.visible {
                    continue;
                }
                out.push(node);
                stack.extend(node.children.iter().rev());
            }
        }
        out
    }

    /// Recompute every world transform from the local transforms.
    pub fn update_world_transforms(&mut self) {
        let mut stack = vec![(self.root, Instance::new())];
        while let Some((id, parent_world)) = stack.pop() {
            let Some(node) = self.nodes.get_mut(&id) else {
                continue;
            };
            let world = &parent_world * &node.transform.to_instance();
            node.world = world.clone();
            stack.extend(node.children.iter().map(|child| (*child, world.clone())));
        }
    }

    /// Re-aim and rescale a spot light helper so it matches its light.
    pub fn update_spot_light_helper(&mut self, helper: NodeId) {
        let Some(NodeKind::SpotLightHelper(SpotLightHelper { light, .. })) =
            self.node(helper).map(|node| &node.kind)
        else {
            warn!("Node {:?} is not a spot light helper.", helper);
            return;
        };
        let light_id = *light;
        let Some((origin, spot)) = self.node(light_id).and_then(|node| match &node.kind {
            NodeKind::SpotLight(spot) => Some((node.world.position, spot.clone())),
            _ => None,
        }) else {
            warn!("Spot light helper {:?} lost its light {:?}.", helper, light_id);
            return;
        };

        let length = if spot.distance > 0.0 { spot.distance } else { 1000.0 };
        let width = length * spot.angle.tan();
        let direction = spot.target - origin;
        let rotation = if direction.magnitude2() > f32::EPSILON {
            cgmath::Quaternion::from_arc(Vector3::unit_z(), direction.normalize(), None)
        } else {
            cgmath::Quaternion::from_angle_x(cgmath::Rad(0.0))
        };

        let Some(node) = self.nodes.get_mut(&helper) else {
            return;
        };
        node.transform.position = origin;
        node.transform.set_rotation_quaternion(rotation);
        node.transform.scale = Vector3::new(width, width, length);
        if let NodeKind::SpotLightHelper(helper) = &mut node.kind {
            let color = [spot.color.r, spot.color.g, spot.color.b];
            if helper.cone.colors.first() != Some(&color) {
                helper.cone.set_color(spot.color);
                helper.cone.set_needs_update();
            }
        }
    }

    pub fn add_texture(&mut self, image: TextureImage) -> TextureId {
        self.textures.push(image);
        TextureId(self.textures.len() - 1)
    }

    pub fn texture(&self, id: TextureId) -> Option<&TextureImage> {
        self.textures.get(id.0)
    }
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::material::Material;

    fn cube() -> NodeTemplate {
        NodeTemplate::mesh(Mesh::new(
            Geometry::cuboid(1.0, 1.0, 1.0),
            Material::basic(Color::WHITE),
        ))
    }

    #[test]
    fn ids_are_stable_and_unique() {
        let mut scene = SceneGraph::new();
        let a = scene.add(cube());
        let b = scene.add(cube().named("b"));
        assert_ne!(a, b);
        assert!(scene.remove(a));
        let c = scene.add(cube());
        assert_ne!(a, c);
        assert_eq!(scene.find_by_name("b"), Some(b));
        assert!(scene.node(a).is_none());
    }

    #[test]
    fn world_transforms_follow_parents() {
        let mut scene = SceneGraph::new();
        let parent = scene.add(
            NodeTemplate::new(NodeKind::Group)
                .at(1.0, 2.0, 3.0)
                .with_child(cube().at(1.0, 0.0, 0.0).named("child")),
        );
        scene.update_world_transforms();
        let child = scene.find_by_name("child").unwrap();
        assert_eq!(scene.node(child).unwrap().parent(), Some(parent));
        assert_eq!(
            scene.node(child).unwrap().world().position,
            Vector3::new(2.0, 2.0, 3.0)
        );
    }

    #[test]
    fn removal_drops_subtree_but_not_root() {
        let mut scene = SceneGraph::new();
        let parent = scene.add(NodeTemplate::new(NodeKind::Group).with_child(cube()));
        assert_eq!(scene.len(), 3);
        assert!(!scene.remove(scene.root()));
        assert!(scene.remove(parent));
        assert_eq!(scene.len(), 1);
        assert!(scene.is_empty());
    }

    #[test]
    fn textures_are_rebased_on_insert() {
        let mut scene = SceneGraph::new();
        let first = scene.add_texture(TextureImage::placeholder("first"));
        let template = NodeTemplate::mesh(Mesh::new(
            Geometry::plane(1.0, 1.0, 1, 1),
            Material::textured(TextureId(0)),
        ))
        .named("imported");
        let (id, _) = scene.add_with_textures(
            scene.root(),
            template,
            vec![TextureImage::placeholder("imported")],
        );
        let map = scene.mesh(id).unwrap().materials[0].map.unwrap();
        assert_ne!(map, first);
        assert_eq!(scene.texture(map).unwrap().label, "imported");
    }

    #[test]
    fn spot_light_helper_tracks_angle() {
        let mut scene = SceneGraph::new();
        let mut spot = SpotLight::new(Color::WHITE);
        spot.angle = 0.2;
        let light = scene.add(NodeTemplate::new(NodeKind::SpotLight(spot)).at(-100.0, 100.0, 0.0));
        let helper = scene.add(NodeTemplate::new(NodeKind::SpotLightHelper(SpotLightHelper {
            light,
            cone: Lines::unit_cone(Color::WHITE),
        })));
        scene.update_world_transforms();
        scene.update_spot_light_helper(helper);
        let transform = &scene.node(helper).unwrap().transform;
        assert_eq!(transform.position, Vector3::new(-100.0, 100.0, 0.0));
        assert!((transform.scale.x - 1000.0 * 0.2f32.tan()).abs() < 1e-3);
        assert_eq!(transform.scale.z, 1000.0);
        // the cone's +Z axis points at the target
        let instance = transform.to_instance();
        let axis = instance.rotation * Vector3::unit_z();
        let expected = (Vector3::new(0.0, 0.0, 0.0) - transform.position).normalize();
        assert!((axis - expected).magnitude() < 1e-4);
    }
}
