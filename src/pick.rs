//! Ray picking against the scene graph.
//!
//! Picking happens on the CPU: a [`Raycaster`] shoots a ray from the camera
//! through a point in normalized device coordinates and tests it against the
//! triangles of every mesh it is pointed at. Hits are reported nearest
//! first. Triangles culled by a material's [`Side`] are not hit, so what can
//! be picked matches what is drawn.

use cgmath::{
    EuclideanSpace, InnerSpace, Matrix4, Point3, SquareMatrix, Transform, Vector3, Vector4,
};

use crate::{
    camera::{Camera, Projection},
    data_structures::{
        material::Side,
        scene_graph::{Mesh, NodeId, SceneGraph},
    },
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Point3<f32>,
    /// Unit length.
    pub direction: Vector3<f32>,
}

impl Ray {
    pub fn new(origin: Point3<f32>, direction: Vector3<f32>) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    pub fn point_at(&self, t: f32) -> Point3<f32> {
        self.origin + self.direction * t
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Intersection {
    /// Distance from the ray origin in world units.
    pub distance: f32,
    pub point: Point3<f32>,
    pub node: NodeId,
    /// Index of the triangle that was hit.
    pub face: usize,
}

#[derive(Debug, Clone)]
pub struct Raycaster {
    pub ray: Ray,
    pub near: f32,
    pub far: f32,
}

impl Raycaster {
    pub fn new() -> Self {
        Self {
            ray: Ray::new(Point3::origin(), -Vector3::unit_z()),
            near: 0.0,
            far: f32::INFINITY,
        }
    }

    /// Aim the ray from the camera through `ndc` (x right, y up, both in `[-1, 1]`).
    pub fn set_from_camera(&mut self, ndc: [f32; 2], camera: &Camera, projection: &Projection) {
        let view_proj = projection.calc_gl_matrix() * camera.calc_matrix();
        let Some(inverse) = view_proj.invert() else {
            log::warn!("Camera matrix is singular, keeping the previous pick ray.");
            return;
        };
        let unprojected = unproject(&inverse, Vector4::new(ndc[0], ndc[1], 0.5, 1.0));
        self.ray = Ray::new(camera.position, unprojected - camera.position);
    }

    pub fn intersect_object(
        &self,
        scene: &SceneGraph,
        id: NodeId,
        recursive: bool,
    ) -> Vec<Intersection> {
        self.intersect_objects(scene, &[id], recursive)
    }

    /// Intersect the given nodes (and, if `recursive`, their descendants).
    /// World transforms must be current.
    pub fn intersect_objects(
        &self,
        scene: &SceneGraph,
        ids: &[NodeId],
        recursive: bool,
    ) -> Vec<Intersection> {
        let mut hits = Vec::new();
        for id in ids {
            let candidates = if recursive {
                scene.subtree(*id)
            } else {
                vec![*id]
            };
            for candidate in candidates {
                let Some(node) = scene.node(candidate) else {
                    continue;
                };
                if let Some(mesh) = node.as_mesh() {
                    self.intersect_mesh(candidate, mesh, &node.world().to_matrix(), &mut hits);
                }
            }
        }
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }

    fn intersect_mesh(
        &self,
        node: NodeId,
        mesh: &Mesh,
        world: &Matrix4<f32>,
        hits: &mut Vec<Intersection>,
    ) {
        let Some(inverse) = world.invert() else {
            return;
        };
        // Affine maps keep the ray parameter, so `t` found in local space is
        // the world distance along the unit world direction.
        let origin = inverse.transform_point(self.ray.origin);
        let direction = inverse.transform_vector(self.ray.direction);
        let geometry = &mesh.geometry;

        for group in geometry.draw_groups() {
            let side = mesh
                .material_for(group.material_index)
                .map_or(Side::Front, |material| material.side);
            let first = group.start as usize / 3;
            let last = ((group.start + group.count) as usize / 3).min(geometry.triangle_count());
            for face in first..last {
                let Some(triangle) = geometry.triangle(face) else {
                    continue;
                };
                let Some(t) = intersect_triangle(origin, direction, &triangle, side) else {
                    continue;
                };
                if t < self.near || t > self.far {
                    continue;
                }
                hits.push(Intersection {
                    distance: t,
                    point: self.ray.point_at(t),
                    node,
                    face,
                });
            }
        }
    }
}

impl Default for Raycaster {
    fn default() -> Self {
        Self::new()
    }
}

fn unproject(inverse: &Matrix4<f32>, clip: Vector4<f32>) -> Point3<f32> {
    let world = *inverse * clip;
    Point3::from_homogeneous(world)
}

/// Möller-Trumbore ray-triangle intersection honouring face culling.
///
/// Counter-clockwise triangles face the viewer. Returns the ray parameter of
/// the hit.
fn intersect_triangle(
    origin: Point3<f32>,
    direction: Vector3<f32>,
    triangle: &[Vector3<f32>; 3],
    side: Side,
) -> Option<f32> {
    const EPSILON: f32 = 1e-7;

    let [v0, v1, v2] = *triangle;
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;
    let h = direction.cross(edge2);
    let a = edge1.dot(h);

    // a > 0 when the ray looks at the front of the triangle
    let culled = match side {
        Side::Front => a < EPSILON,
        Side::Back => a > -EPSILON,
        Side::Double => a.abs() < EPSILON,
    };
    if culled {
        return None;
    }

    let f = 1.0 / a;
    let s = origin.to_vec() - v0;
    let u = f * s.dot(h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(edge1);
    let v = f * direction.dot(q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = f * edge2.dot(q);
    (t > EPSILON).then_some(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::{
        geometry::Geometry,
        material::{Color, Material},
        scene_graph::NodeTemplate,
    };
    use cgmath::Deg;

    fn triangle() -> [Vector3<f32>; 3] {
        [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
        ]
    }

    #[test]
    fn front_faces_are_hit_from_the_front_only() {
        let towards = Vector3::new(0.0, 0.0, -1.0);
        let front = Point3::new(0.25, 0.25, 1.0);
        let back = Point3::new(0.25, 0.25, -1.0);
        assert_eq!(intersect_triangle(front, towards, &triangle(), Side::Front), Some(1.0));
        assert_eq!(intersect_triangle(back, -towards, &triangle(), Side::Front), None);
        assert_eq!(intersect_triangle(back, -towards, &triangle(), Side::Back), Some(1.0));
        assert_eq!(intersect_triangle(back, -towards, &triangle(), Side::Double), Some(1.0));
        assert_eq!(
            intersect_triangle(Point3::new(2.0, 2.0, 1.0), towards, &triangle(), Side::Double),
            None
        );
    }

    #[test]
    fn hits_are_sorted_by_distance() {
        let mut scene = SceneGraph::new();
        let box_geometry = || Geometry::cuboid(2.0, 2.0, 2.0);
        let far = scene.add(
            NodeTemplate::mesh(Mesh::new(box_geometry(), Material::basic(Color::WHITE)))
                .at(0.0, 0.0, -10.0),
        );
        let near = scene.add(
            NodeTemplate::mesh(Mesh::new(box_geometry(), Material::basic(Color::WHITE)))
                .at(0.0, 0.0, -5.0),
        );
        scene.update_world_transforms();

        let mut raycaster = Raycaster::new();
        // off the face diagonals so each face reports a single triangle
        raycaster.ray = Ray::new(Point3::new(0.3, 0.6, 0.0), -Vector3::unit_z());
        let root = scene.root();
        let hits = raycaster.intersect_objects(&scene, scene.node(root).unwrap().children(), true);
        // front faces only: one hit per box
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].node, near);
        assert!((hits[0].distance - 4.0).abs() < 1e-4);
        assert_eq!(hits[1].node, far);
    }

    #[test]
    fn dangling_indices_are_not_hit() {
        let mut scene = SceneGraph::new();
        let geometry = Geometry::new(
            vec![-1.0, -1.0, 0.0, 1.0, -1.0, 0.0, 0.0, 1.0, 0.0],
            Vec::new(),
            Vec::new(),
            vec![0, 1, 7, 0, 1, 2],
        );
        let id = scene.add(
            NodeTemplate::mesh(Mesh::new(geometry, Material::basic(Color::WHITE))).at(0.0, 0.0, -3.0),
        );
        scene.update_world_transforms();
        let mut raycaster = Raycaster::new();
        raycaster.ray = Ray::new(Point3::new(0.0, 0.0, 0.0), -Vector3::unit_z());
        let hits = raycaster.intersect_object(&scene, id, false);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].face, 1);
    }

    #[test]
    fn camera_ray_through_centre_points_at_target() {
        let camera = Camera::new((-10.0, 30.0, 30.0), (0.0, 0.0, 0.0));
        let projection = Projection::new(800, 600, Deg(45.0), 0.1, 1000.0);
        let mut raycaster = Raycaster::new();
        raycaster.set_from_camera([0.0, 0.0], &camera, &projection);
        assert_eq!(raycaster.ray.origin, camera.position);
        assert!((raycaster.ray.direction - camera.forward()).magnitude() < 1e-4);
    }

    #[test]
    fn scaled_nodes_report_world_distance() {
        let mut scene = SceneGraph::new();
        let mut template =
            NodeTemplate::mesh(Mesh::new(Geometry::cuboid(1.0, 1.0, 1.0), Material::basic(Color::WHITE)))
                .at(0.0, 0.0, -10.0);
        template.transform.scale = Vector3::new(4.0, 4.0, 4.0);
        let id = scene.add(template);
        scene.update_world_transforms();
        let mut raycaster = Raycaster::new();
        raycaster.ray = Ray::new(Point3::new(0.5, -0.7, 0.0), -Vector3::unit_z());
        let hits = raycaster.intersect_object(&scene, id, false);
        assert_eq!(hits.len(), 1);
        assert!((hits[0].distance - 8.0).abs() < 1e-4);
    }
}
