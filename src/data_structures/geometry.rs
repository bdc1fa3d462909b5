//! CPU-side geometry and the primitive generators used by the playground.
//!
//! Vertex attributes are stored as flat scalar arrays so that code can
//! address "the last scalar of the position buffer" directly. Each attribute
//! carries a version counter; bumping it via
//! [`Attribute::set_needs_update`] tells the renderer to re-upload the data.
//!
//! The generators follow the usual retained-mode layouts:
//! - boxes are built face by face in the order +X, -X, +Y, -Y, +Z, -Z, one
//!   material group per face
//! - planes lie in the XY plane facing +Z, rows running from +Y to -Y
//! - spheres run from the north pole (+Y) to the south pole

use std::f32::consts::PI;

use cgmath::{InnerSpace, Vector3};

use crate::data_structures::material::Color;

#[derive(Clone, Debug)]
pub struct Attribute {
    pub array: Vec<f32>,
    pub item_size: usize,
    version: u32,
}

impl Attribute {
    pub fn new(array: Vec<f32>, item_size: usize) -> Self {
        Self {
            array,
            item_size,
            version: 0,
        }
    }

    /// Number of items (vertices), not scalars.
    pub fn count(&self) -> usize {
        self.array.len() / self.item_size
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Flag the data as modified so the renderer re-uploads it.
    pub fn set_needs_update(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    pub fn vec3(&self, idx: usize) -> Vector3<f32> {
        let i = idx * self.item_size;
        Vector3::new(self.array[i], self.array[i + 1], self.array[i + 2])
    }

    pub fn get_vec3(&self, idx: usize) -> Option<Vector3<f32>> {
        let i = idx.checked_mul(self.item_size)?;
        match self.array.get(i..i.checked_add(3)?)? {
            &[x, y, z] => Some(Vector3::new(x, y, z)),
            _ => None,
        }
    }

    pub fn vec2(&self, idx: usize) -> [f32; 2] {
        let i = idx * self.item_size;
        [self.array[i], self.array[i + 1]]
    }
}

/// A run of indices drawn with one material of a multi-material mesh.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Group {
    pub start: u32,
    pub count: u32,
    pub material_index: usize,
}

#[derive(Clone, Debug)]
pub struct Geometry {
    pub position: Attribute,
    pub normal: Attribute,
    pub uv: Attribute,
    pub indices: Vec<u32>,
    pub groups: Vec<Group>,
}

impl Geometry {
    pub fn new(
        positions: Vec<f32>,
        normals: Vec<f32>,
        uvs: Vec<f32>,
        indices: Vec<u32>,
    ) -> Self {
        Self {
            position: Attribute::new(positions, 3),
            normal: Attribute::new(normals, 3),
            uv: Attribute::new(uvs, 2),
            indices,
            groups: Vec::new(),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.position.count()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Positions of the `i`-th triangle in local space, or `None` when the
    /// triangle or one of its indices is out of range.
    pub fn triangle(&self, i: usize) -> Option<[Vector3<f32>; 3]> {
        let tri = self.indices.get(i * 3..i * 3 + 3)?;
        Some([
            self.position.get_vec3(tri[0] as usize)?,
            self.position.get_vec3(tri[1] as usize)?,
            self.position.get_vec3(tri[2] as usize)?,
        ])
    }

    /// Material groups, or a single implicit group covering every index.
    pub fn draw_groups(&self) -> Vec<Group> {
        if self.groups.is_empty() {
            vec![Group {
                start: 0,
                count: self.indices.len() as u32,
                material_index: 0,
            }]
        } else {
            self.groups.clone()
        }
    }

    /// Edge list (pairs of indices) for wireframe rendering, one pair per
    /// triangle edge, kept in group order so that group ranges can be
    /// doubled to address it.
    pub fn wireframe_indices(&self) -> Vec<u32> {
        self.indices
            .chunks_exact(3)
            .flat_map(|tri| [tri[0], tri[1], tri[1], tri[2], tri[2], tri[0]])
            .collect()
    }

    /// Axis-aligned box centred on the origin with one segment per side.
    pub fn cuboid(width: f32, height: f32, depth: f32) -> Self {
        let mut builder = BoxBuilder::default();
        // u, v, w axes; u/v directions; plane extents
        builder.face([2, 1, 0], -1.0, -1.0, depth, height, width, 0);
        builder.face([2, 1, 0], 1.0, -1.0, depth, height, -width, 1);
        builder.face([0, 2, 1], 1.0, 1.0, width, depth, height, 2);
        builder.face([0, 2, 1], 1.0, -1.0, width, depth, -height, 3);
        builder.face([0, 1, 2], 1.0, -1.0, width, height, depth, 4);
        builder.face([0, 1, 2], -1.0, -1.0, width, height, -depth, 5);
        let mut geometry = Self::new(
            builder.positions,
            builder.normals,
            builder.uvs,
            builder.indices,
        );
        geometry.groups = builder.groups;
        geometry
    }

    pub fn plane(width: f32, height: f32, width_segments: u32, height_segments: u32) -> Self {
        let grid_x = width_segments.max(1);
        let grid_y = height_segments.max(1);
        let segment_width = width / grid_x as f32;
        let segment_height = height / grid_y as f32;
        let (half_w, half_h) = (width / 2.0, height / 2.0);

        let mut positions = Vec::new();
        let mut normals = Vec::new();
        let mut uvs = Vec::new();
        for iy in 0..=grid_y {
            let y = iy as f32 * segment_height - half_h;
            for ix in 0..=grid_x {
                let x = ix as f32 * segment_width - half_w;
                positions.extend_from_slice(&[x, -y, 0.0]);
                normals.extend_from_slice(&[0.0, 0.0, 1.0]);
                uvs.extend_from_slice(&[
                    ix as f32 / grid_x as f32,
                    1.0 - iy as f32 / grid_y as f32,
                ]);
            }
        }
        let indices = grid_indices(0, grid_x, grid_y);
        Self::new(positions, normals, uvs, indices)
    }

    pub fn sphere(radius: f32, width_segments: u32, height_segments: u32) -> Self {
        let width_segments = width_segments.max(3);
        let height_segments = height_segments.max(2);

        let mut positions = Vec::new();
        let mut normals = Vec::new();
        let mut uvs = Vec::new();
        let mut grid = Vec::with_capacity(height_segments as usize + 1);
        let mut index = 0u32;

        for iy in 0..=height_segments {
            let v = iy as f32 / height_segments as f32;
            // poles get their uv nudged half a segment so the seam closes
            let u_offset = if iy == 0 {
                0.5 / width_segments as f32
            } else if iy == height_segments {
                -0.5 / width_segments as f32
            } else {
                0.0
            };
            let mut row = Vec::with_capacity(width_segments as usize + 1);
            for ix in 0..=width_segments {
                let u = ix as f32 / width_segments as f32;
                let (phi, theta) = (u * 2.0 * PI, v * PI);
                let vertex = Vector3::new(
                    -radius * phi.cos() * theta.sin(),
                    radius * theta.cos(),
                    radius * phi.sin() * theta.sin(),
                );
                let normal = if vertex.magnitude2() > 0.0 {
                    vertex.normalize()
                } else {
                    Vector3::unit_y()
                };
                positions.extend_from_slice(&[vertex.x, vertex.y, vertex.z]);
                normals.extend_from_slice(&[normal.x, normal.y, normal.z]);
                uvs.extend_from_slice(&[u + u_offset, 1.0 - v]);
                row.push(index);
                index += 1;
            }
            grid.push(row);
        }

        let mut indices = Vec::new();
        for iy in 0..height_segments as usize {
            for ix in 0..width_segments as usize {
                let a = grid[iy][ix + 1];
                let b = grid[iy][ix];
                let c = grid[iy + 1][ix];
                let d = grid[iy + 1][ix + 1];
                if iy != 0 {
                    indices.extend_from_slice(&[a, b, d]);
                }
                if iy != height_segments as usize - 1 {
                    indices.extend_from_slice(&[b, c, d]);
                }
            }
        }
        Self::new(positions, normals, uvs, indices)
    }
}

/// Two triangles per grid cell, `offset` being the first vertex of the grid.
fn grid_indices(offset: u32, grid_x: u32, grid_y: u32) -> Vec<u32> {
    let grid_x1 = grid_x + 1;
    let mut indices = Vec::with_capacity((grid_x * grid_y * 6) as usize);
    for iy in 0..grid_y {
        for ix in 0..grid_x {
            let a = offset + ix + grid_x1 * iy;
            let b = offset + ix + grid_x1 * (iy + 1);
            let c = offset + (ix + 1) + grid_x1 * (iy + 1);
            let d = offset + (ix + 1) + grid_x1 * iy;
            indices.extend_from_slice(&[a, b, d, b, c, d]);
        }
    }
    indices
}

#[derive(Default)]
struct BoxBuilder {
    positions: Vec<f32>,
    normals: Vec<f32>,
    uvs: Vec<f32>,
    indices: Vec<u32>,
    groups: Vec<Group>,
}

impl BoxBuilder {
    #[allow(clippy::too_many_arguments)]
    fn face(
        &mut self,
        [u, v, w]: [usize; 3],
        u_dir: f32,
        v_dir: f32,
        width: f32,
        height: f32,
        depth: f32,
        material_index: usize,
    ) {
        let offset = (self.positions.len() / 3) as u32;
        let group_start = self.indices.len() as u32;
        for iy in 0..=1u32 {
            let y = iy as f32 * height - height / 2.0;
            for ix in 0..=1u32 {
                let x = ix as f32 * width - width / 2.0;
                let mut vector = [0.0f32; 3];
                vector[u] = x * u_dir;
                vector[v] = y * v_dir;
                vector[w] = depth / 2.0;
                self.positions.extend_from_slice(&vector);

                let mut normal = [0.0f32; 3];
                normal[w] = if depth > 0.0 { 1.0 } else { -1.0 };
                self.normals.extend_from_slice(&normal);

                self.uvs.extend_from_slice(&[ix as f32, 1.0 - iy as f32]);
            }
        }
        self.indices.extend(grid_indices(offset, 1, 1));
        self.groups.push(Group {
            start: group_start,
            count: self.indices.len() as u32 - group_start,
            material_index,
        });
    }
}

/// Coloured line segments (two vertices per segment) used by helpers.
#[derive(Clone, Debug, Default)]
pub struct Lines {
    pub positions: Vec<[f32; 3]>,
    pub colors: Vec<[f32; 3]>,
    version: u32,
}

impl Lines {
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn set_needs_update(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    pub fn push(&mut self, from: [f32; 3], to: [f32; 3], color: Color) {
        let c = [color.r, color.g, color.b];
        self.positions.extend_from_slice(&[from, to]);
        self.colors.extend_from_slice(&[c, c]);
    }

    pub fn segment_count(&self) -> usize {
        self.positions.len() / 2
    }

    /// Square grid in the XZ plane, the centre lines drawn in `center_color`.
    pub fn grid(size: f32, divisions: u32, center_color: Color, grid_color: Color) -> Self {
        let divisions = divisions.max(1);
        let step = size / divisions as f32;
        let half = size / 2.0;
        let center = divisions / 2;
        let mut lines = Self::default();
        for i in 0..=divisions {
            let k = -half + i as f32 * step;
            let color = if i == center { center_color } else { grid_color };
            lines.push([-half, 0.0, k], [half, 0.0, k], color);
            lines.push([k, 0.0, -half], [k, 0.0, half], color);
        }
        lines
    }

    /// X, Y and Z axes of length `size` in red, green and blue.
    pub fn axes(size: f32) -> Self {
        let mut lines = Self::default();
        lines.push([0.0; 3], [size, 0.0, 0.0], Color::new(1.0, 0.0, 0.0));
        lines.push([0.0; 3], [0.0, size, 0.0], Color::new(0.0, 1.0, 0.0));
        lines.push([0.0; 3], [0.0, 0.0, size], Color::new(0.0, 0.0, 1.0));
        lines
    }

    /// Unit cone opening along +Z: five rays from the apex and a rim circle
    /// at `z = 1`. Scale it by (width, width, length) to fit a light.
    pub fn unit_cone(color: Color) -> Self {
        let mut lines = Self::default();
        for [x, y] in [[0.0, 0.0], [1.0, 0.0], [-1.0, 0.0], [0.0, 1.0], [0.0, -1.0]] {
            lines.push([0.0; 3], [x, y, 1.0], color);
        }
        let rim = 32;
        for i in 0..rim {
            let a0 = i as f32 / rim as f32 * 2.0 * PI;
            let a1 = (i + 1) as f32 / rim as f32 * 2.0 * PI;
            lines.push([a0.cos(), a0.sin(), 1.0], [a1.cos(), a1.sin(), 1.0], color);
        }
        lines
    }

    pub fn set_color(&mut self, color: Color) {
        let c = [color.r, color.g, color.b];
        self.colors.iter_mut().for_each(|slot| *slot = c);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cuboid_has_one_group_per_face_in_order() {
        let geometry = Geometry::cuboid(4.0, 4.0, 4.0);
        assert_eq!(geometry.vertex_count(), 24);
        assert_eq!(geometry.triangle_count(), 12);
        let groups = geometry.draw_groups();
        assert_eq!(groups.len(), 6);
        for (i, group) in groups.iter().enumerate() {
            assert_eq!(group.material_index, i);
            assert_eq!(group.start, i as u32 * 6);
            assert_eq!(group.count, 6);
        }
        // first face is +X: every vertex sits on x = +2 with a +X normal
        for v in 0..4 {
            assert_eq!(geometry.position.vec3(v).x, 2.0);
            assert_eq!(geometry.normal.vec3(v), Vector3::unit_x());
        }
        // fourth face is -Y
        for v in 12..16 {
            assert_eq!(geometry.position.vec3(v).y, -2.0);
            assert_eq!(geometry.normal.vec3(v), -Vector3::unit_y());
        }
    }

    #[test]
    fn plane_layout_starts_top_left() {
        let geometry = Geometry::plane(10.0, 10.0, 10, 10);
        assert_eq!(geometry.vertex_count(), 121);
        assert_eq!(geometry.position.array.len(), 363);
        assert_eq!(geometry.triangle_count(), 200);
        assert_eq!(geometry.position.vec3(0), Vector3::new(-5.0, 5.0, 0.0));
        assert_eq!(geometry.position.vec3(120), Vector3::new(5.0, -5.0, 0.0));
    }

    #[test]
    fn sphere_skips_degenerate_pole_triangles() {
        let geometry = Geometry::sphere(4.0, 32, 16);
        assert_eq!(geometry.vertex_count(), 33 * 17);
        // each row yields two triangles per segment except at the poles
        assert_eq!(geometry.triangle_count(), 32 * (16 * 2 - 2));
        assert!((geometry.position.vec3(0).y - 4.0).abs() < 1e-5);
        for i in 0..geometry.vertex_count() {
            assert!((geometry.position.vec3(i).magnitude() - 4.0).abs() < 1e-4);
        }
    }

    #[test]
    fn needs_update_bumps_version() {
        let mut geometry = Geometry::plane(1.0, 1.0, 1, 1);
        let before = geometry.position.version();
        geometry.position.set_needs_update();
        assert_eq!(geometry.position.version(), before + 1);
    }

    #[test]
    fn triangles_with_dangling_indices_are_skipped() {
        let geometry = Geometry::new(
            vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            Vec::new(),
            Vec::new(),
            vec![0, 1, 2, 0, 1, 7],
        );
        assert_eq!(geometry.triangle(0).map(|tri| tri[1]), Some(Vector3::unit_x()));
        assert_eq!(geometry.triangle(1), None);
        assert_eq!(geometry.triangle(2), None);
    }

    #[test]
    fn wireframe_doubles_index_count() {
        let geometry = Geometry::cuboid(1.0, 1.0, 1.0);
        assert_eq!(geometry.wireframe_indices().len(), geometry.indices.len() * 2);
    }

    #[test]
    fn grid_colours_centre_line() {
        let grid = Lines::grid(30.0, 10, Color::from_hex(0x444444), Color::from_hex(0x888888));
        assert_eq!(grid.segment_count(), 22);
        let centre = Color::from_hex(0x444444);
        assert_eq!(grid.colors[20], [centre.r, centre.g, centre.b]);
        assert_eq!(grid.positions[0], [-15.0, 0.0, -15.0]);
    }
}
