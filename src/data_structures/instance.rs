//! Node transforms and their GPU representation.
//!
//! A scene node stores its local transform as position, XYZ Euler rotation
//! and scale ([`Transform`]). World transforms are composed as [`Instance`]s
//! (position, quaternion, scale) and packed into [`InstanceRaw`] for the
//! vertex shader.

use std::ops::Mul;

use cgmath::{Euler, One, Rad, SquareMatrix};

use crate::data_structures::model;

/// Local transform as it is edited by scene code.
#[derive(Clone, Debug, PartialEq)]
pub struct Transform {
    pub position: cgmath::Vector3<f32>,
    /// XYZ-ordered Euler angles.
    pub rotation: Euler<Rad<f32>>,
    pub scale: cgmath::Vector3<f32>,
}

impl Transform {
    pub fn new() -> Self {
        Self {
            position: cgmath::Vector3::new(0.0, 0.0, 0.0),
            rotation: Euler::new(Rad(0.0), Rad(0.0), Rad(0.0)),
            scale: cgmath::Vector3::new(1.0, 1.0, 1.0),
        }
    }

    pub fn set_rotation_quaternion(&mut self, rotation: cgmath::Quaternion<f32>) {
        self.rotation = Euler::from(rotation);
    }

    pub fn to_instance(&self) -> Instance {
        Instance {
            position: self.position,
            rotation: cgmath::Quaternion::from(self.rotation),
            scale: self.scale,
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}

/// Composable transformation: position, rotation (as quaternion), and scale.
#[derive(Clone, Debug)]
pub struct Instance {
    pub position: cgmath::Vector3<f32>,
    pub rotation: cgmath::Quaternion<f32>,
    pub scale: cgmath::Vector3<f32>,
}

impl Instance {
    /// Identity transformation (no move, rotate, or scale).
    pub fn new() -> Self {
        Self {
            position: cgmath::Vector3::new(0.0, 0.0, 0.0),
            // `Quaternion::one()` is the identity quaternion (no rotation)
            rotation: cgmath::Quaternion::one(),
            scale: cgmath::Vector3::new(1.0, 1.0, 1.0),
        }
    }

    pub fn to_matrix(&self) -> cgmath::Matrix4<f32> {
        cgmath::Matrix4::from_translation(self.position)
            * cgmath::Matrix4::from(self.rotation)
            * cgmath::Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }

    pub fn to_raw(&self) -> InstanceRaw {
        let world_matrix = self.to_matrix();
        let handedness = world_matrix.determinant().signum();
        InstanceRaw {
            model: world_matrix.into(),
            normal: cgmath::Matrix3::from(self.rotation).into(),
            handedness,
        }
    }
}

impl<'a, 'b> Mul<&'b Instance> for &'a Instance {
    type Output = Instance;

    fn mul(self, rhs: &'b Instance) -> Self::Output {
        let new_rotation = self.rotation * rhs.rotation;

        let new_scale = cgmath::Vector3::new(
            self.scale.x * rhs.scale.x,
            self.scale.y * rhs.scale.y,
            self.scale.z * rhs.scale.z,
        );
        let scaled_rhs_pos = cgmath::Vector3::new(
            self.scale.x * rhs.position.x,
            self.scale.y * rhs.position.y,
            self.scale.z * rhs.position.z,
        );
        let new_position = self.position + (self.rotation * scaled_rhs_pos);

        Instance {
            position: new_position,
            rotation: new_rotation,
            scale: new_scale,
        }
    }
}

impl Default for Instance {
    fn default() -> Self {
        Self::new()
    }
}

/**
 * The raw instance is the actual data stored on the GPU
 */
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceRaw {
    model: [[f32; 4]; 4],
    normal: [[f32; 3]; 3],
    handedness: f32,
}

/**
 * Stride layout: the model matrix as four vec4s, the normal matrix as three
 * vec3s and the handedness scalar, on shader locations 5 to 12.
 */
impl model::Vertex for InstanceRaw {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<InstanceRaw>() as wgpu::BufferAddress,
            // Shaders only advance to the next element when a new instance starts
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 5,
                    format: wgpu::VertexFormat::Float32x4,
                },
                // A mat4 takes up 4 vertex slots as it is technically 4 vec4s.
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 4]>() as wgpu::BufferAddress,
                    shader_location: 6,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 8]>() as wgpu::BufferAddress,
                    shader_location: 7,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 12]>() as wgpu::BufferAddress,
                    shader_location: 8,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 16]>() as wgpu::BufferAddress,
                    shader_location: 9,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 19]>() as wgpu::BufferAddress,
                    shader_location: 10,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 22]>() as wgpu::BufferAddress,
                    shader_location: 11,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 25]>() as wgpu::BufferAddress,
                    shader_location: 12,
                    format: wgpu::VertexFormat::Float32,
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{InnerSpace, Rotation3, Vector3};

    #[test]
    fn euler_transform_matches_quaternion() {
        let mut transform = Transform::new();
        transform.rotation = Euler::new(Rad(0.3), Rad(-1.2), Rad(0.0));
        let instance = transform.to_instance();
        let expected = cgmath::Quaternion::from_angle_x(Rad(0.3))
            * cgmath::Quaternion::from_angle_y(Rad(-1.2));
        assert!((instance.rotation - expected).magnitude() < 1e-5);
    }

    #[test]
    fn composition_applies_parent_scale_and_rotation() {
        let parent = Instance {
            position: Vector3::new(1.0, 0.0, 0.0),
            rotation: cgmath::Quaternion::from_angle_z(Rad(std::f32::consts::FRAC_PI_2)),
            scale: Vector3::new(2.0, 2.0, 2.0),
        };
        let child = Instance {
            position: Vector3::new(1.0, 0.0, 0.0),
            ..Instance::new()
        };
        let world = &parent * &child;
        assert!((world.position - Vector3::new(1.0, 2.0, 0.0)).magnitude() < 1e-5);
        assert_eq!(world.scale, Vector3::new(2.0, 2.0, 2.0));
    }
}
