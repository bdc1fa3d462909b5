//! Perspective camera, orbit controller and the camera uniform.
//!
//! The camera looks from `position` at `target`. [`OrbitController`] moves it
//! on a sphere around the target: left drag rotates, the wheel dollies and
//! right drag pans. Input is collected from winit window events and applied
//! once per frame in [`OrbitController::update`].

use std::f32::consts::PI;

use cgmath::{InnerSpace, Matrix4, Point3, SquareMatrix, Vector3, perspective};
use winit::{
    dpi::PhysicalPosition,
    event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent},
};

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Point3<f32>,
    pub target: Point3<f32>,
    pub up: Vector3<f32>,
}

impl Camera {
    pub fn new<P: Into<Point3<f32>>>(position: P, target: P) -> Self {
        Self {
            position: position.into(),
            target: target.into(),
            up: Vector3::unit_y(),
        }
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn forward(&self) -> Vector3<f32> {
        (self.target - self.position).normalize()
    }
}

#[derive(Debug, Clone)]
pub struct Projection {
    aspect: f32,
    fovy: cgmath::Rad<f32>,
    znear: f32,
    zfar: f32,
}

impl Projection {
    pub fn new<F: Into<cgmath::Rad<f32>>>(
        width: u32,
        height: u32,
        fovy: F,
        znear: f32,
        zfar: f32,
    ) -> Self {
        Self {
            aspect: width as f32 / height.max(1) as f32,
            fovy: fovy.into(),
            znear,
            zfar,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect = width as f32 / height.max(1) as f32;
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn fovy(&self) -> cgmath::Rad<f32> {
        self.fovy
    }

    /// Projection in OpenGL clip conventions (depth in `[-1, 1]`).
    pub fn calc_gl_matrix(&self) -> Matrix4<f32> {
        perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * self.calc_gl_matrix()
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    pub view_position: [f32; 4],
    pub view_proj: [[f32; 4]; 4],
    /// Inverse of the projection times the rotation-only view, for the skybox.
    pub sky_unproject: [[f32; 4]; 4],
}

impl CameraUniform {
    pub fn new() -> Self {
        Self {
            view_position: [0.0; 4],
            view_proj: Matrix4::identity().into(),
            sky_unproject: Matrix4::identity().into(),
        }
    }

    pub fn update_view_proj(&mut self, camera: &Camera, projection: &Projection) {
        self.view_position = camera.position.to_homogeneous().into();
        let view = camera.calc_matrix();
        let proj = projection.calc_matrix();
        self.view_proj = (proj * view).into();
        let mut rotation = view;
        rotation.w = cgmath::Vector4::new(0.0, 0.0, 0.0, 1.0);
        self.sky_unproject = (proj * rotation)
            .invert()
            .unwrap_or_else(Matrix4::identity)
            .into();
    }
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct CameraResources {
    pub camera: Camera,
    pub controller: OrbitController,
    pub uniform: CameraUniform,
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Drag {
    Rotate,
    Pan,
}

#[derive(Debug)]
pub struct OrbitController {
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub pan_speed: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    /// While false only the cursor position and button releases are tracked.
    pub enabled: bool,
    drag: Option<Drag>,
    cursor: Option<PhysicalPosition<f64>>,
    rotate_delta: (f32, f32),
    pan_delta: (f32, f32),
    zoom_delta: f32,
}

impl OrbitController {
    pub fn new(rotate_speed: f32, zoom_speed: f32, pan_speed: f32) -> Self {
        Self {
            rotate_speed,
            zoom_speed,
            pan_speed,
            min_distance: 0.0,
            max_distance: f32::INFINITY,
            enabled: true,
            drag: None,
            cursor: None,
            rotate_delta: (0.0, 0.0),
            pan_delta: (0.0, 0.0),
            zoom_delta: 0.0,
        }
    }

    /// Feed a window event. Returns true if the event moved the camera.
    pub fn handle_window_events(&mut self, event: &WindowEvent) -> bool {
        if !self.enabled {
            self.track_disabled(event);
            return false;
        }
        match event {
            WindowEvent::MouseInput { state, button, .. } => {
                self.drag = match (button, state) {
                    (MouseButton::Left, ElementState::Pressed) => Some(Drag::Rotate),
                    (MouseButton::Right, ElementState::Pressed) => Some(Drag::Pan),
                    (_, ElementState::Released) => None,
                    _ => self.drag,
                };
                false
            }
            WindowEvent::CursorMoved { position, .. } => {
                let moved = match (self.drag, self.cursor) {
                    (Some(drag), Some(last)) => {
                        self.handle_mouse_drag(drag, position.x - last.x, position.y - last.y);
                        true
                    }
                    _ => false,
                };
                self.cursor = Some(*position);
                moved
            }
            WindowEvent::CursorLeft { .. } => {
                self.drag = None;
                self.cursor = None;
                false
            }
            WindowEvent::MouseWheel { delta, .. } => {
                self.zoom_delta += match delta {
                    MouseScrollDelta::LineDelta(_, scroll) => *scroll,
                    MouseScrollDelta::PixelDelta(PhysicalPosition { y, .. }) => *y as f32 / 50.0,
                };
                true
            }
            _ => false,
        }
    }

    fn track_disabled(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::CursorMoved { position, .. } => self.cursor = Some(*position),
            WindowEvent::MouseInput {
                state: ElementState::Released,
                ..
            } => self.drag = None,
            WindowEvent::CursorLeft { .. } => {
                self.drag = None;
                self.cursor = None;
            }
            _ => {}
        }
    }

    fn handle_mouse_drag(&mut self, drag: Drag, dx: f64, dy: f64) {
        let delta = match drag {
            Drag::Rotate => &mut self.rotate_delta,
            Drag::Pan => &mut self.pan_delta,
        };
        delta.0 += dx as f32;
        delta.1 += dy as f32;
    }

    /// Forget the current drag, for instance when the pointer went to an overlay.
    pub fn release(&mut self) {
        self.drag = None;
    }

    /// Apply the collected input. `viewport_height` converts pixels to angles.
    pub fn update(&mut self, camera: &mut Camera, projection: &Projection, viewport_height: u32) {
        let height = viewport_height.max(1) as f32;
        let mut offset = camera.position - camera.target;
        let mut radius = offset.magnitude();
        if radius <= f32::EPSILON {
            return;
        }

        // spherical coordinates around +Y
        let mut theta = offset.x.atan2(offset.z);
        let mut phi = (offset.y / radius).clamp(-1.0, 1.0).acos();
        theta -= 2.0 * PI * self.rotate_delta.0 / height * self.rotate_speed;
        phi -= 2.0 * PI * self.rotate_delta.1 / height * self.rotate_speed;
        phi = phi.clamp(1e-4, PI - 1e-4);

        if self.zoom_delta != 0.0 {
            radius *= 0.95f32.powf(self.zoom_delta * self.zoom_speed);
            radius = radius.clamp(self.min_distance.max(1e-3), self.max_distance);
        }

        if self.pan_delta != (0.0, 0.0) {
            let forward = -offset.normalize();
            let right = forward.cross(camera.up).normalize();
            let up = right.cross(forward);
            // pixels to world units at the target's depth
            let scale = 2.0 * radius * (projection.fovy().0 / 2.0).tan() / height * self.pan_speed;
            let shift = right * (-self.pan_delta.0 * scale) + up * (self.pan_delta.1 * scale);
            camera.target += shift;
        }

        offset = Vector3::new(
            radius * phi.sin() * theta.sin(),
            radius * phi.cos(),
            radius * phi.sin() * theta.cos(),
        );
        camera.position = camera.target + offset;

        self.rotate_delta = (0.0, 0.0);
        self.pan_delta = (0.0, 0.0);
        self.zoom_delta = 0.0;
    }
}

impl Default for OrbitController {
    fn default() -> Self {
        Self::new(1.0, 1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Deg, MetricSpace};
    use winit::event::DeviceId;

    fn camera() -> (Camera, Projection) {
        (
            Camera::new((-10.0, 30.0, 30.0), (0.0, 0.0, 0.0)),
            Projection::new(800, 600, Deg(45.0), 0.1, 1000.0),
        )
    }

    #[test]
    fn resize_updates_aspect() {
        let (_, mut projection) = camera();
        projection.resize(1920, 1080);
        assert_eq!(projection.aspect(), 1920.0 / 1080.0);
    }

    #[test]
    fn rotation_keeps_distance_to_target() {
        let (mut camera, projection) = camera();
        let before = camera.position.distance(camera.target);
        let mut controller = OrbitController::default();
        controller.drag = Some(Drag::Rotate);
        controller.handle_mouse_drag(Drag::Rotate, 120.0, -40.0);
        controller.update(&mut camera, &projection, 600);
        let after = camera.position.distance(camera.target);
        assert!((before - after).abs() < 1e-3);
        assert!(camera.position.x != -10.0);
    }

    #[test]
    fn wheel_dollies_towards_target() {
        let (mut camera, projection) = camera();
        let before = camera.position.distance(camera.target);
        let mut controller = OrbitController::default();
        let consumed = controller.handle_window_events(&WindowEvent::MouseWheel {
            device_id: unsafe { DeviceId::dummy() },
            delta: MouseScrollDelta::LineDelta(0.0, 2.0),
            phase: winit::event::TouchPhase::Moved,
        });
        assert!(consumed);
        controller.update(&mut camera, &projection, 600);
        assert!(camera.position.distance(camera.target) < before);
    }

    #[test]
    fn disabled_controller_ignores_the_wheel() {
        let (mut camera, projection) = camera();
        let before = camera.position;
        let mut controller = OrbitController::default();
        controller.enabled = false;
        let consumed = controller.handle_window_events(&WindowEvent::MouseWheel {
            device_id: unsafe { DeviceId::dummy() },
            delta: MouseScrollDelta::LineDelta(0.0, 2.0),
            phase: winit::event::TouchPhase::Moved,
        });
        assert!(!consumed);
        controller.update(&mut camera, &projection, 600);
        assert!(camera.position.distance(before) < 1e-4);
    }
}
