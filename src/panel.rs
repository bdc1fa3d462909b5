//! Parameter panel drawn as a screen-space overlay.
//!
//! The panel exposes six named controls and pushes edits one way, panel to
//! scene: the caller applies the returned [`PanelChange`]. Numeric values are
//! clamped to their declared range here; scene code does not re-validate.
//!
//! The panel sits in the top-right corner of the surface, one row per
//! control. A row has a label strip on the left and the control widget on
//! the right: a colour swatch with a hue strip, a checkbox, or a slider
//! track. Left press inside a widget edits it and sliders follow the pointer
//! until release. Pointer events that land on the panel are reported as
//! consumed so the orbit controller does not see them.

use log::debug;
use winit::event::{ElementState, MouseButton, WindowEvent};

use crate::data_structures::material::Color;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ControlKind {
    Color,
    Toggle,
    Slider { min: f32, max: f32 },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Control {
    pub name: &'static str,
    pub kind: ControlKind,
}

pub const CONTROLS: [Control; 6] = [
    Control {
        name: "sphereColor",
        kind: ControlKind::Color,
    },
    Control {
        name: "wireframe",
        kind: ControlKind::Toggle,
    },
    Control {
        name: "speed",
        kind: ControlKind::Slider { min: 0.0, max: 0.1 },
    },
    Control {
        name: "angle",
        kind: ControlKind::Slider { min: 0.0, max: 1.0 },
    },
    Control {
        name: "penumbra",
        kind: ControlKind::Slider { min: 0.0, max: 1.0 },
    },
    Control {
        name: "intensity",
        kind: ControlKind::Slider { min: 0.0, max: 1.0 },
    },
];

/// Current values of the panel controls.
#[derive(Clone, Debug, PartialEq)]
pub struct PanelOptions {
    pub sphere_color: Color,
    pub wireframe: bool,
    pub speed: f32,
    pub angle: f32,
    pub penumbra: f32,
    pub intensity: f32,
}

impl Default for PanelOptions {
    fn default() -> Self {
        Self {
            sphere_color: Color::from_hex(0xffea00),
            wireframe: false,
            speed: 0.01,
            angle: 0.2,
            penumbra: 0.0,
            intensity: 1.0,
        }
    }
}

impl PanelOptions {
    fn number(&self, name: &str) -> Option<f32> {
        match name {
            "speed" => Some(self.speed),
            "angle" => Some(self.angle),
            "penumbra" => Some(self.penumbra),
            "intensity" => Some(self.intensity),
            _ => None,
        }
    }
}

/// An edit made through the panel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PanelChange {
    SphereColor(Color),
    Wireframe(bool),
    Speed(f32),
    Angle(f32),
    Penumbra(f32),
    Intensity(f32),
}

impl PanelChange {
    pub fn name(&self) -> &'static str {
        match self {
            PanelChange::SphereColor(_) => "sphereColor",
            PanelChange::Wireframe(_) => "wireframe",
            PanelChange::Speed(_) => "speed",
            PanelChange::Angle(_) => "angle",
            PanelChange::Penumbra(_) => "penumbra",
            PanelChange::Intensity(_) => "intensity",
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PanelVertex {
    /// Normalized device coordinates.
    pub position: [f32; 2],
    /// Linear RGBA.
    pub color: [f32; 4],
}

impl PanelVertex {
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<PanelVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x4,
                },
            ],
        }
    }
}

/// Axis-aligned rectangle in physical pixels, origin top-left.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Rect {
    x: f32,
    y: f32,
    w: f32,
    h: f32,
}

impl Rect {
    fn contains(&self, [px, py]: [f32; 2]) -> bool {
        px >= self.x && px < self.x + self.w && py >= self.y && py < self.y + self.h
    }

    /// Horizontal position of `px` inside the rectangle in `[0, 1]`.
    fn fraction(&self, px: f32) -> f32 {
        ((px - self.x) / self.w.max(1.0)).clamp(0.0, 1.0)
    }

    fn inset(&self, by: f32) -> Rect {
        Rect {
            x: self.x + by,
            y: self.y + by,
            w: (self.w - 2.0 * by).max(0.0),
            h: (self.h - 2.0 * by).max(0.0),
        }
    }
}

const PANEL_WIDTH: f32 = 245.0;
const ROW_HEIGHT: f32 = 27.0;
const RIGHT_MARGIN: f32 = 15.0;
const LABEL_SHARE: f32 = 0.4;

const BACKGROUND: u32 = 0x1a1a1a;
const WIDGET: u32 = 0x303030;
const NUMBER_ACCENT: u32 = 0x2fa1d6;
const TOGGLE_ACCENT: u32 = 0x806787;
const ROW_SEPARATOR: u32 = 0x2c2c2c;

#[derive(Debug)]
pub struct Panel {
    options: PanelOptions,
    viewport: (u32, u32),
    scale: f32,
    cursor: Option<[f32; 2]>,
    /// Row whose widget is being dragged.
    active: Option<usize>,
    version: u32,
}

impl Panel {
    pub fn new(width: u32, height: u32, scale: f32) -> Self {
        Self {
            options: PanelOptions::default(),
            viewport: (width, height),
            scale: scale.max(0.1),
            cursor: None,
            active: None,
            version: 0,
        }
    }

    pub fn options(&self) -> &PanelOptions {
        &self.options
    }

    /// Bumped whenever the panel needs to be redrawn.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Re-anchor the layout to a new surface size.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
        self.version = self.version.wrapping_add(1);
    }

    pub fn set_sphere_color(&mut self, color: Color) -> PanelChange {
        self.options.sphere_color = color;
        self.changed(PanelChange::SphereColor(color))
    }

    pub fn set_wireframe(&mut self, wireframe: bool) -> PanelChange {
        self.options.wireframe = wireframe;
        self.changed(PanelChange::Wireframe(wireframe))
    }

    /// Set a numeric control, clamped to its range. Returns `None` for
    /// unknown or non-numeric controls.
    pub fn set_number(&mut self, name: &str, value: f32) -> Option<PanelChange> {
        let control = CONTROLS.iter().find(|control| control.name == name)?;
        let ControlKind::Slider { min, max } = control.kind else {
            return None;
        };
        let value = if value.is_nan() { min } else { value.clamp(min, max) };
        let change = match name {
            "speed" => {
                self.options.speed = value;
                PanelChange::Speed(value)
            }
            "angle" => {
                self.options.angle = value;
                PanelChange::Angle(value)
            }
            "penumbra" => {
                self.options.penumbra = value;
                PanelChange::Penumbra(value)
            }
            "intensity" => {
                self.options.intensity = value;
                PanelChange::Intensity(value)
            }
            _ => return None,
        };
        Some(self.changed(change))
    }

    fn changed(&mut self, change: PanelChange) -> PanelChange {
        debug!("Panel control {} changed to {:?}", change.name(), change);
        self.version = self.version.wrapping_add(1);
        change
    }

    fn panel_rect(&self) -> Rect {
        let width = PANEL_WIDTH * self.scale;
        Rect {
            x: self.viewport.0 as f32 - width - RIGHT_MARGIN * self.scale,
            y: 0.0,
            w: width,
            h: ROW_HEIGHT * self.scale * CONTROLS.len() as f32,
        }
    }

    fn row_rect(&self, row: usize) -> Rect {
        let panel = self.panel_rect();
        let height = ROW_HEIGHT * self.scale;
        Rect {
            x: panel.x,
            y: panel.y + row as f32 * height,
            w: panel.w,
            h: height,
        }
    }

    fn widget_rect(&self, row: usize) -> Rect {
        let rect = self.row_rect(row);
        let label = rect.w * LABEL_SHARE;
        Rect {
            x: rect.x + label,
            y: rect.y,
            w: rect.w - label,
            h: rect.h,
        }
        .inset(4.0 * self.scale)
    }

    /// Swatch and hue strip of the colour row.
    fn color_parts(&self, row: usize) -> (Rect, Rect) {
        let widget = self.widget_rect(row);
        let half = widget.w / 2.0;
        (
            Rect { w: half - 2.0 * self.scale, ..widget },
            Rect {
                x: widget.x + half,
                w: half,
                ..widget
            },
        )
    }

    pub fn contains(&self, point: [f32; 2]) -> bool {
        self.panel_rect().contains(point)
    }

    fn row_at(&self, point: [f32; 2]) -> Option<usize> {
        (0..CONTROLS.len()).find(|row| self.row_rect(*row).contains(point))
    }

    /// Feed a window event. Returns whether the panel consumed it and the
    /// edit it caused, if any.
    pub fn handle_window_event(&mut self, event: &WindowEvent) -> (bool, Option<PanelChange>) {
        match event {
            WindowEvent::CursorMoved { position, .. } => {
                let point = [position.x as f32, position.y as f32];
                self.cursor = Some(point);
                match self.active {
                    Some(row) => (true, self.edit(row, point, false)),
                    None => (false, None),
                }
            }
            WindowEvent::CursorLeft { .. } => {
                self.cursor = None;
                self.active = None;
                (false, None)
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => match (state, self.cursor) {
                (ElementState::Pressed, Some(point)) if self.contains(point) => {
                    let change = self.row_at(point).and_then(|row| {
                        self.active = Some(row);
                        self.edit(row, point, true)
                    });
                    (true, change)
                }
                (ElementState::Released, _) if self.active.is_some() => {
                    self.active = None;
                    (true, None)
                }
                _ => (false, None),
            },
            WindowEvent::MouseInput { state, .. } => match self.cursor {
                Some(point) if self.contains(point) && state.is_pressed() => (true, None),
                _ => (false, None),
            },
            WindowEvent::MouseWheel { .. } => {
                (self.cursor.is_some_and(|point| self.contains(point)), None)
            }
            _ => (false, None),
        }
    }

    fn edit(&mut self, row: usize, point: [f32; 2], pressed: bool) -> Option<PanelChange> {
        let control = CONTROLS[row];
        match control.kind {
            ControlKind::Color => {
                let (_, hue_strip) = self.color_parts(row);
                if !pressed || hue_strip.contains(point) {
                    let hue = hue_strip.fraction(point[0]).min(0.9999);
                    let current = self.options.sphere_color;
                    let max = current.r.max(current.g).max(current.b);
                    let min = current.r.min(current.g).min(current.b);
                    let saturation = if max > 0.0 { (max - min) / max } else { 0.0 };
                    let color = Color::from_hsv(hue, saturation.max(0.5), max.max(0.5));
                    Some(self.set_sphere_color(color))
                } else {
                    None
                }
            }
            ControlKind::Toggle => {
                if pressed {
                    let wireframe = !self.options.wireframe;
                    Some(self.set_wireframe(wireframe))
                } else {
                    None
                }
            }
            ControlKind::Slider { min, max } => {
                let fraction = self.widget_rect(row).fraction(point[0]);
                self.set_number(control.name, min + fraction * (max - min))
            }
        }
    }

    /// Triangles of the overlay in normalized device coordinates.
    pub fn vertices(&self) -> (Vec<PanelVertex>, Vec<u16>) {
        let mut mesh = OverlayMesh::new(self.viewport);
        for (row, control) in CONTROLS.iter().enumerate() {
            let rect = self.row_rect(row);
            mesh.rect(rect, BACKGROUND);
            mesh.rect(
                Rect {
                    y: rect.y + rect.h - self.scale,
                    h: self.scale,
                    ..rect
                },
                ROW_SEPARATOR,
            );
            let accent = match control.kind {
                ControlKind::Color => self.options.sphere_color.to_hex(),
                ControlKind::Toggle => TOGGLE_ACCENT,
                ControlKind::Slider { .. } => NUMBER_ACCENT,
            };
            mesh.rect(Rect { w: 3.0 * self.scale, ..rect }, accent);

            let widget = self.widget_rect(row);
            match control.kind {
                ControlKind::Color => {
                    let (swatch, hue_strip) = self.color_parts(row);
                    mesh.rect(swatch, self.options.sphere_color.to_hex());
                    mesh.hue_strip(hue_strip);
                }
                ControlKind::Toggle => {
                    let side = widget.h;
                    let check = Rect { w: side, ..widget };
                    mesh.rect(check, WIDGET);
                    if self.options.wireframe {
                        mesh.rect(check.inset(3.0 * self.scale), 0xffffff);
                    }
                }
                ControlKind::Slider { min, max } => {
                    let value = self.options.number(control.name).unwrap_or(min);
                    let fraction = ((value - min) / (max - min)).clamp(0.0, 1.0);
                    mesh.rect(widget, WIDGET);
                    mesh.rect(
                        Rect {
                            w: widget.w * fraction,
                            ..widget
                        },
                        NUMBER_ACCENT,
                    );
                }
            }
        }
        (mesh.vertices, mesh.indices)
    }
}

struct OverlayMesh {
    viewport: (f32, f32),
    vertices: Vec<PanelVertex>,
    indices: Vec<u16>,
}

impl OverlayMesh {
    fn new(viewport: (u32, u32)) -> Self {
        Self {
            viewport: (viewport.0.max(1) as f32, viewport.1.max(1) as f32),
            vertices: Vec::new(),
            indices: Vec::new(),
        }
    }

    fn ndc(&self, x: f32, y: f32) -> [f32; 2] {
        [x / self.viewport.0 * 2.0 - 1.0, 1.0 - y / self.viewport.1 * 2.0]
    }

    fn quad(&mut self, rect: Rect, colors: [Color; 4]) {
        let base = self.vertices.len() as u16;
        let corners = [
            (rect.x, rect.y),
            (rect.x, rect.y + rect.h),
            (rect.x + rect.w, rect.y + rect.h),
            (rect.x + rect.w, rect.y),
        ];
        for ((x, y), color) in corners.into_iter().zip(colors) {
            let [r, g, b] = color.to_linear();
            self.vertices.push(PanelVertex {
                position: self.ndc(x, y),
                color: [r, g, b, 1.0],
            });
        }
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    fn rect(&mut self, rect: Rect, hex: u32) {
        let color = Color::from_hex(hex);
        self.quad(rect, [color; 4]);
    }

    /// Six gradient quads running through the hue circle.
    fn hue_strip(&mut self, rect: Rect) {
        let step = rect.w / 6.0;
        for i in 0..6 {
            let left = Color::from_hsv(i as f32 / 6.0, 1.0, 1.0);
            let right = Color::from_hsv((i + 1) as f32 / 6.0, 1.0, 1.0);
            self.quad(
                Rect {
                    x: rect.x + i as f32 * step,
                    w: step,
                    ..rect
                },
                [left, left, right, right],
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::{dpi::PhysicalPosition, event::DeviceId};

    fn device() -> DeviceId {
        unsafe { DeviceId::dummy() }
    }

    fn move_to(panel: &mut Panel, x: f32, y: f32) -> (bool, Option<PanelChange>) {
        panel.handle_window_event(&WindowEvent::CursorMoved {
            device_id: device(),
            position: PhysicalPosition::new(x as f64, y as f64),
        })
    }

    fn press(panel: &mut Panel, state: ElementState) -> (bool, Option<PanelChange>) {
        panel.handle_window_event(&WindowEvent::MouseInput {
            device_id: device(),
            state,
            button: MouseButton::Left,
        })
    }

    fn centre_of(panel: &Panel, row: usize) -> [f32; 2] {
        let widget = panel.widget_rect(row);
        [widget.x + widget.w / 2.0, widget.y + widget.h / 2.0]
    }

    #[test]
    fn defaults_match_the_declared_controls() {
        let options = PanelOptions::default();
        assert_eq!(options.sphere_color.to_hex(), 0xffea00);
        assert!(!options.wireframe);
        assert_eq!(options.speed, 0.01);
        assert_eq!(options.angle, 0.2);
        assert_eq!(options.penumbra, 0.0);
        assert_eq!(options.intensity, 1.0);
        let names: Vec<_> = CONTROLS.iter().map(|control| control.name).collect();
        assert_eq!(
            names,
            ["sphereColor", "wireframe", "speed", "angle", "penumbra", "intensity"]
        );
    }

    #[test]
    fn numeric_edits_are_clamped() {
        let mut panel = Panel::new(800, 600, 1.0);
        assert_eq!(panel.set_number("speed", 3.0), Some(PanelChange::Speed(0.1)));
        assert_eq!(panel.set_number("angle", -1.0), Some(PanelChange::Angle(0.0)));
        assert_eq!(panel.set_number("penumbra", 1.5), Some(PanelChange::Penumbra(1.0)));
        assert_eq!(panel.set_number("intensity", 0.5), Some(PanelChange::Intensity(0.5)));
        assert_eq!(panel.set_number("wireframe", 0.5), None);
        assert_eq!(panel.set_number("nope", 0.5), None);
        let options = panel.options();
        assert!((0.0..=0.1).contains(&options.speed));
        assert!((0.0..=1.0).contains(&options.angle));
    }

    #[test]
    fn dragging_a_slider_follows_the_pointer() {
        let mut panel = Panel::new(800, 600, 1.0);
        let [x, y] = centre_of(&panel, 3);
        assert_eq!(move_to(&mut panel, x, y), (false, None));
        let (consumed, change) = press(&mut panel, ElementState::Pressed);
        assert!(consumed);
        match change {
            Some(PanelChange::Angle(angle)) => assert!((angle - 0.5).abs() < 0.01),
            other => panic!("unexpected change {:?}", other),
        }
        // dragging far to the right saturates at the top of the range
        let (consumed, change) = move_to(&mut panel, 10_000.0, y);
        assert!(consumed);
        assert_eq!(change, Some(PanelChange::Angle(1.0)));
        assert_eq!(press(&mut panel, ElementState::Released), (true, None));
        assert_eq!(move_to(&mut panel, 0.0, 0.0), (false, None));
    }

    #[test]
    fn checkbox_toggles_on_press() {
        let mut panel = Panel::new(800, 600, 1.0);
        let [x, y] = centre_of(&panel, 1);
        move_to(&mut panel, x, y);
        assert_eq!(
            press(&mut panel, ElementState::Pressed),
            (true, Some(PanelChange::Wireframe(true)))
        );
        press(&mut panel, ElementState::Released);
        assert_eq!(
            press(&mut panel, ElementState::Pressed),
            (true, Some(PanelChange::Wireframe(false)))
        );
    }

    #[test]
    fn hue_strip_changes_colour() {
        let mut panel = Panel::new(800, 600, 1.0);
        let (_, strip) = panel.color_parts(0);
        move_to(&mut panel, strip.x + 1.0, strip.y + 2.0);
        let (consumed, change) = press(&mut panel, ElementState::Pressed);
        assert!(consumed);
        let Some(PanelChange::SphereColor(color)) = change else {
            panic!("expected a colour change, got {:?}", change);
        };
        // the left end of the strip is red
        assert!(color.hue() < 0.02 || color.hue() > 0.98);
        assert!(color.r > color.g && color.r > color.b);
    }

    #[test]
    fn presses_outside_are_not_consumed() {
        let mut panel = Panel::new(800, 600, 1.0);
        move_to(&mut panel, 10.0, 300.0);
        assert_eq!(press(&mut panel, ElementState::Pressed), (false, None));
        assert_eq!(panel.options(), &PanelOptions::default());
    }

    #[test]
    fn layout_follows_resize() {
        let mut panel = Panel::new(800, 600, 1.0);
        let before = panel.panel_rect();
        panel.resize(1600, 600);
        let after = panel.panel_rect();
        assert_eq!(after.x - before.x, 800.0);
        let (vertices, indices) = panel.vertices();
        assert_eq!(vertices.len() % 4, 0);
        assert_eq!(indices.len() / 6, vertices.len() / 4);
        assert!(vertices
            .iter()
            .all(|v| v.position.iter().all(|c| (-1.0..=1.0).contains(c))));
    }
}
