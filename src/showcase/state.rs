//! Mutable state of the playground and the per-frame procedure driving it.

use std::sync::Arc;

use cgmath::Rad;
use log::{debug, error, info, warn};
use rand::rngs::SmallRng;

use crate::{
    camera::{Camera, Projection},
    config::SceneConfig,
    data_structures::{
        animation::{AnimationClip, AnimationMixer},
        material::{Color, ShaderSource},
        scene_graph::{NodeId, SceneGraph},
    },
    panel::{Panel, PanelChange},
    pick::Raycaster,
    resources::gltf_loader::LoadedModel,
    showcase::content::{self, DemoTextures, SceneIds},
};

const PICKED_COLOR: u32 = 0xff0000;

/// Everything the frame loop reads and writes.
///
/// Built once by the showcase flow: the scene content first, then the
/// panel with its default options, then the random source. The mixer stays
/// `None` until the model arrives.
#[derive(Debug)]
pub struct DemoState {
    pub scene: SceneGraph,
    pub ids: SceneIds,
    pub panel: Panel,
    pub mixer: Option<AnimationMixer>,
    /// Root of the loaded model once attached.
    pub model: Option<NodeId>,
    /// Phase of the bouncing sphere.
    pub step: f32,
    /// Pick coordinate in normalized device coordinates. Never updated from
    /// the pointer, so it stays at the centre of the view.
    pub pick_ndc: [f32; 2],
    pick_tag: &'static str,
    raycaster: Raycaster,
    rng: SmallRng,
}

impl DemoState {
    pub fn new(
        config: &SceneConfig,
        textures: DemoTextures,
        shader: Arc<ShaderSource>,
        panel: Panel,
        mut rng: SmallRng,
    ) -> Self {
        let (scene, ids) = content::build_scene(config, textures, shader, &mut rng);
        Self {
            scene,
            ids,
            panel,
            mixer: None,
            model: None,
            step: 0.0,
            pick_ndc: [0.0, 0.0],
            pick_tag: config.pick_tag,
            raycaster: Raycaster::new(),
            rng,
        }
    }

    /// Advance the scene by one frame. `elapsed_ms` is the time since the
    /// loop started, `dt` the seconds since the previous frame.
    pub fn tick(&mut self, elapsed_ms: f32, dt: f32, camera: &Camera, projection: &Projection) {
        if let Some(mixer) = &mut self.mixer {
            mixer.update(dt, &mut self.scene);
        }

        let spin = Rad(elapsed_ms / 1000.0);
        if let Some(cube) = self.scene.node_mut(self.ids.cube) {
            cube.transform.rotation.x = spin;
            cube.transform.rotation.y = spin;
        }

        let options = self.panel.options().clone();
        self.step += options.speed;
        if let Some(sphere) = self.scene.node_mut(self.ids.sphere) {
            sphere.transform.position.y = 10.0 * self.step.sin().abs();
        }

        if let Some(spot) = self.scene.spot_light_mut(self.ids.spot_light) {
            spot.angle = options.angle;
            spot.penumbra = options.penumbra;
            spot.intensity = options.intensity;
        }
        self.scene.update_spot_light_helper(self.ids.spot_light_helper);
        self.scene.update_world_transforms();

        self.pick(spin, camera, projection);

        if let Some(mesh) = self.scene.mesh_mut(self.ids.wire_plane) {
            content::scatter(&mut mesh.geometry.position.array, &mut self.rng);
            mesh.geometry.position.set_needs_update();
        }

        self.scene.update_world_transforms();
    }

    fn pick(&mut self, spin: Rad<f32>, camera: &Camera, projection: &Projection) {
        self.raycaster.set_from_camera(self.pick_ndc, camera, projection);
        let hits = self
            .raycaster
            .intersect_objects(&self.scene, &[self.scene.root()], true);
        for hit in hits {
            if hit.node == self.ids.sphere {
                if let Some(material) = self
                    .scene
                    .mesh_mut(hit.node)
                    .and_then(|mesh| mesh.materials.first_mut())
                {
                    material.color = Color::from_hex(PICKED_COLOR);
                }
            }
            if let Some(node) = self.scene.node_mut(hit.node) {
                if node.name == self.pick_tag {
                    node.transform.rotation.x = spin;
                    node.transform.rotation.y = spin;
                }
            }
        }
    }

    /// Push a panel edit to the scene. Numeric controls are read by
    /// [`tick`](Self::tick) instead.
    pub fn apply_panel_change(&mut self, change: PanelChange) {
        let Some(material) = self
            .scene
            .mesh_mut(self.ids.sphere)
            .and_then(|mesh| mesh.materials.first_mut())
        else {
            warn!("The sphere lost its material, ignoring {}.", change.name());
            return;
        };
        match change {
            PanelChange::SphereColor(color) => material.color = color,
            PanelChange::Wireframe(wireframe) => material.wireframe = wireframe,
            PanelChange::Speed(_)
            | PanelChange::Angle(_)
            | PanelChange::Penumbra(_)
            | PanelChange::Intensity(_) => (),
        }
    }

    /// Insert the loaded model at `position` and prepare `clip_name` on a
    /// new mixer. The action is prepared but not started.
    pub fn attach_model(&mut self, model: LoadedModel, position: [f32; 3], clip_name: &str) {
        match model.second_child_opacity() {
            Some(opacity) => info!("Opacity of the model's second child: {}", opacity),
            None => warn!("The model has no second child with a material."),
        }

        let LoadedModel {
            mut root,
            images,
            clips,
        } = model;
        root.transform.position = position.into();
        let (id, bindings) = self.scene.add_with_textures(self.scene.root(), root, images);
        self.scene.update_world_transforms();

        let mut mixer = AnimationMixer::new(id, bindings);
        match AnimationClip::find_by_name(&clips, clip_name) {
            Some(clip) => {
                let action = mixer.clip_action(clip);
                debug!("Prepared {:?}, running: {}", clip_name, action.is_running());
            }
            None => error!(
                "The model has no clip named {:?}, available: {:?}",
                clip_name,
                clips.iter().map(|clip| clip.name.as_str()).collect::<Vec<_>>()
            ),
        }
        info!("Model attached as {:?}", id);
        self.mixer = Some(mixer);
        self.model = Some(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        resources::gltf_loader::tests::{dangling_index_model, tiny_model},
        showcase::content::tests::{test_shader, test_textures},
    };
    use cgmath::{Deg, Point3};
    use rand::SeedableRng;
    use std::{
        sync::{Mutex, Once},
        thread::{self, ThreadId},
    };

    fn demo() -> DemoState {
        DemoState::new(
            &SceneConfig::default(),
            test_textures(),
            test_shader(),
            Panel::new(800, 600, 1.0),
            SmallRng::seed_from_u64(42),
        )
    }

    fn view() -> (Camera, Projection) {
        (
            Camera::new((-10.0, 30.0, 30.0), (0.0, 0.0, 0.0)),
            Projection::new(800, 600, Deg(45.0), 0.1, 1000.0),
        )
    }

    fn looking_at(target: Point3<f32>) -> Camera {
        Camera::new(Point3::new(target.x, target.y, target.z + 20.0), target)
    }

    #[test]
    fn cube_rotation_follows_elapsed_time() {
        let mut demo = demo();
        let (camera, projection) = view();
        demo.tick(2500.0, 0.016, &camera, &projection);
        let cube = demo.scene.node(demo.ids.cube).unwrap();
        assert_eq!(cube.transform.rotation.x, Rad(2.5));
        assert_eq!(cube.transform.rotation.y, Rad(2.5));
    }

    #[test]
    fn sphere_bounces_within_ten_units() {
        let mut demo = demo();
        let (camera, projection) = view();
        for frame in 0..200 {
            demo.tick(frame as f32 * 16.0, 0.016, &camera, &projection);
            let y = demo.scene.node(demo.ids.sphere).unwrap().transform.position.y;
            assert!((0.0..=10.0).contains(&y));
            assert!((y - 10.0 * demo.step.sin().abs()).abs() < 1e-5);
        }
        assert!((demo.step - 2.0).abs() < 1e-4);
    }

    #[test]
    fn panel_values_reach_the_spot_light_each_frame() {
        let mut demo = demo();
        let (camera, projection) = view();
        demo.panel.set_number("angle", 0.7);
        demo.panel.set_number("penumbra", 0.3);
        demo.panel.set_number("intensity", 0.5);
        demo.tick(0.0, 0.0, &camera, &projection);
        let spot = demo.scene.spot_light_mut(demo.ids.spot_light).unwrap();
        assert_eq!(spot.angle, 0.7);
        assert_eq!(spot.penumbra, 0.3);
        assert_eq!(spot.intensity, 0.5);
    }

    #[test]
    fn panel_edits_recolour_the_sphere() {
        let mut demo = demo();
        let change = demo.panel.set_sphere_color(Color::from_hex(0xffea00));
        demo.apply_panel_change(change);
        let change = demo.panel.set_wireframe(true);
        demo.apply_panel_change(change);
        let material = &demo.scene.mesh(demo.ids.sphere).unwrap().materials[0];
        assert_eq!(material.color.to_hex(), 0xffea00);
        assert!(material.wireframe);
    }

    #[test]
    fn picking_the_sphere_turns_it_red() {
        let mut demo = demo();
        let projection = Projection::new(800, 600, Deg(45.0), 0.1, 1000.0);
        // the first tick moves the sphere to y = 10 * |sin(0.01)|
        let camera = looking_at(Point3::new(-10.0, 10.0 * 0.01f32.sin(), 0.0));
        demo.tick(0.0, 0.0, &camera, &projection);
        let material = &demo.scene.mesh(demo.ids.sphere).unwrap().materials[0];
        assert_eq!(material.color.to_hex(), 0xff0000);
    }

    #[test]
    fn picking_the_box_spins_it() {
        let mut demo = demo();
        let projection = Projection::new(800, 600, Deg(45.0), 0.1, 1000.0);
        let camera = looking_at(Point3::new(0.0, 15.0, 10.0));
        demo.tick(1500.0, 0.0, &camera, &projection);
        let textured_box = demo.scene.node(demo.ids.textured_box).unwrap();
        assert_eq!(textured_box.transform.rotation.x, Rad(1.5));
        assert_eq!(textured_box.transform.rotation.y, Rad(1.5));
        let sphere = &demo.scene.mesh(demo.ids.sphere).unwrap().materials[0];
        assert_eq!(sphere.color.to_hex(), 0x0000ff);
    }

    #[test]
    fn wire_plane_is_scattered_every_frame() {
        let mut demo = demo();
        let (camera, projection) = view();
        let before = demo.scene.mesh(demo.ids.wire_plane).unwrap().geometry.position.version();
        demo.tick(0.0, 0.016, &camera, &projection);
        let position = &demo.scene.mesh(demo.ids.wire_plane).unwrap().geometry.position;
        assert_eq!(position.version(), before.wrapping_add(1));
        let last = position.array.len() - 1;
        for idx in [0, 1, 2, last] {
            assert!((0.0..10.0).contains(&position.array[idx]));
        }
    }

    #[test]
    fn ticks_work_without_a_model() {
        let mut demo = demo();
        let (camera, projection) = view();
        assert!(demo.mixer.is_none());
        for frame in 0..5 {
            demo.tick(frame as f32 * 16.0, 0.016, &camera, &projection);
        }
        assert!(demo.mixer.is_none());
        assert!(demo.model.is_none());
    }

    #[test]
    fn attached_model_gets_a_mixer_with_a_prepared_action() {
        let mut demo = demo();
        let nodes = demo.scene.len();
        demo.attach_model(tiny_model("myAnimation"), [-12.0, 4.0, 10.0], "myAnimation");

        let root = demo.model.unwrap();
        let mixer = demo.mixer.as_ref().unwrap();
        assert_eq!(mixer.root(), root);
        assert_eq!(mixer.actions().len(), 1);
        assert_eq!(mixer.actions()[0].clip().name, "myAnimation");
        assert!(!mixer.actions()[0].is_running());
        assert_eq!(demo.scene.len(), nodes + 3);
        assert_eq!(
            demo.scene.node(root).unwrap().transform.position,
            cgmath::Vector3::new(-12.0, 4.0, 10.0)
        );

        // a prepared action does not move the model
        let (camera, projection) = view();
        let hat = demo.scene.node(root).unwrap().children()[1];
        demo.tick(0.0, 0.5, &camera, &projection);
        assert_eq!(
            demo.scene.node(hat).unwrap().transform.position,
            cgmath::Vector3::new(0.0, 1.0, 0.0)
        );
        assert_eq!(demo.mixer.as_ref().unwrap().time(), 0.5);
    }

    /// Collects log lines per thread so parallel tests do not see each
    /// other's records.
    struct ThreadLog(Mutex<Vec<(ThreadId, String)>>);

    impl log::Log for ThreadLog {
        fn enabled(&self, _: &log::Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            if let Ok(mut lines) = self.0.lock() {
                lines.push((thread::current().id(), record.args().to_string()));
            }
        }

        fn flush(&self) {}
    }

    static THREAD_LOG: ThreadLog = ThreadLog(Mutex::new(Vec::new()));

    fn lines_logged_here() -> Vec<String> {
        static INSTALL: Once = Once::new();
        INSTALL.call_once(|| {
            if log::set_logger(&THREAD_LOG).is_ok() {
                log::set_max_level(log::LevelFilter::Debug);
            }
        });
        let me = thread::current().id();
        THREAD_LOG
            .0
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == me)
            .map(|(_, line)| line.clone())
            .collect()
    }

    #[test]
    fn panel_edits_are_logged_once() {
        let mut demo = demo();
        let before = lines_logged_here().len();
        let change = demo.panel.set_wireframe(true);
        demo.apply_panel_change(change);
        let lines = lines_logged_here();
        let edits = lines[before..]
            .iter()
            .filter(|line| line.contains("wireframe"))
            .count();
        assert_eq!(edits, 1);
    }

    #[test]
    fn malformed_model_does_not_break_the_frame_loop() {
        let mut demo = demo();
        // in front of the camera, on the centre ray
        demo.attach_model(dangling_index_model(), [0.0, 0.0, 0.0], "myAnimation");
        let (camera, projection) = view();
        for frame in 0..3 {
            demo.tick(frame as f32 * 16.0, 0.016, &camera, &projection);
        }
        assert!(demo.model.is_some());
    }

    #[test]
    fn missing_clip_keeps_the_model_without_an_action() {
        let mut demo = demo();
        demo.attach_model(tiny_model("Take 001"), [-12.0, 4.0, 10.0], "myAnimation");
        assert!(demo.model.is_some());
        assert!(demo.mixer.as_ref().unwrap().actions().is_empty());
    }
}
