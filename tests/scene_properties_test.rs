use std::sync::Arc;

use flow_playground::{
    Deg, Rad,
    camera::{Camera, Projection},
    config::SceneConfig,
    data_structures::{
        material::{ShaderSource, TextureImage},
        scene_graph::Background,
    },
    panel::{Panel, PanelChange},
    showcase::{DemoState, DemoTextures},
};
use rand::{SeedableRng, rngs::SmallRng};

fn demo(seed: u64) -> DemoState {
    DemoState::new(
        &SceneConfig::default(),
        DemoTextures {
            nebula: TextureImage::placeholder("nebula.jpg"),
            stars: TextureImage::placeholder("stars.jpg"),
        },
        Arc::new(ShaderSource {
            vertex: String::new(),
            fragment: String::new(),
        }),
        Panel::new(1280, 720, 1.0),
        SmallRng::seed_from_u64(seed),
    )
}

fn default_view() -> (Camera, Projection) {
    let config = SceneConfig::default();
    (
        Camera::new(config.camera_position, [0.0, 0.0, 0.0]),
        Projection::new(
            1280,
            720,
            Deg(config.camera_fovy_deg),
            config.camera_znear,
            config.camera_zfar,
        ),
    )
}

#[test]
fn frame_loop_animates_the_scene() {
    let mut demo = demo(3);
    let (camera, projection) = default_view();
    let mut elapsed = 0.0;
    for _ in 0..120 {
        elapsed += 16.0;
        demo.tick(elapsed, 0.016, &camera, &projection);
    }

    let cube = demo.scene.node(demo.ids.cube).unwrap();
    assert_eq!(cube.transform.rotation.x, Rad(elapsed / 1000.0));
    assert_eq!(cube.transform.rotation.y, Rad(elapsed / 1000.0));

    let sphere_y = demo.scene.node(demo.ids.sphere).unwrap().transform.position.y;
    assert!((0.0..=10.0).contains(&sphere_y));
    assert!((sphere_y - 10.0 * demo.step.sin().abs()).abs() < 1e-5);

    let position = &demo.scene.mesh(demo.ids.wire_plane).unwrap().geometry.position;
    assert_eq!(position.version(), 120);
    let last = position.array.len() - 1;
    for idx in [0, 1, 2, last] {
        assert!((0.0..10.0).contains(&position.array[idx]));
    }
}

#[test]
fn skybox_uses_nebula_on_the_x_faces() {
    let demo = demo(1);
    let Background::CubeMap(faces) = &demo.scene.background else {
        panic!("the scene has no cube map background");
    };
    let labels: Vec<_> = faces
        .iter()
        .map(|id| demo.scene.texture(*id).unwrap().label.as_str())
        .collect();
    assert_eq!(
        labels,
        ["nebula.jpg", "nebula.jpg", "stars.jpg", "stars.jpg", "stars.jpg", "stars.jpg"]
    );
}

#[test]
fn panel_clamps_numbers_to_their_ranges() {
    let mut demo = demo(1);
    assert_eq!(
        demo.panel.set_number("speed", 3.0),
        Some(PanelChange::Speed(0.1))
    );
    assert_eq!(
        demo.panel.set_number("angle", -1.0),
        Some(PanelChange::Angle(0.0))
    );
    assert_eq!(
        demo.panel.set_number("intensity", 0.25),
        Some(PanelChange::Intensity(0.25))
    );
    assert_eq!(demo.panel.set_number("sphereColor", 0.5), None);
    assert_eq!(demo.panel.options().speed, 0.1);
}

#[test]
fn mixer_is_absent_until_a_model_arrives() {
    let mut demo = demo(9);
    let (camera, projection) = default_view();
    for frame in 0..10 {
        demo.tick(frame as f32 * 16.0, 0.016, &camera, &projection);
    }
    assert!(demo.mixer.is_none());
    assert!(demo.model.is_none());
}

#[test]
fn resize_updates_aspect_ratio() {
    let (_, mut projection) = default_view();
    projection.resize(1024, 256);
    assert_eq!(projection.aspect(), 4.0);

    let mut panel = Panel::new(800, 600, 1.0);
    let version = panel.version();
    panel.resize(1024, 256);
    assert_ne!(panel.version(), version);
}
