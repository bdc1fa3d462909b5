//! The fixed content of the playground: primitives, helpers, lights, fog and
//! the skybox.

use std::{f32::consts::FRAC_PI_2, sync::Arc};

use cgmath::Rad;
use rand::Rng;

use crate::{
    config::SceneConfig,
    data_structures::{
        geometry::{Geometry, Lines},
        material::{Color, Material, ShaderSource, Side, TextureId, TextureImage},
        scene_graph::{
            AmbientLight, Background, FogExp2, Mesh, NodeId, NodeKind, NodeTemplate, SceneGraph,
            SpotLight, SpotLightHelper,
        },
    },
};

/// The two images shared by the skybox and the textured cube.
#[derive(Clone, Debug)]
pub struct DemoTextures {
    pub nebula: TextureImage,
    pub stars: TextureImage,
}

/// Nodes the frame loop and the panel write to.
#[derive(Clone, Copy, Debug)]
pub struct SceneIds {
    pub axes: NodeId,
    pub cube: NodeId,
    pub ground: NodeId,
    pub grid: NodeId,
    pub sphere: NodeId,
    pub ambient_light: NodeId,
    pub spot_light: NodeId,
    pub spot_light_helper: NodeId,
    pub textured_box: NodeId,
    pub wire_plane: NodeId,
    pub shader_sphere: NodeId,
    pub nebula: TextureId,
    pub stars: TextureId,
}

/// Lower position scalars 0, 1, 2 and the last one by `10 * r` each.
pub fn jitter_down(position: &mut [f32], rng: &mut impl Rng) {
    let Some(last) = position.len().checked_sub(1) else {
        return;
    };
    for idx in [0, 1, 2, last] {
        if let Some(value) = position.get_mut(idx) {
            *value -= 10.0 * rng.random::<f32>();
        }
    }
}

/// Overwrite position scalars 0, 1, 2 and the last one with `10 * r`.
pub fn scatter(position: &mut [f32], rng: &mut impl Rng) {
    let Some(last) = position.len().checked_sub(1) else {
        return;
    };
    for idx in [0, 1, 2, last] {
        if let Some(value) = position.get_mut(idx) {
            *value = 10.0 * rng.random::<f32>();
        }
    }
}

pub fn build_scene(
    config: &SceneConfig,
    textures: DemoTextures,
    shader: Arc<ShaderSource>,
    rng: &mut impl Rng,
) -> (SceneGraph, SceneIds) {
    let mut scene = SceneGraph::new();

    let axes = scene.add(NodeTemplate::new(NodeKind::Lines(Lines::axes(5.0))).named("axes"));

    let cube = scene.add(
        NodeTemplate::mesh(Mesh::new(
            Geometry::cuboid(1.0, 1.0, 1.0),
            Material::basic(Color::from_hex(0x00ff00)),
        ))
        .named("cube"),
    );

    let mut ground_mesh = Mesh::new(
        Geometry::plane(30.0, 30.0, 1, 1),
        Material::standard(Color::WHITE).with_side(Side::Double),
    );
    ground_mesh.receive_shadow = true;
    let mut ground = NodeTemplate::mesh(ground_mesh).named("ground");
    ground.transform.rotation.x = Rad(-FRAC_PI_2);
    let ground = scene.add(ground);

    let grid = scene.add(
        NodeTemplate::new(NodeKind::Lines(Lines::grid(
            30.0,
            10,
            Color::from_hex(0x444444),
            Color::from_hex(0x888888),
        )))
        .named("grid"),
    );

    let mut sphere_mesh = Mesh::new(
        Geometry::sphere(4.0, 50, 50),
        Material::standard(Color::from_hex(0x0000ff)),
    );
    sphere_mesh.cast_shadow = true;
    let sphere = scene.add(
        NodeTemplate::mesh(sphere_mesh)
            .named("sphere")
            .at(-10.0, 10.0, 0.0),
    );

    let ambient_light = scene.add(
        NodeTemplate::new(NodeKind::AmbientLight(AmbientLight {
            color: Color::from_hex(config.ambient_colour),
            intensity: 1.0,
        }))
        .named("ambient light"),
    );

    let mut spot = SpotLight::new(Color::WHITE);
    spot.cast_shadow = true;
    spot.angle = 0.2;
    let [x, y, z] = config.spot_light_position;
    let spot_light = scene.add(
        NodeTemplate::new(NodeKind::SpotLight(spot))
            .named("spot light")
            .at(x, y, z),
    );
    let spot_light_helper = scene.add(
        NodeTemplate::new(NodeKind::SpotLightHelper(SpotLightHelper {
            light: spot_light,
            cone: Lines::unit_cone(Color::WHITE),
        }))
        .named("spot light helper"),
    );

    scene.fog = Some(FogExp2 {
        color: Color::from_hex(config.fog_colour),
        density: config.fog_density,
    });

    let nebula = scene.add_texture(textures.nebula);
    let stars = scene.add_texture(textures.stars);
    scene.background = Background::CubeMap([nebula, nebula, stars, stars, stars, stars]);

    let box_faces = [stars, stars, nebula, stars, nebula, stars]
        .map(Material::textured)
        .to_vec();
    let textured_box = scene.add(
        NodeTemplate::mesh(Mesh::with_materials(Geometry::cuboid(4.0, 4.0, 4.0), box_faces))
            .named(config.pick_tag)
            .at(0.0, 15.0, 10.0),
    );

    let mut wire_geometry = Geometry::plane(10.0, 10.0, 10, 10);
    jitter_down(&mut wire_geometry.position.array, rng);
    let wire_plane = scene.add(
        NodeTemplate::mesh(Mesh::new(
            wire_geometry,
            Material::basic(Color::WHITE).with_wireframe(true),
        ))
        .named("wire plane")
        .at(10.0, 10.0, 15.0),
    );

    let shader_sphere = scene.add(
        NodeTemplate::mesh(Mesh::new(Geometry::sphere(4.0, 32, 16), Material::shader(shader)))
            .named("shader sphere")
            .at(-5.0, 10.0, 10.0),
    );

    scene.update_world_transforms();
    scene.update_spot_light_helper(spot_light_helper);
    scene.update_world_transforms();

    let ids = SceneIds {
        axes,
        cube,
        ground,
        grid,
        sphere,
        ambient_light,
        spot_light,
        spot_light_helper,
        textured_box,
        wire_plane,
        shader_sphere,
        nebula,
        stars,
    };
    (scene, ids)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::SmallRng};

    pub(crate) fn test_textures() -> DemoTextures {
        DemoTextures {
            nebula: TextureImage::placeholder("nebula.jpg"),
            stars: TextureImage::placeholder("stars.jpg"),
        }
    }

    pub(crate) fn test_shader() -> Arc<ShaderSource> {
        Arc::new(ShaderSource {
            vertex: "// vertex".to_string(),
            fragment: "// fragment".to_string(),
        })
    }

    fn scene() -> (SceneGraph, SceneIds) {
        let mut rng = SmallRng::seed_from_u64(7);
        build_scene(&SceneConfig::default(), test_textures(), test_shader(), &mut rng)
    }

    #[test]
    fn skybox_faces_follow_the_cube_map_order() {
        let (scene, ids) = scene();
        assert_eq!(
            scene.background,
            Background::CubeMap([ids.nebula, ids.nebula, ids.stars, ids.stars, ids.stars, ids.stars])
        );
        assert_eq!(scene.texture(ids.nebula).map(|t| t.label.as_str()), Some("nebula.jpg"));
    }

    #[test]
    fn textured_box_has_one_material_per_face() {
        let (scene, ids) = scene();
        let mesh = scene.mesh(ids.textured_box).unwrap();
        let maps: Vec<_> = mesh.materials.iter().map(|m| m.map).collect();
        let (n, s) = (Some(ids.nebula), Some(ids.stars));
        assert_eq!(maps, vec![s, s, n, s, n, s]);
        assert_eq!(mesh.geometry.groups.len(), 6);
        assert_eq!(scene.find_by_name("theBox"), Some(ids.textured_box));
    }

    #[test]
    fn ground_lies_flat_and_receives_shadows() {
        let (scene, ids) = scene();
        let ground = scene.node(ids.ground).unwrap();
        assert_eq!(ground.transform.rotation.x, Rad(-FRAC_PI_2));
        let mesh = ground.as_mesh().unwrap();
        assert!(mesh.receive_shadow);
        assert_eq!(mesh.materials[0].side, Side::Double);
    }

    #[test]
    fn sphere_starts_blue_and_casts_shadows() {
        let (scene, ids) = scene();
        let sphere = scene.mesh(ids.sphere).unwrap();
        assert_eq!(sphere.materials[0].color.to_hex(), 0x0000ff);
        assert!(sphere.cast_shadow);
        assert_eq!(sphere.geometry.vertex_count(), 51 * 51);

        let shader_sphere = scene.mesh(ids.shader_sphere).unwrap();
        assert_eq!(shader_sphere.geometry.vertex_count(), 33 * 17);
    }

    #[test]
    fn spot_light_is_set_up_for_shadows() {
        let (mut scene, ids) = scene();
        let spot = scene.spot_light_mut(ids.spot_light).unwrap();
        assert!(spot.cast_shadow);
        assert_eq!(spot.angle, 0.2);
        let helper = scene.node(ids.spot_light_helper).unwrap();
        assert_eq!(helper.transform.position, cgmath::Vector3::new(-100.0, 100.0, 0.0));
    }

    #[test]
    fn wire_plane_is_perturbed_at_construction() {
        let (scene, ids) = scene();
        let mesh = scene.mesh(ids.wire_plane).unwrap();
        let reference = Geometry::plane(10.0, 10.0, 10, 10);
        let position = &mesh.geometry.position.array;
        let last = position.len() - 1;
        for idx in [0, 1, 2, last] {
            let lowered = reference.position.array[idx] - position[idx];
            assert!((0.0..10.0).contains(&lowered), "scalar {} lowered by {}", idx, lowered);
        }
        // everything else is untouched
        assert_eq!(position[3..last], reference.position.array[3..last]);
        assert!(mesh.materials[0].wireframe);
    }

    #[test]
    fn scatter_draws_fresh_values() {
        let mut rng = SmallRng::seed_from_u64(1);
        let mut position = vec![-50.0; 9];
        scatter(&mut position, &mut rng);
        for idx in [0, 1, 2, 8] {
            assert!((0.0..10.0).contains(&position[idx]));
        }
        assert_eq!(position[3..8], [-50.0; 5]);

        let mut empty: Vec<f32> = Vec::new();
        scatter(&mut empty, &mut rng);
        assert!(empty.is_empty());
    }
}
