//! Compile-time configuration of the playground scene.
//!
//! Everything the scene builder, the loader and the frame loop need to know
//! about asset names, camera lens and light placement lives in
//! [`SceneConfig`]. The defaults reproduce the reference scene; tests build
//! modified copies to exercise edge cases.

/// Asset names, DOM ids and scene constants.
#[derive(Clone, Debug)]
pub struct SceneConfig {
    /// Image used for two skybox faces and two faces of the textured cube.
    pub nebula_texture: &'static str,
    /// Image used for the remaining skybox and cube faces.
    pub stars_texture: &'static str,
    /// Binary glTF model fetched asynchronously after bootstrap.
    pub model: &'static str,
    /// Name of the animation clip prepared on the loaded model.
    pub clip_name: &'static str,
    /// DOM element id (web) or asset file stem (native) of the vertex source.
    pub vertex_shader_id: &'static str,
    /// DOM element id (web) or asset file stem (native) of the fragment source.
    pub fragment_shader_id: &'static str,
    /// Name tag of the pickable textured cube.
    pub pick_tag: &'static str,
    pub camera_position: [f32; 3],
    pub camera_fovy_deg: f32,
    pub camera_znear: f32,
    pub camera_zfar: f32,
    pub model_position: [f32; 3],
    pub spot_light_position: [f32; 3],
    pub ambient_colour: u32,
    pub fog_colour: u32,
    pub fog_density: f32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            nebula_texture: "nebula.jpg",
            stars_texture: "stars.jpg",
            model: "monkey.glb",
            clip_name: "myAnimation",
            vertex_shader_id: "vertexShader",
            fragment_shader_id: "fragmentShader",
            pick_tag: "theBox",
            camera_position: [-10.0, 30.0, 30.0],
            camera_fovy_deg: 45.0,
            camera_znear: 0.1,
            camera_zfar: 1000.0,
            model_position: [-12.0, 4.0, 10.0],
            spot_light_position: [-100.0, 100.0, 0.0],
            ambient_colour: 0x333333,
            fog_colour: 0xffffff,
            fog_density: 0.01,
        }
    }
}
