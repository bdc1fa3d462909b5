//! The playground scene as a [`GraphicsFlow`].
//!
//! [`Showcase::new`] loads the textures and the custom shader sources and
//! builds the static content. `on_init` places the camera and starts the
//! model download; the model is attached when [`DemoEvent::ModelLoaded`]
//! arrives. Every frame the [`DemoState`] is ticked and mirrored to the GPU.

use std::sync::Arc;

use cgmath::{Deg, Point3};
use instant::Instant;
use log::{error, info};
use rand::{SeedableRng, rngs::SmallRng};
use winit::event::WindowEvent;

use crate::{
    camera::Projection,
    config::SceneConfig,
    context::{Context, InitContext},
    flow::{Duration, FlowConstructor, FlowFuture, GraphicsFlow, Out},
    panel::Panel,
    pipelines::light::LightUniform,
    render::{Render, SceneRenderer},
    resources::{
        gltf_loader::{LoadedModel, load_model_gltf},
        load_shader_sources, load_texture_image,
    },
};

pub mod content;
pub mod state;

pub use content::{DemoTextures, SceneIds};
pub use state::DemoState;

pub enum DemoEvent {
    ModelLoaded(anyhow::Result<LoadedModel>),
}

pub struct Showcase {
    config: SceneConfig,
    demo: DemoState,
    renderer: SceneRenderer,
    start: Instant,
    panel_captured: bool,
}

impl Showcase {
    pub async fn new(ctx: InitContext) -> anyhow::Result<Self> {
        let config = SceneConfig::default();
        let shader = Arc::new(load_shader_sources(&config).await?);
        let (nebula, stars) = futures::join!(
            load_texture_image(config.nebula_texture),
            load_texture_image(config.stars_texture)
        );
        let panel = Panel::new(ctx.size.0, ctx.size.1, ctx.scale_factor as f32);
        let rng = SmallRng::seed_from_u64(instant::now().to_bits());
        let demo = DemoState::new(&config, DemoTextures { nebula, stars }, shader, panel, rng);
        info!("Scene built with {} nodes", demo.scene.len());
        Ok(Self {
            config,
            demo,
            renderer: SceneRenderer::new(&ctx),
            start: Instant::now(),
            panel_captured: false,
        })
    }
}

impl GraphicsFlow<(), DemoEvent> for Showcase {
    fn on_init(&mut self, ctx: &mut Context, _: &mut ()) -> Out<DemoEvent> {
        let camera = &mut ctx.camera.camera;
        camera.position = Point3::from(self.config.camera_position);
        camera.target = Point3::new(0.0, 0.0, 0.0);
        ctx.projection = Projection::new(
            ctx.config.width,
            ctx.config.height,
            Deg(self.config.camera_fovy_deg),
            self.config.camera_znear,
            self.config.camera_zfar,
        );
        self.start = Instant::now();

        let model = self.config.model;
        let load: FlowFuture<DemoEvent> =
            Box::pin(async move { DemoEvent::ModelLoaded(load_model_gltf(model).await) });
        Out::FutEvent(vec![load])
    }

    fn on_update(&mut self, ctx: &Context, _: &mut (), dt: Duration) -> Out<DemoEvent> {
        let elapsed_ms = self.start.elapsed().as_secs_f32() * 1000.0;
        self.demo.tick(
            elapsed_ms,
            dt.as_secs_f32(),
            &ctx.camera.camera,
            &ctx.projection,
        );
        self.renderer.prepare(ctx, &self.demo.scene);
        self.renderer.prepare_overlay(ctx, &self.demo.panel);

        let lights = LightUniform::from_scene(&self.demo.scene);
        Out::Configure(Box::new(move |ctx: &mut Context| {
            ctx.light.uniform = lights;
            ctx.light.upload(&ctx.queue);
        }))
    }

    fn on_window_events(&mut self, _: &Context, _: &mut (), event: &WindowEvent) -> Out<DemoEvent> {
        if let WindowEvent::Resized(size) = event {
            if size.width > 0 && size.height > 0 {
                self.demo.panel.resize(size.width, size.height);
            }
            return Out::Empty;
        }

        let (captured, change) = self.demo.panel.handle_window_event(event);
        if let Some(change) = change {
            self.demo.apply_panel_change(change);
        }
        if captured == self.panel_captured {
            return Out::Empty;
        }
        self.panel_captured = captured;
        Out::Configure(Box::new(move |ctx: &mut Context| {
            let controller = &mut ctx.camera.controller;
            controller.enabled = !captured;
            if captured {
                controller.release();
            }
        }))
    }

    fn on_custom_events(&mut self, _: &Context, _: &mut (), event: DemoEvent) -> Option<DemoEvent> {
        match event {
            DemoEvent::ModelLoaded(Ok(model)) => {
                self.demo
                    .attach_model(model, self.config.model_position, self.config.clip_name);
            }
            DemoEvent::ModelLoaded(Err(e)) => {
                error!("Failed to load {}: {:#}", self.config.model, e);
            }
        }
        None
    }

    fn on_render(&self) -> Render<'_> {
        (&self.renderer).into()
    }

    #[cfg(feature = "integration-tests")]
    fn render_to_texture(
        &self,
        _: &Context,
        _: &mut (),
        _: &mut image::ImageBuffer<image::Rgba<u8>, wgpu::BufferView>,
    ) -> Result<crate::flow::ImageTestResult, anyhow::Error> {
        Ok(crate::flow::ImageTestResult::Passed)
    }
}

/// Open the window and run the playground until it is closed.
pub fn run() -> anyhow::Result<()> {
    let showcase: FlowConstructor<(), DemoEvent> = Box::new(|ctx| {
        Box::pin(async move {
            let flow: Box<dyn GraphicsFlow<(), DemoEvent>> = Box::new(Showcase::new(ctx).await?);
            anyhow::Ok(flow)
        })
    });
    crate::flow::run(vec![showcase])
}
