#![allow(dead_code)]

#[cfg(feature = "integration-tests")]
use flow_playground::{
    context::Context,
    flow::{Duration, GraphicsFlow, ImageTestResult, Out},
    render::Render,
};

#[derive(Default)]
pub(crate) struct FrameCounter(pub(crate) u32);

impl FrameCounter {
    pub(crate) fn frame(&self) -> u32 {
        self.0
    }

    pub(crate) fn progress(&mut self) {
        self.0 += 1;
    }
}

#[cfg(feature = "integration-tests")]
pub(crate) type Validate = Box<
    dyn Fn(
        &Context,
        &mut FrameCounter,
        &mut image::ImageBuffer<image::Rgba<u8>, wgpu::BufferView>,
    ) -> Result<ImageTestResult, anyhow::Error>,
>;

/// A flow that renders nothing, configures the context once and checks
/// every rendered frame with `validate`.
#[cfg(feature = "integration-tests")]
pub(crate) struct TestRender {
    pub(crate) setup: Box<dyn Fn(&mut Context)>,
    pub(crate) validate: Validate,
}

#[cfg(feature = "integration-tests")]
impl TestRender {
    pub(crate) fn new(setup: impl Fn(&mut Context) + 'static, validate: Validate) -> Self {
        Self {
            setup: Box::new(setup),
            validate,
        }
    }
}

#[cfg(feature = "integration-tests")]
impl GraphicsFlow<FrameCounter, ()> for TestRender {
    fn on_init(&mut self, ctx: &mut Context, _: &mut FrameCounter) -> Out<()> {
        (self.setup)(ctx);
        Out::Empty
    }

    fn on_update(&mut self, _: &Context, state: &mut FrameCounter, _: Duration) -> Out<()> {
        state.progress();
        Out::Empty
    }

    fn on_window_events(
        &mut self,
        _: &Context,
        _: &mut FrameCounter,
        _: &flow_playground::WindowEvent,
    ) -> Out<()> {
        Out::Empty
    }

    fn on_custom_events(&mut self, _: &Context, _: &mut FrameCounter, event: ()) -> Option<()> {
        Some(event)
    }

    fn on_render(&self) -> Render<'_> {
        Render::None
    }

    fn render_to_texture(
        &self,
        ctx: &Context,
        state: &mut FrameCounter,
        texture: &mut image::ImageBuffer<image::Rgba<u8>, wgpu::BufferView>,
    ) -> Result<ImageTestResult, anyhow::Error> {
        (self.validate)(ctx, state, texture)
    }
}

#[macro_export]
macro_rules! golden_image_test {
    ($graphics_elem:expr) => {{
        use crate::common::test_utils::FrameCounter;
        use flow_playground::flow::{FlowConstructor, GraphicsFlow};
        let constructor: FlowConstructor<FrameCounter, ()> = Box::new(|_| {
            Box::pin(async move {
                let g_flow: Box<dyn GraphicsFlow<FrameCounter, ()>> = Box::new($graphics_elem);
                anyhow::Ok(g_flow)
            })
        });

        flow_playground::flow::run(vec![constructor])
            .expect("Failed to run flow for integration test.");
    }};
}
