#[cfg(feature = "integration-tests")]
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

#[cfg(feature = "integration-tests")]
use flow_playground::{
    context::Context,
    flow::{Duration, FlowConstructor, GraphicsFlow, ImageTestResult, Out},
    render::Render,
};

#[cfg(feature = "integration-tests")]
const WIDTH: u32 = 640;
#[cfg(feature = "integration-tests")]
const HEIGHT: u32 = 320;

#[cfg(feature = "integration-tests")]
#[derive(Default)]
struct State {
    updates: u32,
}

#[cfg(feature = "integration-tests")]
#[derive(Default)]
struct Resizer {
    resized: Arc<AtomicBool>,
    minimized: Arc<AtomicBool>,
}

#[cfg(feature = "integration-tests")]
impl GraphicsFlow<State, ()> for Resizer {
    fn on_init(&mut self, _: &mut Context, _: &mut State) -> Out<()> {
        Out::Empty
    }

    fn on_update(&mut self, _: &Context, state: &mut State, _: Duration) -> Out<()> {
        state.updates += 1;
        match state.updates {
            2 => {
                let resized = self.resized.clone();
                Out::Configure(Box::new(move |ctx: &mut Context| {
                    resized.store(ctx.resize(WIDTH, HEIGHT), Ordering::SeqCst);
                }))
            }
            3 => {
                let minimized = self.minimized.clone();
                Out::Configure(Box::new(move |ctx: &mut Context| {
                    // a minimized window reports zero sizes
                    let accepted = ctx.resize(0, HEIGHT) || ctx.resize(WIDTH, 0);
                    minimized.store(!accepted, Ordering::SeqCst);
                }))
            }
            _ => Out::Empty,
        }
    }

    fn on_window_events(
        &mut self,
        _: &Context,
        _: &mut State,
        _: &flow_playground::WindowEvent,
    ) -> Out<()> {
        Out::Empty
    }

    fn on_custom_events(&mut self, _: &Context, _: &mut State, event: ()) -> Option<()> {
        Some(event)
    }

    fn on_render(&self) -> Render<'_> {
        Render::None
    }

    fn render_to_texture(
        &self,
        ctx: &Context,
        state: &mut State,
        _: &mut image::ImageBuffer<image::Rgba<u8>, wgpu::BufferView>,
    ) -> Result<ImageTestResult, anyhow::Error> {
        if state.updates < 3 {
            return Ok(ImageTestResult::Waiting);
        }
        assert!(self.resized.load(Ordering::SeqCst));
        assert!(self.minimized.load(Ordering::SeqCst));
        assert_eq!((ctx.config.width, ctx.config.height), (WIDTH, HEIGHT));
        assert_eq!(ctx.projection.aspect(), WIDTH as f32 / HEIGHT as f32);
        Ok(ImageTestResult::Passed)
    }
}

#[test]
#[cfg(feature = "integration-tests")]
fn resize_reconfigures_the_surface_and_ignores_zero_sizes() {
    let constructor: FlowConstructor<State, ()> = Box::new(|_| {
        Box::pin(async move {
            let flow: Box<dyn GraphicsFlow<_, _>> = Box::new(Resizer::default());
            anyhow::Ok(flow)
        })
    });

    if let Err(e) = flow_playground::flow::run(vec![constructor]) {
        panic!("{}", e);
    }
}
