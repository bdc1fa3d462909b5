#[cfg(feature = "integration-tests")]
use flow_playground::{
    context::Context,
    flow::{Duration, FlowConstructor, FlowFuture, GraphicsFlow, ImageTestResult, Out},
    render::Render,
};
#[cfg(feature = "integration-tests")]
use wgpu::Color;

#[cfg(feature = "integration-tests")]
#[derive(Default)]
struct State {
    init_invocations: u32,
    update_invocations: u32,
    received_at: Option<u32>,
}

#[cfg(feature = "integration-tests")]
enum Event {
    Test,
}

#[cfg(feature = "integration-tests")]
struct GraphicsElement;

#[cfg(feature = "integration-tests")]
impl GraphicsFlow<State, Event> for GraphicsElement {
    fn on_init(&mut self, ctx: &mut Context, state: &mut State) -> Out<Event> {
        ctx.clear_colour = Color::TRANSPARENT;
        assert_eq!(state.init_invocations, 0);
        assert_eq!(state.update_invocations, 0);
        state.init_invocations += 1;
        Out::Empty
    }

    fn on_update(&mut self, _: &Context, state: &mut State, _: Duration) -> Out<Event> {
        assert_eq!(state.init_invocations, 1);
        state.update_invocations += 1;
        match state.update_invocations {
            3 => {
                let event: FlowFuture<Event> = Box::pin(async move { Event::Test });
                Out::FutEvent(vec![event])
            }
            4 => Out::Configure(Box::new(|ctx: &mut Context| {
                ctx.clear_colour = Color::RED;
            })),
            _ => Out::Empty,
        }
    }

    fn on_window_events(
        &mut self,
        _: &Context,
        _: &mut State,
        _: &flow_playground::WindowEvent,
    ) -> Out<Event> {
        Out::Empty
    }

    fn on_custom_events(&mut self, _: &Context, state: &mut State, event: Event) -> Option<Event> {
        // the future is handed out in frame 3
        assert!(state.update_invocations >= 3);
        match event {
            Event::Test => state.received_at = Some(state.update_invocations),
        }
        None
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
        if state.update_invocations > 4 {
            assert_eq!(ctx.clear_colour, Color::RED);
        }
        match state.received_at {
            Some(_) if state.update_invocations > 4 => Ok(ImageTestResult::Passed),
            _ if state.update_invocations > 500 => Err(anyhow::anyhow!("the flow event never arrived")),
            _ => Ok(ImageTestResult::Waiting),
        }
    }
}

#[test]
#[cfg(feature = "integration-tests")]
fn should_run_every_lifecycle_hook() {
    let constructor: FlowConstructor<State, Event> = Box::new(|_| {
        Box::pin(async move {
            let flow: Box<dyn GraphicsFlow<_, _>> = Box::new(GraphicsElement);
            anyhow::Ok(flow)
        })
    });

    if let Err(e) = flow_playground::flow::run(vec![constructor]) {
        panic!("{}", e);
    }
}
