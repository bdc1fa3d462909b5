//! Flow control and application event loop.
//!
//! This module provides the main event loop and the flow abstraction. A
//! "flow" is a scene or application state that handles user input, updates
//! its simulation and describes what to render each frame. The engine owns
//! the window and GPU context, distributes events to every flow and draws
//! their combined renders.
//!
//! # User-facing types
//!
//! - [`GraphicsFlow<S, E>`] is the trait for scenes/states that handle events and rendering
//! - [`Out<E>`] is the output type for async event handling and context configuration
//!
//! # Lifecycle Flow
//!
//! The event loop follows this pattern each frame:
//! 1. Distribute window events to the flows, then to the orbit controller
//! 2. Hand results of finished flow futures to `on_custom_events`
//! 3. Apply the orbit controller to the camera
//! 4. Update flow state via `on_update`
//! 5. Collect the flows' renders and sort them into batches
//! 6. Render the spot light shadow map, then the frame
//! 7. Present frame

use std::{fmt::Debug, iter, pin::Pin, sync::Arc};

use instant::Instant;
pub use instant::Duration;

#[cfg(feature = "integration-tests")]
use tokio::runtime::Runtime;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    window::Window,
};

#[cfg(feature = "integration-tests")]
use crate::data_structures::texture::Texture;
use crate::{
    context::{Context, InitContext},
    render::{Batches, Instanced, Shade},
};

/// A future resolving to a custom event. It is `Send` on native targets
/// because it runs on the tokio runtime.
#[cfg(not(target_arch = "wasm32"))]
pub type FlowFuture<E> = Pin<Box<dyn Future<Output = E> + Send>>;
#[cfg(target_arch = "wasm32")]
pub type FlowFuture<E> = Pin<Box<dyn Future<Output = E>>>;

///
/// This is the Output Type for every lifecycle hook where the user can pass async events that are
/// handled according to the platform you're running on.
///
/// `Out::FutEvent` runs futures on the async runtime without blocking the frame loop. Each
/// resolved event is delivered to `on_custom_events` of the flows on a later frame.
///
/// `Out::Configure` can be used to modify the Context during runtime for instance to change the
/// clear colour, upload the lights or disable the orbit controller.
///
/// `Empty` is the default output used when no eventing/futures need to be handled.
///
pub enum Out<E> {
    FutEvent(Vec<FlowFuture<E>>),
    Configure(Box<dyn FnOnce(&mut Context)>),
    Empty,
}

impl<E> Default for Out<E> {
    fn default() -> Self {
        Self::Empty
    }
}

#[cfg(feature = "integration-tests")]
pub enum ImageTestResult {
    Passed,
    Waiting,
    Failed,
}

/// Trait for implementing a renderable scene or application state.
///
/// # Lifecycle
///
/// 1. `on_init()` is called once when the flow is created; configure context (camera, clear color, etc.)
/// 2. `on_window_events()` is called for each winit window event, before the orbit controller sees it
/// 3. `on_custom_events()` is called for events produced by `Out::FutEvent`
/// 4. `on_update()` is called every frame
/// 5. `on_render()` is called each frame and specifies how to render `self`
///
pub trait GraphicsFlow<S, E> {
    /// Initialize the flow and configure the context.
    ///
    /// This is the place to configure things such as the background colour or the camera
    /// start position and lens.
    fn on_init(&mut self, ctx: &mut Context, state: &mut S) -> Out<E>;

    /// Update state every frame.
    ///
    /// Called every frame with the elapsed time `dt`. Use for animations,
    /// physics updates, and other per-frame logic.
    fn on_update(&mut self, ctx: &Context, state: &mut S, dt: Duration) -> Out<E>;

    /// Handle window events (keyboard, mouse, window resizing, etc.).
    fn on_window_events(&mut self, ctx: &Context, state: &mut S, event: &WindowEvent) -> Out<E>;

    /// Handle custom application events.
    ///
    /// Returns the event if it was not consumed, allowing it to be passed to
    /// the next flow. Returning `None` means the event was consumed.
    fn on_custom_events(&mut self, ctx: &Context, state: &mut S, event: E) -> Option<E>;

    /// Return renderable objects for this flow.
    ///
    /// Called each frame. Collect your objects into a [`Render`](crate::render::Render)
    /// and return it. The engine will batch and render all flows' renders in
    /// pipeline order.
    fn on_render(&self) -> crate::render::Render<'_>;

    #[cfg(feature = "integration-tests")]
    fn render_to_texture(
        &self,
        ctx: &Context,
        state: &mut S,
        texture: &mut image::ImageBuffer<image::Rgba<u8>, wgpu::BufferView>,
    ) -> Result<ImageTestResult, anyhow::Error>;
}

// Dummy impl to make wasm work
impl<State, Event> Debug for dyn GraphicsFlow<State, Event> + 'static {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("GraphicsFlow")
    }
}

/// Type alias for a flow constructor (factory function).
///
/// A flow constructor takes an `InitContext` and asynchronously returns a
/// boxed `GraphicsFlow`. This allows resource loading before the first frame.
/// A failing constructor aborts the application start.
pub type FlowConstructor<S, E> = Box<
    dyn FnOnce(InitContext) -> Pin<Box<dyn Future<Output = anyhow::Result<Box<dyn GraphicsFlow<S, E>>>>>>,
>;

/// Application state bundle: GPU context, app state, and surface status.
#[derive(Debug)]
pub struct AppState<State: 'static> {
    pub(crate) ctx: Context,
    state: State,
    is_surface_configured: bool,
}

impl<State: 'static + Default> AppState<State> {
    async fn new(window: Arc<Window>) -> Self {
        let ctx = match Context::new(window).await {
            Ok(ctx) => ctx,
            Err(e) => panic!(
                "App initialization failed. Cannot create the main context: {:#}",
                e
            ),
        };
        Self {
            ctx,
            state: State::default(),
            is_surface_configured: false,
        }
    }
}

impl<State: 'static> AppState<State> {
    /// Follow the surface size. Zero sized surfaces (minimized windows) are
    /// ignored and the previous configuration is kept.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        let resized = self.ctx.resize(width, height);
        self.is_surface_configured |= resized;
        resized
    }

    #[cfg(feature = "integration-tests")]
    fn get_test_texture(&self, extent3d: wgpu::Extent3d) -> wgpu::Texture {
        self.ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Golden Image Test Output Texture"),
            size: extent3d,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.ctx.config.format,
            usage: wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        })
    }

    #[cfg(feature = "integration-tests")]
    fn get_test_depth_texture(&self, extent3d: wgpu::Extent3d) -> wgpu::Texture {
        self.ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Golden Image Test Depth Texture"),
            size: extent3d,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Texture::DEPTH_FORMAT,
            usage: wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        })
    }

    #[cfg(feature = "integration-tests")]
    fn get_with_height(&self) -> (u32, u32) {
        // Buffer copies need rows aligned to 256 bytes
        let width = self.ctx.config.width.div_ceil(64) * 64;
        let height = self.ctx.config.height;
        (width, height)
    }

    #[cfg(feature = "integration-tests")]
    fn get_test_3d_extent(&self) -> wgpu::Extent3d {
        let (width, height) = self.get_with_height();
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        }
    }

    fn render<Event: 'static>(
        &mut self,
        graphics_flows: &mut [Box<dyn GraphicsFlow<State, Event>>],
        #[cfg(feature = "integration-tests")] async_runtime: &Runtime,
        #[cfg(feature = "integration-tests")] event_loop: &EventLoopProxy<FlowEvent<State, Event>>,
    ) -> Result<(), wgpu::SurfaceError> {
        // invoke main render loop
        self.ctx.window.request_redraw();

        // Rendering requires the surface to be configured
        if !self.is_surface_configured {
            return Ok(());
        }

        let output = self.ctx.surface.get_current_texture()?;
        #[cfg(not(feature = "integration-tests"))]
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        #[cfg(feature = "integration-tests")]
        let (tex, depth) = {
            let extent3d = self.get_test_3d_extent();
            let tex = self.get_test_texture(extent3d);
            let depth = self.get_test_depth_texture(extent3d);
            (tex, depth)
        };

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        let mut batches = Batches::default();
        graphics_flows
            .iter()
            .for_each(|flow| flow.on_render().set_pipelines(&mut batches));
        batches.sort_transparent(self.ctx.camera.camera.position);

        if self.ctx.light.shadows_enabled() {
            let mut shadow_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Shadow Pass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.ctx.light.shadow_map.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            shadow_pass.set_pipeline(&self.ctx.pipelines.shadow);
            shadow_pass.set_bind_group(0, &self.ctx.light.shadow_bind_group, &[]);
            for instanced in batches.shadow_casters() {
                draw_geometry(&mut shadow_pass, instanced);
            }
        }

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    #[cfg(feature = "integration-tests")]
                    view: &tex.create_view(&wgpu::TextureViewDescriptor::default()),
                    #[cfg(not(feature = "integration-tests"))]
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.ctx.clear_colour),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    #[cfg(feature = "integration-tests")]
                    view: &depth.create_view(&wgpu::TextureViewDescriptor::default()),
                    #[cfg(not(feature = "integration-tests"))]
                    view: &self.ctx.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            if let Some(sky) = &batches.sky {
                render_pass.set_pipeline(&self.ctx.pipelines.skybox);
                render_pass.set_bind_group(0, &self.ctx.camera.bind_group, &[]);
                render_pass.set_bind_group(1, sky.group, &[]);
                render_pass.draw(0..3, 0..1);
            }

            for instanced in &batches.opaque {
                draw_instanced(&mut render_pass, &self.ctx, instanced);
            }

            render_pass.set_pipeline(&self.ctx.pipelines.lines);
            render_pass.set_bind_group(0, &self.ctx.camera.bind_group, &[]);
            for segments in &batches.lines {
                if segments.amount == 0 {
                    continue;
                }
                render_pass.set_vertex_buffer(0, segments.vertex.slice(..));
                render_pass.set_vertex_buffer(1, segments.instance.slice(..));
                render_pass.draw(0..segments.amount, 0..1);
            }

            for instanced in &batches.transparent {
                draw_instanced(&mut render_pass, &self.ctx, instanced);
            }

            render_pass.set_pipeline(&self.ctx.pipelines.gui);
            for flat in &batches.guis {
                if flat.amount == 0 {
                    continue;
                }
                render_pass.set_vertex_buffer(0, flat.vertex.slice(..));
                render_pass.set_index_buffer(flat.index.slice(..), wgpu::IndexFormat::Uint16);
                render_pass.draw_indexed(0..flat.amount, 0, 0..1);
            }
        }

        #[cfg(feature = "integration-tests")]
        let output_buffer = {
            let u32_size = std::mem::size_of::<u32>() as u32;
            let (width, height) = self.get_with_height();
            let output_buffer = self.ctx.device.create_buffer(&wgpu::BufferDescriptor {
                size: (u32_size * width * height) as wgpu::BufferAddress,
                usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                label: None,
                mapped_at_creation: false,
            });
            encoder.copy_texture_to_buffer(
                wgpu::TexelCopyTextureInfo {
                    aspect: wgpu::TextureAspect::All,
                    texture: &tex,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                },
                wgpu::TexelCopyBufferInfo {
                    buffer: &output_buffer,
                    layout: wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(u32_size * width),
                        rows_per_image: Some(height),
                    },
                },
                self.get_test_3d_extent(),
            );
            output_buffer
        };

        self.ctx.queue.submit(iter::once(encoder.finish()));

        #[cfg(feature = "integration-tests")]
        {
            let fut_img = async {
                let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
                let buffer_slice = output_buffer.slice(..);
                buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
                    tx.send(result).ok();
                });
                self.ctx.device.poll(wgpu::PollType::Wait {
                    submission_index: None,
                    timeout: Some(Duration::from_secs(3)),
                })?;
                rx.receive()
                    .await
                    .ok_or_else(|| anyhow::anyhow!("buffer mapping was cancelled"))??;
                let data = buffer_slice.get_mapped_range();
                let (width, height) = self.get_with_height();
                image::ImageBuffer::<image::Rgba<u8>, _>::from_raw(width, height, data)
                    .ok_or_else(|| anyhow::anyhow!("mapped buffer is smaller than the image"))
            };
            let mut img = match async_runtime.block_on(fut_img) {
                Ok(img) => img,
                Err(e) => panic!("Cannot read back the rendered frame: {:#}", e),
            };
            let state = &mut self.state;
            let all_passed = graphics_flows
                .iter_mut()
                .map(|flow| flow.render_to_texture(&self.ctx, state, &mut img))
                .map(|res| match res {
                    Err(e) => panic!("{}", e),
                    Ok(ImageTestResult::Passed) => true,
                    Ok(ImageTestResult::Failed) => panic!("Assertion failed"),
                    Ok(ImageTestResult::Waiting) => false,
                })
                .fold(true, |all, passed| all && passed);
            if all_passed && event_loop.send_event(FlowEvent::Exit).is_err() {
                panic!("All assertions passed but the winit event-loop could not safely exit");
            }
        }

        output.present();
        Ok(())
    }
}

fn draw_geometry(pass: &mut wgpu::RenderPass<'_>, instanced: &Instanced<'_>) {
    if instanced.indices.is_empty() || instanced.vertex.size() == 0 {
        return;
    }
    pass.set_vertex_buffer(0, instanced.vertex.slice(..));
    pass.set_vertex_buffer(1, instanced.instance.slice(..));
    pass.set_index_buffer(instanced.index.slice(..), wgpu::IndexFormat::Uint32);
    pass.draw_indexed(instanced.indices.clone(), 0, 0..1);
}

fn draw_instanced(pass: &mut wgpu::RenderPass<'_>, ctx: &Context, instanced: &Instanced<'_>) {
    match instanced.shade {
        Shade::Mesh(key, material) => {
            let Some(pipeline) = ctx.pipelines.mesh(key) else {
                log::warn!("No mesh pipeline for {:?}", key);
                return;
            };
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &ctx.camera.bind_group, &[]);
            pass.set_bind_group(1, &ctx.light.bind_group, &[]);
            pass.set_bind_group(2, material, &[]);
        }
        Shade::Custom(pipeline) => {
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &ctx.camera.bind_group, &[]);
        }
    }
    draw_geometry(pass, instanced);
}

/// Futures handed out by flows. Native futures run on the tokio runtime and
/// are collected once finished; on the web they are spawned locally and
/// report back through the event loop proxy.
struct Tasks<State: 'static, Event: 'static> {
    #[cfg(not(target_arch = "wasm32"))]
    runtime: tokio::runtime::Runtime,
    #[cfg(not(target_arch = "wasm32"))]
    pending: Vec<tokio::task::JoinHandle<Event>>,
    #[cfg(target_arch = "wasm32")]
    proxy: EventLoopProxy<FlowEvent<State, Event>>,
    #[cfg(not(target_arch = "wasm32"))]
    _state: std::marker::PhantomData<fn() -> State>,
}

impl<State: 'static, Event: wgpu::WasmNotSend + 'static> Tasks<State, Event> {
    fn spawn(&mut self, futures: Vec<FlowFuture<Event>>) {
        for future in futures {
            #[cfg(not(target_arch = "wasm32"))]
            self.pending.push(self.runtime.spawn(future));

            #[cfg(target_arch = "wasm32")]
            {
                let proxy = self.proxy.clone();
                wasm_bindgen_futures::spawn_local(async move {
                    let event = future.await;
                    if proxy.send_event(FlowEvent::Custom(event)).is_err() {
                        log::error!("Event loop was closed before a flow event could be delivered.");
                    }
                });
            }
        }
    }

    /// Events of the futures that resolved since the last call.
    fn finished(&mut self) -> Vec<Event> {
        #[cfg(not(target_arch = "wasm32"))]
        {
            let (done, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
                .into_iter()
                .partition(|handle| handle.is_finished());
            self.pending = pending;
            done.into_iter()
                .filter_map(|handle| match self.runtime.block_on(handle) {
                    Ok(event) => Some(event),
                    Err(e) => {
                        log::error!("A flow task failed: {}", e);
                        None
                    }
                })
                .collect()
        }
        #[cfg(target_arch = "wasm32")]
        {
            Vec::new()
        }
    }
}

pub struct App<State: 'static, Event: 'static> {
    #[allow(dead_code)]
    proxy: EventLoopProxy<FlowEvent<State, Event>>,
    tasks: Tasks<State, Event>,
    state: Option<AppState<State>>,
    // This will hold the fully initialized flows once they are ready.
    graphics_flows: Vec<Box<dyn GraphicsFlow<State, Event>>>,
    // This holds the constructors at the start.
    // We use Option to `take()` it after use.
    constructors: Option<Vec<FlowConstructor<State, Event>>>,
    last_time: Instant,
}

impl<State, Event> App<State, Event>
where
    State: 'static,
    Event: 'static,
{
    fn new(
        event_loop: &EventLoop<FlowEvent<State, Event>>,
        constructors: Vec<FlowConstructor<State, Event>>,
    ) -> anyhow::Result<Self> {
        let proxy = event_loop.create_proxy();
        let tasks = Tasks {
            #[cfg(not(target_arch = "wasm32"))]
            runtime: tokio::runtime::Runtime::new()?,
            #[cfg(not(target_arch = "wasm32"))]
            pending: Vec::new(),
            #[cfg(target_arch = "wasm32")]
            proxy: proxy.clone(),
            #[cfg(not(target_arch = "wasm32"))]
            _state: std::marker::PhantomData,
        };
        Ok(Self {
            proxy,
            tasks,
            state: None,
            graphics_flows: Vec::new(),
            constructors: Some(constructors),
            last_time: Instant::now(),
        })
    }
}

pub(crate) enum FlowEvent<State: 'static, Event: 'static> {
    #[allow(dead_code)]
    Initialized {
        state: AppState<State>,
        flows: Vec<Box<dyn GraphicsFlow<State, Event>>>,
    },
    #[allow(dead_code)]
    Custom(Event),
    #[allow(dead_code)]
    Exit,
}

impl<State: 'static, Event: 'static> Debug for FlowEvent<State, Event> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialized { state: _, flows } => {
                f.debug_struct("Initialized").field("flows", flows).finish()
            }
            Self::Custom(_) => f.write_str("Custom(E)"),
            Self::Exit => f.write_str("Exit"),
        }
    }
}

fn handle_flow_output<State: 'static, Event: wgpu::WasmNotSend + 'static>(
    tasks: &mut Tasks<State, Event>,
    ctx: &mut Context,
    out: Out<Event>,
) {
    match out {
        Out::FutEvent(futures) => tasks.spawn(futures),
        Out::Configure(f) => f(ctx),
        Out::Empty => (),
    }
}

impl<State, Event> App<State, Event>
where
    State: 'static,
    Event: wgpu::WasmNotSend + 'static,
{
    fn start_flows(&mut self, mut app_state: AppState<State>) {
        let size = app_state.ctx.window.inner_size();
        app_state.resize(size.width, size.height);
        for flow in self.graphics_flows.iter_mut() {
            let out = flow.on_init(&mut app_state.ctx, &mut app_state.state);
            handle_flow_output(&mut self.tasks, &mut app_state.ctx, out);
        }
        app_state.ctx.window.request_redraw();
        self.state = Some(app_state);
        self.last_time = Instant::now();
    }

    fn dispatch_custom_event(&mut self, event: Event) {
        let Some(state) = &mut self.state else {
            return;
        };
        let result = self
            .graphics_flows
            .iter_mut()
            .fold(Some(event), |event, flow| {
                flow.on_custom_events(&state.ctx, &mut state.state, event?)
            });
        if result.is_some() {
            log::warn!("Warning! Custom event was not consumed this cycle");
        }
    }

    fn redraw(&mut self) {
        for event in self.tasks.finished() {
            self.dispatch_custom_event(event);
        }
        let Some(state) = &mut self.state else {
            return;
        };

        let dt = self.last_time.elapsed();
        self.last_time = Instant::now();

        state.ctx.update_camera();
        for flow in self.graphics_flows.iter_mut() {
            let out = flow.on_update(&state.ctx, &mut state.state, dt);
            handle_flow_output(&mut self.tasks, &mut state.ctx, out);
        }

        match state.render(
            &mut self.graphics_flows,
            #[cfg(feature = "integration-tests")]
            &self.tasks.runtime,
            #[cfg(feature = "integration-tests")]
            &self.proxy,
        ) {
            Ok(_) => (),
            // Reconfigure the surface if it's lost or outdated
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                let size = state.ctx.window.inner_size();
                state.resize(size.width, size.height);
            }
            Err(e) => {
                log::error!("Unable to render {}", e);
            }
        }
    }
}

impl<State, Event> ApplicationHandler<FlowEvent<State, Event>> for App<State, Event>
where
    State: 'static + Default,
    Event: wgpu::WasmNotSend + 'static,
{
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let Some(constructors) = self.constructors.take() else {
            return;
        };

        #[allow(unused_mut)]
        let mut window_attributes = Window::default_attributes().with_title("flow-playground");

        #[cfg(target_arch = "wasm32")]
        {
            use winit::platform::web::WindowAttributesExtWebSys;

            window_attributes = window_attributes.with_append(true);
            if let Some(window) = web_sys::window() {
                let width = window.inner_width().ok().and_then(|w| w.as_f64());
                let height = window.inner_height().ok().and_then(|h| h.as_f64());
                if let (Some(width), Some(height)) = (width, height) {
                    window_attributes = window_attributes
                        .with_inner_size(winit::dpi::LogicalSize::new(width, height));
                }
            }
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Cannot create a window: {}", e);
                event_loop.exit();
                return;
            }
        };

        let init_future = async move {
            let app_state = AppState::new(window).await;

            let flow_futures: Vec<_> = constructors
                .into_iter()
                .map(|constructor| constructor((&app_state.ctx).into()))
                .collect();
            let flows = futures::future::join_all(flow_futures)
                .await
                .into_iter()
                .collect::<anyhow::Result<Vec<_>>>();
            match flows {
                Ok(flows) => (app_state, flows),
                Err(e) => panic!("App initialization failed. A flow could not be created: {:#}", e),
            }
        };

        #[cfg(not(target_arch = "wasm32"))]
        {
            let (app_state, flows) = self.tasks.runtime.block_on(init_future);
            self.graphics_flows = flows;
            self.start_flows(app_state);
        }

        #[cfg(target_arch = "wasm32")]
        {
            let proxy = self.proxy.clone();
            wasm_bindgen_futures::spawn_local(async move {
                let (app_state, flows) = init_future.await;
                if proxy
                    .send_event(FlowEvent::Initialized {
                        state: app_state,
                        flows,
                    })
                    .is_err()
                {
                    log::error!("Event loop was closed before the app was initialized.");
                }
            });
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: FlowEvent<State, Event>) {
        match event {
            FlowEvent::Initialized { state, flows } => {
                // This is the message from our wasm `spawn_local`
                self.graphics_flows = flows;
                self.start_flows(state);
            }
            FlowEvent::Custom(custom_event) => self.dispatch_custom_event(custom_event),
            FlowEvent::Exit => event_loop.exit(),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(state) = &mut self.state else {
            return;
        };

        // flows first, they may capture the pointer
        for flow in self.graphics_flows.iter_mut() {
            let out = flow.on_window_events(&state.ctx, &mut state.state, &event);
            handle_flow_output(&mut self.tasks, &mut state.ctx, out);
        }
        state.ctx.camera.controller.handle_window_events(&event);

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                state.resize(size.width, size.height);
            }
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
        }
    }
}

pub fn run<State: 'static + Default, Event: wgpu::WasmNotSend + 'static>(
    constructors: Vec<FlowConstructor<State, Event>>,
) -> anyhow::Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(e) = env_logger::try_init() {
            println!("Warning: Could not initialize logger: {}", e);
        };
    }

    #[cfg(target_arch = "wasm32")]
    {
        if let Err(e) = console_log::init_with_level(log::Level::Info) {
            log::warn!("Could not initialize logger: {}", e);
        }
    }

    #[cfg(all(feature = "integration-tests", target_os = "linux"))]
    let event_loop: EventLoop<FlowEvent<State, Event>> = {
        use winit::platform::wayland::EventLoopBuilderExtWayland;

        EventLoop::with_user_event().with_any_thread(true).build()?
    };

    #[cfg(all(feature = "integration-tests", target_os = "windows"))]
    let event_loop: EventLoop<FlowEvent<State, Event>> = {
        use winit::platform::windows::EventLoopBuilderExtWindows;

        EventLoop::with_user_event().with_any_thread(true).build()?
    };

    #[cfg(not(feature = "integration-tests"))]
    let event_loop: EventLoop<FlowEvent<State, Event>> = EventLoop::with_user_event().build()?;

    let mut app: App<State, Event> = App::new(&event_loop, constructors)?;

    #[cfg(not(target_arch = "wasm32"))]
    event_loop.run_app(&mut app)?;

    #[cfg(target_arch = "wasm32")]
    {
        use winit::platform::web::EventLoopExtWebSys;
        event_loop.spawn_app(app);
    }

    Ok(())
}
