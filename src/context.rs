//! GPU and window context shared by all flows.
//!
//! [`Context`] owns the surface, device and queue, the camera and light
//! uniforms and every built-in pipeline. Flows receive it by reference each
//! frame and may change it through [`Out::Configure`](crate::flow::Out).
//! Flow constructors only get an [`InitContext`] because they run before the
//! first frame and, on native targets, on the async runtime.

use std::sync::Arc;

use anyhow::{Context as _, anyhow};
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::{
    camera::{Camera, CameraResources, CameraUniform, OrbitController, Projection},
    data_structures::texture::Texture,
    pipelines::{
        Pipelines,
        light::{LightResources, SHADOW_MAP_SIZE},
    },
};

#[derive(Debug)]
pub struct Context {
    pub(crate) window: Arc<Window>,
    pub(crate) depth_texture: Texture,
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub camera: CameraResources,
    pub projection: Projection,
    pub light: LightResources,
    pub pipelines: Pipelines,
    pub clear_colour: wgpu::Color,
}

/// The part of the [`Context`] a flow constructor may use to create GPU
/// resources. Device and queue are internally reference counted, so cloning
/// them is cheap.
#[derive(Clone, Debug)]
pub struct InitContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub format: wgpu::TextureFormat,
    pub size: (u32, u32),
    pub scale_factor: f64,
}

impl From<&Context> for InitContext {
    fn from(ctx: &Context) -> Self {
        Self {
            device: ctx.device.clone(),
            queue: ctx.queue.clone(),
            format: ctx.config.format,
            size: (ctx.config.width, ctx.config.height),
            scale_factor: ctx.window.scale_factor(),
        }
    }
}

fn mk_camera(device: &wgpu::Device, projection: &Projection) -> CameraResources {
    let camera = Camera::new((0.0, 0.0, 10.0), (0.0, 0.0, 0.0));
    let mut uniform = CameraUniform::new();
    uniform.update_view_proj(&camera, projection);

    let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Camera Buffer"),
        contents: bytemuck::cast_slice(&[uniform]),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    });

    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
        label: Some("camera_bind_group_layout"),
    });

    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout: &bind_group_layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: buffer.as_entire_binding(),
        }],
        label: Some("camera_bind_group"),
    });

    CameraResources {
        camera,
        controller: OrbitController::default(),
        uniform,
        buffer,
        bind_group,
        bind_group_layout,
    }
}

impl Context {
    pub async fn new(window: Arc<Window>) -> anyhow::Result<Self> {
        let size = window.inner_size();

        // BackendBit::PRIMARY => Vulkan + Metal + DX12 + Browser WebGPU
        log::info!("WGPU setup");
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            #[cfg(not(target_arch = "wasm32"))]
            backends: wgpu::Backends::PRIMARY,
            #[cfg(target_arch = "wasm32")]
            backends: wgpu::Backends::GL,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .context("cannot create a surface for the window")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("no suitable graphics adapter")?;
        log::info!("device and queue");
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                // WebGL doesn't support all of wgpu's features, so if
                // we're building for the web we'll have to disable some.
                required_limits: if cfg!(target_arch = "wasm32") {
                    wgpu::Limits::downlevel_webgl2_defaults()
                } else {
                    wgpu::Limits::default()
                },
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
                ..Default::default()
            })
            .await
            .context("cannot open the graphics device")?;

        log::info!("Surface");
        let surface_caps = surface.get_capabilities(&adapter);
        // Shaders write linear colour and rely on an sRGB surface to encode it.
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| anyhow!("the surface supports no texture format"))?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: surface_caps
                .present_modes
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo),
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        let projection =
            Projection::new(config.width, config.height, cgmath::Deg(45.0), 0.1, 1000.0);
        let camera = mk_camera(&device, &projection);

        let depth_texture =
            Texture::create_depth_texture(&device, [config.width, config.height], "depth_texture");

        let light = LightResources::new(&device, &camera.bind_group_layout, SHADOW_MAP_SIZE);
        let pipelines = Pipelines::new(
            &device,
            &config,
            &camera.bind_group_layout,
            &light.bind_group_layout,
        );

        Ok(Self {
            surface,
            device,
            queue,
            config,
            camera,
            projection,
            light,
            pipelines,
            window,
            depth_texture,
            clear_colour: wgpu::Color::BLACK,
        })
    }

    /// Reconfigure the surface, depth buffer and projection for a new size.
    /// Zero sized requests (minimized windows) are ignored and return `false`.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 {
            log::warn!("Ignoring resize to {}x{}", width, height);
            return false;
        }
        self.config.width = width;
        self.config.height = height;
        self.projection.resize(width, height);
        self.surface.configure(&self.device, &self.config);
        self.depth_texture =
            Texture::create_depth_texture(&self.device, [width, height], "depth_texture");
        true
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Apply the orbit controller and upload the camera uniform.
    pub(crate) fn update_camera(&mut self) {
        let camera = &mut self.camera;
        camera
            .controller
            .update(&mut camera.camera, &self.projection, self.config.height);
        camera
            .uniform
            .update_view_proj(&camera.camera, &self.projection);
        self.queue.write_buffer(
            &camera.buffer,
            0,
            bytemuck::cast_slice(&[camera.uniform]),
        );
    }
}
