pub mod animator;
pub mod bounds;
pub mod buffer_arena;
pub mod clip;
pub mod demo;
pub mod draw;
pub mod error;
pub mod frame;
pub mod gpu;
pub mod grid;
pub mod input;
pub mod kernel_table;
pub mod params;
pub mod particle;
pub mod renderer;
pub mod scene;
pub mod settings;
pub mod source;
pub mod system;
pub mod voxel;

#[cfg(target_arch="wasm32")]
use wasm_bindgen::prelude::*;

use std::path::PathBuf;

use cgmath::Deg;
use winit::{
    event::{ElementState, Event, KeyEvent, WindowEvent},
    event_loop::EventLoop,
    keyboard::{Key, NamedKey},
};
use winit::window::WindowBuilder;

use crate::demo::DemoDriver;
use crate::error::CoreError;
use crate::frame::FrameClock;
use crate::gpu::WgpuBackend;
use crate::input::KeyBindings;
use crate::renderer::Renderer;
use crate::scene::Scene;
use crate::settings::SimulationSettings;
use crate::source::PulsingSphere;

const CAMERA_STEP: Deg<f32> = Deg(5.0);

#[derive(Clone, Debug, Default)]
pub struct HostOptions {
    pub settings: SimulationSettings,
    /// Loaded from at startup, written back on `s`.
    pub settings_path: Option<PathBuf>,
    /// Drive grid transitions, flow bursts and the camera on timers.
    pub demo: bool,
}

async fn request_device(adapter: &wgpu::Adapter) -> Result<(wgpu::Device, wgpu::Queue), CoreError> {
    let mut required_limits = wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits());
    required_limits.max_buffer_size = adapter.limits().max_buffer_size;
    required_limits.max_storage_buffer_binding_size = adapter.limits().max_storage_buffer_binding_size;
    required_limits.max_storage_buffers_per_shader_stage = 4;

    let (device, queue) = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                required_limits,
                memory_hints: wgpu::MemoryHints::MemoryUsage,
            },
            None,
        )
        .await?;
    Ok((device, queue))
}

async fn arun(options: HostOptions) -> Result<(), CoreError> {
    let HostOptions {
        settings,
        settings_path,
        demo,
    } = options;
    let event_loop = EventLoop::new()?;
    let window = WindowBuilder::new()
        .with_title("voxel particles")
        .build(&event_loop)?;

    #[cfg(target_arch = "wasm32")]
    {
        // The canvas keeps winit's size, not the page's CSS.
        use winit::dpi::PhysicalSize;
        let _ = window.request_inner_size(PhysicalSize::new(800, 600));

        use winit::platform::web::WindowExtWebSys;
        let appended = web_sys::window()
            .and_then(|win| win.document())
            .and_then(|doc| {
                let dst = doc.get_element_by_id("voxel-particles")?;
                let canvas = web_sys::Element::from(window.canvas()?);
                dst.append_child(&canvas).ok()?;
                Some(())
            });
        if appended.is_none() {
            log::error!("no #voxel-particles element to attach the canvas to");
        }
    }

    let size = window.inner_size();

    let instance = wgpu::Instance::default();
    let surface = instance.create_surface(&window)?;
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface: Some(&surface),
        })
        .await
        .ok_or(CoreError::Adapter)?;
    log::info!("adapter: {:?}", adapter.get_info());

    let (device, queue) = request_device(&adapter).await?;

    let mut config = surface
        .get_default_config(&adapter, size.width.max(1), size.height.max(1))
        .ok_or(CoreError::SurfaceConfig)?;
    surface.configure(&device, &config);

    let mut renderer = Renderer::new(&device, config.format, config.width, config.height);
    let mut backend = WgpuBackend::new(device, queue);
    let mut scene = Scene::new(&mut backend, settings)?;
    let mut source = PulsingSphere::default();
    let mut clock = FrameClock::new();
    let mut keys = KeyBindings::default();
    let mut demo = demo.then(DemoDriver::default);
    if demo.is_some() {
        log::info!("demo driver on");
    }

    let window = &window;

    event_loop.run(move |event, target| {
        // Moved into the loop so they outlive the surface.
        let _ = (&instance, &adapter);

        if let Event::AboutToWait = event {
            if target.exiting() {
                return;
            }
            let frame_time = clock.tick();
            if let Some(demo) = demo.as_mut() {
                let step = demo.tick(frame_time.dt());
                if let Some(yaw) = step.camera_yaw {
                    renderer.camera.yaw = yaw;
                }
                for event in step.events {
                    scene.apply(event);
                }
            }
            if let Err(err) = scene.update(&mut backend, &mut source, &frame_time) {
                log::error!("frame {} failed: {}", frame_time.index, err);
                target.exit();
                return;
            }
            scene.render(&mut renderer);

            let frame = match surface.get_current_texture() {
                Ok(frame) => frame,
                Err(err) => {
                    log::warn!("surface lost ({}), reconfiguring", err);
                    surface.configure(backend.device(), &config);
                    return;
                }
            };
            let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
            let aspect = config.width as f32 / config.height as f32;
            renderer.render(&backend, &view, aspect);
            frame.present();

            window.request_redraw();
        };

        if let Event::WindowEvent {
            window_id: _,
            event,
        } = event
        {
            match event {
                WindowEvent::Resized(new_size) => {
                    config.width = new_size.width.max(1);
                    config.height = new_size.height.max(1);
                    surface.configure(backend.device(), &config);
                    renderer.resize(backend.device(), config.width, config.height);
                    window.request_redraw();
                }
                WindowEvent::KeyboardInput {
                    event:
                        KeyEvent {
                            logical_key,
                            state: ElementState::Pressed,
                            ..
                        },
                    ..
                } => match logical_key {
                    Key::Named(NamedKey::Escape) => target.exit(),
                    Key::Named(NamedKey::ArrowLeft) => renderer.camera.yaw -= CAMERA_STEP,
                    Key::Named(NamedKey::ArrowRight) => renderer.camera.yaw += CAMERA_STEP,
                    Key::Character(c) if c.as_str() == "s" => {
                        if let Some(path) = &settings_path {
                            match scene.settings().save(path) {
                                Ok(()) => log::info!("settings saved to {}", path.display()),
                                Err(err) => log::error!("{}", err),
                            }
                        }
                    }
                    Key::Character(c) => {
                        if let Some(event) = keys.event(c.as_str(), &scene) {
                            log::debug!("{:?}", event);
                            scene.apply(event);
                        }
                    }
                    _ => {}
                },
                WindowEvent::RedrawRequested => {}
                WindowEvent::CloseRequested => {
                    scene.teardown(&mut backend);
                    target.exit();
                }
                _ => {}
            };
        }
    })?;
    Ok(())
}

/// Safe to call more than once.
pub fn init_logger() {
    cfg_if::cfg_if! {
        if #[cfg(target_arch = "wasm32")] {
            std::panic::set_hook(Box::new(console_error_panic_hook::hook));
            let _ = console_log::init_with_level(log::Level::Info);
        } else {
            let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();
        }
    }
}

/// Opens a window and runs the simulation until it is closed.
pub fn run_with(options: HostOptions) {
    init_logger();

    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(err) = pollster::block_on(arun(options)) {
            log::error!("{}", err);
        }
    }
    #[cfg(target_arch = "wasm32")]
    {
        wasm_bindgen_futures::spawn_local(async move {
            if let Err(err) = arun(options).await {
                log::error!("{}", err);
            }
        });
    }
}

#[cfg_attr(target_arch="wasm32", wasm_bindgen(start))]
pub fn run() {
    run_with(HostOptions::default());
}
