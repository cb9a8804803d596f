//! prism-window: winit + wgpu window wrapper for the OIT renderer.
//!
//! Responsibilities:
//! - Create window + surface + device/queue.
//! - Manage surface configuration and resizing.
//! - Dispatch redraw and resize to an [`EventHandler`].

use std::sync::Arc;

use anyhow::Result;
use prism_core::{RenderError, make_surface_config, wgpu};
use winit::dpi::PhysicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::EventLoop;
use winit::window::{Window, WindowBuilder};

pub struct PrismWindow {
    event_loop: EventLoop<()>,
    // Leaked to satisfy the surface's 'static lifetime requirement.
    window: &'static Window,
    _instance: wgpu::Instance,
    surface: wgpu::Surface<'static>,
    adapter: wgpu::Adapter,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    config: wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,
}

pub struct WindowCtx<'a> {
    window: &'a Window,
    device: &'a Arc<wgpu::Device>,
    queue: &'a Arc<wgpu::Queue>,
    surface: &'a wgpu::Surface<'static>,
    config: &'a wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,
}

impl<'a> WindowCtx<'a> {
    pub fn device(&self) -> &wgpu::Device {
        self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        self.queue
    }

    pub fn device_arc(&self) -> Arc<wgpu::Device> {
        self.device.clone()
    }

    pub fn queue_arc(&self) -> Arc<wgpu::Queue> {
        self.queue.clone()
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    pub fn acquire_current_frame(&self) -> Result<wgpu::SurfaceTexture, RenderError> {
        Ok(self.surface.get_current_texture()?)
    }
}

pub trait EventHandler {
    fn init(&mut self, _ctx: &mut WindowCtx) -> Result<()> {
        Ok(())
    }
    fn on_resize(&mut self, _ctx: &mut WindowCtx, _size: PhysicalSize<u32>) -> Result<()> {
        Ok(())
    }
    fn on_redraw(&mut self, _ctx: &mut WindowCtx) -> Result<()> {
        Ok(())
    }
}

impl PrismWindow {
    pub fn new(title: &str, width: u32, height: u32) -> Result<Self> {
        let event_loop = EventLoop::new()?;
        let window = WindowBuilder::new()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height))
            .build(&event_loop)?;
        let window: &'static Window = Box::leak(Box::new(window));

        let instance = wgpu::Instance::default();
        let surface = instance.create_surface(window)?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface: Some(&surface),
        }))
        .ok_or(RenderError::NoAdapter)?;
        // The node pool scales with window area, which outgrows wgpu's
        // conservative default buffer limits; ask for what the adapter
        // actually supports.
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
            },
            None,
        ))
        .map_err(RenderError::Device)?;

        let size = window.inner_size();
        let config = make_surface_config(&adapter, &surface, size.width, size.height);
        surface.configure(&device, &config);
        log::info!(
            "window up: {}x{} surface {:?}",
            config.width,
            config.height,
            config.format
        );

        Ok(Self {
            event_loop,
            window,
            _instance: instance,
            surface,
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
            config,
            size,
        })
    }

    pub fn device(&self) -> Arc<wgpu::Device> {
        self.device.clone()
    }

    pub fn queue(&self) -> Arc<wgpu::Queue> {
        self.queue.clone()
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn run(mut self, mut handler: impl EventHandler + 'static) -> Result<()> {
        let mut needs_init = true;

        Ok(self.event_loop.run(move |event, elwt| match event {
            Event::Resumed => {
                if needs_init {
                    let mut ctx = WindowCtx {
                        window: self.window,
                        device: &self.device,
                        queue: &self.queue,
                        surface: &self.surface,
                        config: &self.config,
                        size: self.size,
                    };
                    if let Err(err) = handler.init(&mut ctx) {
                        log::error!("init failed: {err:#}");
                        elwt.exit();
                    }
                    needs_init = false;
                }
            }
            Event::WindowEvent { window_id, event } if window_id == self.window.id() => {
                match event {
                    WindowEvent::CloseRequested => elwt.exit(),
                    WindowEvent::Resized(new_size) => {
                        self.size = new_size;
                        if new_size.width > 0 && new_size.height > 0 {
                            self.config.width = new_size.width;
                            self.config.height = new_size.height;
                            self.surface.configure(&self.device, &self.config);
                        }
                        let mut ctx = WindowCtx {
                            window: self.window,
                            device: &self.device,
                            queue: &self.queue,
                            surface: &self.surface,
                            config: &self.config,
                            size: self.size,
                        };
                        if let Err(err) = handler.on_resize(&mut ctx, new_size) {
                            log::error!("resize failed: {err:#}");
                        }
                    }
                    WindowEvent::RedrawRequested => {
                        let mut ctx = WindowCtx {
                            window: self.window,
                            device: &self.device,
                            queue: &self.queue,
                            surface: &self.surface,
                            config: &self.config,
                            size: self.size,
                        };
                        match handler.on_redraw(&mut ctx) {
                            Ok(()) => {}
                            Err(err) => match err.downcast_ref::<RenderError>() {
                                // A lost or outdated surface recovers on the
                                // next reconfigure; anything else is fatal.
                                Some(RenderError::Surface(wgpu::SurfaceError::Lost))
                                | Some(RenderError::Surface(wgpu::SurfaceError::Outdated)) => {
                                    self.surface.configure(&self.device, &self.config);
                                }
                                _ => {
                                    log::error!("redraw failed: {err:#}");
                                    elwt.exit();
                                }
                            },
                        }
                    }
                    _ => {}
                }
            }
            Event::AboutToWait => {
                self.window.request_redraw();
            }
            _ => {}
        })?)
    }

    pub fn adapter(&self) -> &wgpu::Adapter {
        &self.adapter
    }
}
