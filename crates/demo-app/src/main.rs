use anyhow::Result;
use prism_core::{
    DrawBuffer, OitPassManager, PrismConfig, PrismEngine, upload_vertices, wgpu,
};
use prism_window::{EventHandler, PrismWindow, WindowCtx};
use winit::dpi::PhysicalSize;

mod scene;

struct App {
    engine: PrismEngine,
    passes: OitPassManager,
    opaque: DrawBuffer,
    transparent: DrawBuffer,
}

impl App {
    fn rebuild_scene(&mut self, queue: &wgpu::Queue, width: u32, height: u32) {
        let opaque = upload_vertices(
            self.engine.allocator_mut(),
            queue,
            &scene::opaque_vertices(width, height),
        );
        let transparent = upload_vertices(
            self.engine.allocator_mut(),
            queue,
            &scene::transparent_vertices(width, height),
        );
        let old_opaque = std::mem::replace(&mut self.opaque, opaque);
        let old_transparent = std::mem::replace(&mut self.transparent, transparent);
        self.engine.allocator_mut().release_buffer(old_opaque.vertex);
        self.engine
            .allocator_mut()
            .release_buffer(old_transparent.vertex);
    }
}

impl EventHandler for App {
    fn on_resize(&mut self, ctx: &mut WindowCtx, size: PhysicalSize<u32>) -> Result<()> {
        if size.width == 0 || size.height == 0 {
            return Ok(());
        }
        self.passes.resize(&mut self.engine, size.width, size.height);
        let queue = ctx.queue_arc();
        self.rebuild_scene(&queue, size.width, size.height);
        Ok(())
    }

    fn on_redraw(&mut self, ctx: &mut WindowCtx) -> Result<()> {
        let frame = ctx.acquire_current_frame()?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.passes
            .render_frame(ctx.queue(), &view, &self.opaque, &self.transparent);
        frame.present();
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let config = PrismConfig::load_or_default()?;
    log::info!(
        "oit settings: {} samples, {} layers, budget {}",
        config.oit.msaa_samples,
        config.oit.storage_layers,
        config.oit.fragment_budget
    );
    let title = config.window.title.as_deref().unwrap_or("Prism OIT Demo");
    let window = PrismWindow::new(title, config.window.width, config.window.height)?;

    let mut engine = PrismEngine::from_shared(window.device(), window.queue());
    let size = window.size();
    let passes = OitPassManager::new(
        &mut engine,
        window.surface_format(),
        size.width,
        size.height,
        config.oit,
    );

    let queue = engine.queue();
    let opaque = upload_vertices(
        engine.allocator_mut(),
        &queue,
        &scene::opaque_vertices(size.width, size.height),
    );
    let transparent = upload_vertices(
        engine.allocator_mut(),
        &queue,
        &scene::transparent_vertices(size.width, size.height),
    );

    window.run(App {
        engine,
        passes,
        opaque,
        transparent,
    })
}
