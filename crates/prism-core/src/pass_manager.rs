//! Frame orchestration for the OIT pipeline.
//!
//! `OitPassManager` owns the five pipelines, the resolution-dependent
//! targets, and the uniform buffers, and records one frame as a fixed
//! sequence of passes. wgpu orders passes within a submission, which is
//! the only barrier the list protocol needs: the reset completes before
//! accumulation writes, and accumulation completes before the resolve
//! reads.

use std::sync::Arc;

use crate::PrismEngine;
use crate::config::OitSettings;
use crate::pipeline::{Blitter, ListsReset, OitResolver, OpaqueRenderer, TransparentAccumulator};
use crate::targets::OitTargets;
use crate::upload::DrawBuffer;

pub struct OitPassManager {
    device: Arc<wgpu::Device>,
    reset: ListsReset,
    opaque: OpaqueRenderer,
    accumulate: TransparentAccumulator,
    resolver: OitResolver,
    blitter: Blitter,
    targets: OitTargets,
    vp_buffer: wgpu::Buffer,
    params_buffer: wgpu::Buffer,
    opaque_vp_bg: wgpu::BindGroup,
    accumulate_vp_bg: wgpu::BindGroup,
    reset_bg: wgpu::BindGroup,
    lists_bg: wgpu::BindGroup,
    resolve_bg: wgpu::BindGroup,
    blit_bg: wgpu::BindGroup,
}

impl OitPassManager {
    pub fn new(
        engine: &mut PrismEngine,
        surface_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
        settings: OitSettings,
    ) -> Self {
        let settings = settings.sanitized();
        let device = engine.device();

        let reset = ListsReset::new(device.clone());
        let opaque = OpaqueRenderer::new(device.clone(), settings.msaa_samples);
        let accumulate = TransparentAccumulator::new(device.clone(), settings.msaa_samples);
        let resolver = OitResolver::new(
            device.clone(),
            settings.fragment_budget,
            settings.msaa_samples,
        );
        let blitter = Blitter::new(device.clone(), surface_format);

        let targets = OitTargets::new(engine.allocator_mut(), width, height, settings);

        let uniform = |label| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: 16,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        let vp_buffer = uniform("prism:vp");
        let params_buffer = uniform("prism:list-params");

        let vp_bg = |label, layout: &wgpu::BindGroupLayout| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: vp_buffer.as_entire_binding(),
                }],
            })
        };
        let opaque_vp_bg = vp_bg("opaque-vp-bg", opaque.viewport_bgl());
        let accumulate_vp_bg = vp_bg("accumulate-vp-bg", accumulate.viewport_bgl());

        let reset_bg = reset.bind_group(
            &device,
            &params_buffer,
            &targets.counter.buffer,
            &targets.heads.buffer,
        );
        let lists_bg = accumulate.lists_bind_group(
            &device,
            &params_buffer,
            &targets.counter.buffer,
            &targets.heads.buffer,
            &targets.nodes.buffer,
            &targets.msaa_depth.view,
        );
        let resolve_bg = resolver.bind_group(
            &device,
            &params_buffer,
            &targets.heads.buffer,
            &targets.nodes.buffer,
            &targets.resolved_color.view,
            &targets.output.view,
        );
        let blit_bg = blitter.bind_group(&device, &targets.output.view);

        let manager = Self {
            device,
            reset,
            opaque,
            accumulate,
            resolver,
            blitter,
            targets,
            vp_buffer,
            params_buffer,
            opaque_vp_bg,
            accumulate_vp_bg,
            reset_bg,
            lists_bg,
            resolve_bg,
            blit_bg,
        };
        manager.write_uniforms(&engine.queue());
        manager
    }

    pub fn width(&self) -> u32 {
        self.targets.width()
    }

    pub fn height(&self) -> u32 {
        self.targets.height()
    }

    fn write_uniforms(&self, queue: &wgpu::Queue) {
        let w = self.targets.width();
        let h = self.targets.height();
        // Pixel space to NDC: x * vp.x + vp.z, y * vp.y + vp.w, with y flipped.
        let vp = [2.0 / w as f32, -2.0 / h as f32, -1.0f32, 1.0f32];
        queue.write_buffer(&self.vp_buffer, 0, bytemuck::cast_slice(&vp));
        let params = [w, h, self.targets.capacity(), 0u32];
        queue.write_buffer(&self.params_buffer, 0, bytemuck::cast_slice(&params));
    }

    /// Rebuild the targets and every bind group that references them.
    /// A no-op when the dimensions are unchanged.
    pub fn resize(&mut self, engine: &mut PrismEngine, width: u32, height: u32) {
        if width.max(1) == self.targets.width() && height.max(1) == self.targets.height() {
            return;
        }
        self.targets.resize(engine.allocator_mut(), width, height);
        self.reset_bg = self.reset.bind_group(
            &self.device,
            &self.params_buffer,
            &self.targets.counter.buffer,
            &self.targets.heads.buffer,
        );
        self.lists_bg = self.accumulate.lists_bind_group(
            &self.device,
            &self.params_buffer,
            &self.targets.counter.buffer,
            &self.targets.heads.buffer,
            &self.targets.nodes.buffer,
            &self.targets.msaa_depth.view,
        );
        self.resolve_bg = self.resolver.bind_group(
            &self.device,
            &self.params_buffer,
            &self.targets.heads.buffer,
            &self.targets.nodes.buffer,
            &self.targets.resolved_color.view,
            &self.targets.output.view,
        );
        self.blit_bg = self.blitter.bind_group(&self.device, &self.targets.output.view);
        self.write_uniforms(&engine.queue());
    }

    /// Record and submit one frame onto `surface_view`.
    pub fn render_frame(
        &self,
        queue: &wgpu::Queue,
        surface_view: &wgpu::TextureView,
        opaque_scene: &DrawBuffer,
        transparent_scene: &DrawBuffer,
    ) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("prism-frame"),
            });

        // 1. Lists reset: heads to the sentinel, counter to zero.
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("lists-reset"),
                timestamp_writes: None,
            });
            self.reset
                .record(&mut pass, &self.reset_bg, self.targets.pixel_count());
        }

        // 2. Opaque geometry into the multisampled color/depth pair.
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("opaque"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.targets.msaa_color.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.targets.msaa_depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            self.opaque
                .record(&mut pass, &self.opaque_vp_bg, opaque_scene);
        }

        // 3. Transparent accumulation. No color targets; depth is read-only
        //    so fragments behind opaque geometry are rejected early.
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("accumulate"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.targets.msaa_depth.view,
                    depth_ops: None,
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            self.accumulate.record(
                &mut pass,
                &self.accumulate_vp_bg,
                &self.lists_bg,
                transparent_scene,
            );
        }

        // 4. Average the opaque sub-samples down to the compositing backdrop.
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("msaa-resolve"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.targets.msaa_color.view,
                    resolve_target: Some(&self.targets.resolved_color.view),
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Discard,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }

        // 5. Walk, sort, and composite the lists per covered sub-sample.
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("oit-resolve"),
                timestamp_writes: None,
            });
            self.resolver.record(
                &mut pass,
                &self.resolve_bg,
                self.targets.width(),
                self.targets.height(),
            );
        }

        // 6. Blit the final image onto the surface.
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("blit"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: surface_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            self.blitter.record(&mut pass, &self.blit_bg);
        }

        queue.submit(Some(encoder.finish()));
    }
}
