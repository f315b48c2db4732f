use std::collections::VecDeque;
use std::time::Duration;

use egui::epaint::Shadow;
use glam::Vec2;

/// Frames kept for the rolling frame-time window.
const FRAME_WINDOW: usize = 120;

/// Rolling frame-time statistics plus a once-per-second FPS counter.
pub struct FrameTimer {
    samples: VecDeque<f32>,
    frames_this_second: u32,
    second: Duration,
    fps: u32,
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameTimer {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(FRAME_WINDOW),
            frames_this_second: 0,
            second: Duration::ZERO,
            fps: 0,
        }
    }

    /// Record one frame. Returns the new FPS value each time a full second elapses.
    pub fn tick(&mut self, dt: Duration) -> Option<u32> {
        if self.samples.len() == FRAME_WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(dt.as_secs_f32() * 1000.0);

        self.frames_this_second += 1;
        self.second += dt;
        if self.second >= Duration::from_secs(1) {
            self.fps = self.frames_this_second;
            self.frames_this_second = 0;
            self.second = Duration::ZERO;
            Some(self.fps)
        } else {
            None
        }
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// (avg, min, max) frame time in milliseconds over the window.
    pub fn frame_times(&self) -> (f32, f32, f32) {
        if self.samples.is_empty() {
            return (0.0, 0.0, 0.0);
        }
        let sum: f32 = self.samples.iter().sum();
        let min = self.samples.iter().copied().fold(f32::INFINITY, f32::min);
        let max = self.samples.iter().copied().fold(0.0, f32::max);
        (sum / self.samples.len() as f32, min, max)
    }
}

pub struct DebugStats {
    pub fps: u32,
    pub frame_time_avg_ms: f32,
    pub frame_time_min_ms: f32,
    pub frame_time_max_ms: f32,
    pub resolution: (u32, u32),
    pub engine: &'static str,
    /// Engine-specific lines, shown below the common ones.
    pub lines: Vec<String>,
}

impl DebugStats {
    pub fn new(timer: &FrameTimer, resolution: (u32, u32), engine: &'static str, lines: Vec<String>) -> Self {
        let (avg, min, max) = timer.frame_times();
        Self {
            fps: timer.fps(),
            frame_time_avg_ms: avg,
            frame_time_min_ms: min,
            frame_time_max_ms: max,
            resolution,
            engine,
            lines,
        }
    }
}

pub struct DebugOverlay {
    pub visible: bool,
    egui_ctx: egui::Context,
    egui_state: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,
}

impl DebugOverlay {
    pub fn new(
        window: &winit::window::Window,
        device: &wgpu::Device,
        surface_format: wgpu::TextureFormat,
        visible: bool,
    ) -> Self {
        let egui_ctx = egui::Context::default();

        let mut visuals = egui::Visuals::dark();
        visuals.window_fill = egui::Color32::from_rgba_premultiplied(0, 0, 0, 180);
        visuals.window_stroke = egui::Stroke::NONE;
        visuals.window_shadow = Shadow::NONE;
        visuals.override_text_color = Some(egui::Color32::WHITE);
        egui_ctx.set_visuals(visuals);

        let mut style = (*egui_ctx.style()).clone();
        style.override_font_id = Some(egui::FontId::monospace(13.0));
        egui_ctx.set_style(style);

        let egui_state = egui_winit::State::new(
            egui_ctx.clone(),
            egui::ViewportId::ROOT,
            window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );

        let egui_renderer = egui_wgpu::Renderer::new(device, surface_format, None, 1, false);

        Self {
            visible,
            egui_ctx,
            egui_state,
            egui_renderer,
        }
    }

    pub fn toggle(&mut self) {
        self.visible = !self.visible;
        log::debug!("Debug overlay {}", if self.visible { "shown" } else { "hidden" });
    }

    pub fn handle_window_event(
        &mut self,
        window: &winit::window::Window,
        event: &winit::event::WindowEvent,
    ) -> egui_winit::EventResponse {
        self.egui_state.on_window_event(window, event)
    }

    /// Render one egui frame on top of the engine output.
    ///
    /// - `selection`: drag rectangle in physical pixels (min, max); drawn even when
    ///   the stats panel is hidden so zoom feedback never disappears.
    /// - `stats`: F3 stats panel (`None` = hidden).
    #[allow(clippy::too_many_arguments)]
    pub fn render(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        window: &winit::window::Window,
        view: &wgpu::TextureView,
        screen_descriptor: &egui_wgpu::ScreenDescriptor,
        selection: Option<[Vec2; 2]>,
        stats: Option<&DebugStats>,
    ) {
        let raw_input = self.egui_state.take_egui_input(window);
        let points_per_pixel = 1.0 / screen_descriptor.pixels_per_point;

        let full_output = self.egui_ctx.run(raw_input, |ctx| {
            if let Some([min, max]) = selection {
                let painter = ctx.layer_painter(egui::LayerId::new(
                    egui::Order::Background,
                    egui::Id::new("selection"),
                ));
                let rect = egui::Rect::from_min_max(
                    egui::pos2(min.x * points_per_pixel, min.y * points_per_pixel),
                    egui::pos2(max.x * points_per_pixel, max.y * points_per_pixel),
                );
                painter.rect_stroke(rect, 0.0, egui::Stroke::new(1.5, egui::Color32::WHITE));
            }

            if let Some(stats) = stats {
                egui::Area::new(egui::Id::new("debug_overlay"))
                    .fixed_pos(egui::pos2(10.0, 10.0))
                    .show(ctx, |ui| {
                        egui::Frame::none()
                            .fill(egui::Color32::from_rgba_premultiplied(0, 0, 0, 180))
                            .inner_margin(egui::Margin::same(8.0))
                            .rounding(4.0)
                            .show(ui, |ui: &mut egui::Ui| {
                                ui.label(format!("{} | FPS: {}", stats.engine, stats.fps));
                                ui.label(format!(
                                    "Frame: {:.2} ms (min: {:.1} | max: {:.1})",
                                    stats.frame_time_avg_ms,
                                    stats.frame_time_min_ms,
                                    stats.frame_time_max_ms
                                ));
                                ui.label(format!(
                                    "Resolution: {} x {}",
                                    stats.resolution.0, stats.resolution.1
                                ));
                                for line in &stats.lines {
                                    ui.label(line.as_str());
                                }
                            });
                    });
            }
        });

        self.egui_state
            .handle_platform_output(window, full_output.platform_output);

        let tris = self
            .egui_ctx
            .tessellate(full_output.shapes, full_output.pixels_per_point);

        for (id, image_delta) in &full_output.textures_delta.set {
            self.egui_renderer
                .update_texture(device, queue, *id, image_delta);
        }

        self.egui_renderer
            .update_buffers(device, queue, encoder, &tris, screen_descriptor);

        {
            let render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("egui pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            self.egui_renderer
                .render(&mut render_pass.forget_lifetime(), &tris, screen_descriptor);
        }

        for id in &full_output.textures_delta.free {
            self.egui_renderer.free_texture(id);
        }
    }
}
