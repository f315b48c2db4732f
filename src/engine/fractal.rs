// Mandelbrot navigator
//
// The view window is a rectangle in the complex plane whose height is always
// width × (screen height / screen width). Dragging with the primary button
// zooms into the selected box; the secondary button steps back through an
// explicit history stack.

use std::f64::consts::LN_2;

use glam::{DVec2, Vec2};

use super::gpu::{self, FULLSCREEN_WGSL, GpuContext, GpuError};
use super::input::{InputEvent, PointerButton};
use super::Engine;
use crate::config::Config;

const FRACTAL_WGSL: &str = include_str!("../shaders/fractal.wgsl");

/// |z|² at which an orbit counts as escaped.
pub const BAILOUT: f64 = 65536.0;
/// Horizontal drags shorter than this (in pixels) are clicks, not zooms.
pub const DRAG_THRESHOLD_PX: f64 = 5.0;

pub const BLACK: [f32; 3] = [0.0, 0.0, 0.0];
pub const BLUE: [f32; 3] = [0.0, 0.1, 1.0];
pub const WHITE: [f32; 3] = [1.0, 1.0, 1.0];
pub const ORANGE: [f32; 3] = [0.9, 0.5, 0.1];
/// Color of points that never escape. Not part of the band cycle.
pub const INTERIOR: [f32; 3] = BLACK;

const BANDS: [([f32; 3], [f32; 3]); 4] = [(BLACK, BLUE), (BLUE, WHITE), (WHITE, ORANGE), (ORANGE, BLACK)];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Escape {
    pub iterations: u32,
    /// Continuous escape value: iterations + 1 - log2(log2 |z|).
    pub smooth: f64,
}

/// Iterate z <- z² + c from 0. `None` if the orbit stays bounded for
/// `max_iterations` steps.
pub fn escape_time(c: DVec2, max_iterations: u32) -> Option<Escape> {
    let (mut x, mut y) = (0.0f64, 0.0f64);
    let mut iterations = 0;
    while x * x + y * y < BAILOUT && iterations < max_iterations {
        let x_next = x * x - y * y + c.x;
        y = 2.0 * x * y + c.y;
        x = x_next;
        iterations += 1;
    }
    if iterations >= max_iterations {
        return None;
    }
    let log_modulus = (x * x + y * y).ln() / 2.0;
    let nu = (log_modulus / LN_2).ln() / LN_2;
    Some(Escape {
        iterations,
        smooth: iterations as f64 + 1.0 - nu,
    })
}

/// Four-band cyclic palette over value / 10: black, blue, white, orange.
pub fn palette(escape: Option<Escape>) -> [f32; 3] {
    let Some(escape) = escape else { return INTERIOR };
    let value = escape.smooth / 10.0;
    let band = value.floor().rem_euclid(4.0) as usize;
    let weight = (value - value.floor()) as f32;
    let (from, to) = BANDS[band];
    [
        from[0] * (1.0 - weight) + to[0] * weight,
        from[1] * (1.0 - weight) + to[1] * weight,
        from[2] * (1.0 - weight) + to[2] * weight,
    ]
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewWindow {
    pub bottom_left: DVec2,
    pub top_right: DVec2,
}

impl ViewWindow {
    /// Framing of the whole set for a screen with the given aspect (height / width).
    pub fn initial(aspect: f64) -> Self {
        let bottom_left = DVec2::new(-2.5, -1.4);
        let width = 5.0;
        Self {
            bottom_left,
            top_right: bottom_left + DVec2::new(width, width * aspect),
        }
    }

    pub fn width(&self) -> f64 {
        self.top_right.x - self.bottom_left.x
    }

    pub fn height(&self) -> f64 {
        self.top_right.y - self.bottom_left.y
    }

    /// Same bottom-left and width, height re-derived from `aspect`.
    pub fn with_aspect(self, aspect: f64) -> Self {
        Self {
            bottom_left: self.bottom_left,
            top_right: DVec2::new(self.top_right.x, self.bottom_left.y + self.width() * aspect),
        }
    }

    /// Point of the plane at normalized screen coordinate `uv` (y up).
    pub fn map(&self, uv: DVec2) -> DVec2 {
        self.bottom_left + uv * (self.top_right - self.bottom_left)
    }
}

/// Aspect-correct selection box for a drag between two screen points (y up),
/// as (bottom-left, top-right) in pixels. `None` for drags narrower than the
/// threshold. Only the horizontal extent sets the size; the signs of the
/// displacement pick which corner anchors the box, so swapping the endpoints
/// yields the same box.
pub fn selection_box(press: DVec2, release: DVec2, aspect: f64) -> Option<(DVec2, DVec2)> {
    let dx = release.x - press.x;
    if dx.abs() < DRAG_THRESHOLD_PX {
        return None;
    }
    let bottom_left = match (dx > 0.0, release.y > press.y) {
        (true, true) => DVec2::new(press.x, press.y),
        (true, false) => DVec2::new(press.x, release.y),
        (false, true) => DVec2::new(release.x, press.y),
        (false, false) => DVec2::new(release.x, release.y),
    };
    let size = DVec2::new(dx.abs(), dx.abs() * aspect);
    Some((bottom_left, bottom_left + size))
}

pub struct Navigator {
    current: ViewWindow,
    history: Vec<ViewWindow>,
    viewport: (u32, u32),
    /// Press position of an in-progress primary drag (pixels, y up).
    press: Option<DVec2>,
    /// Latest pointer position (pixels, y up).
    pointer: Option<DVec2>,
    dirty: bool,
}

impl Navigator {
    pub fn new(width: u32, height: u32) -> Self {
        let viewport = (width.max(1), height.max(1));
        Self {
            current: ViewWindow::initial(viewport.1 as f64 / viewport.0 as f64),
            history: Vec::new(),
            viewport,
            press: None,
            pointer: None,
            dirty: true,
        }
    }

    pub fn current(&self) -> ViewWindow {
        self.current
    }

    pub fn depth(&self) -> usize {
        self.history.len()
    }

    pub fn aspect(&self) -> f64 {
        self.viewport.1 as f64 / self.viewport.0 as f64
    }

    /// Returns and clears the flag set whenever the view window changes.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    fn to_plane_pixels(&self, x: f32, y: f32) -> DVec2 {
        DVec2::new(x as f64, self.viewport.1 as f64 - y as f64)
    }

    pub fn handle_input(&mut self, event: &InputEvent) {
        match *event {
            InputEvent::PointerMove { x, y } => {
                self.pointer = Some(self.to_plane_pixels(x, y));
            }
            InputEvent::PointerDown { button: PointerButton::Primary, x, y } => {
                let point = self.to_plane_pixels(x, y);
                self.press = Some(point);
                self.pointer = Some(point);
            }
            InputEvent::PointerDown { button: PointerButton::Secondary, .. } => {
                self.undo();
            }
            InputEvent::PointerUp { button: PointerButton::Primary, x, y } => {
                let release = self.to_plane_pixels(x, y);
                self.pointer = Some(release);
                if let Some(press) = self.press.take() {
                    self.zoom(press, release);
                }
            }
            InputEvent::PointerLeave => {
                self.pointer = None;
                self.press = None;
            }
            InputEvent::Resize { width, height } => self.resize(width, height),
            _ => {}
        }
    }

    /// Replace the view with the selected box. Returns false for rejected drags.
    pub fn zoom(&mut self, press: DVec2, release: DVec2) -> bool {
        let Some((low, high)) = selection_box(press, release, self.aspect()) else {
            log::debug!("Ignoring drag of {:.1}px", (release.x - press.x).abs());
            return false;
        };
        let scale = self.current.width() / self.viewport.0 as f64;
        let origin = self.current.bottom_left;
        let next = ViewWindow {
            bottom_left: origin + low * scale,
            top_right: origin + high * scale,
        };
        self.history.push(self.current);
        self.current = next;
        self.dirty = true;
        log::info!(
            "Zoom {}: ({}, {}) .. ({}, {})",
            self.depth(),
            next.bottom_left.x,
            next.bottom_left.y,
            next.top_right.x,
            next.top_right.y
        );
        true
    }

    /// Restore the previous view. No-op on empty history.
    pub fn undo(&mut self) -> bool {
        match self.history.pop() {
            Some(previous) => {
                self.current = previous;
                self.dirty = true;
                log::info!(
                    "Undo to depth {}: ({}, {}) .. ({}, {})",
                    self.depth(),
                    previous.bottom_left.x,
                    previous.bottom_left.y,
                    previous.top_right.x,
                    previous.top_right.y
                );
                true
            }
            None => false,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.viewport = (width, height);
        self.current = self.current.with_aspect(self.aspect());
        self.dirty = true;
    }

    /// Plane coordinate under the pointer.
    pub fn pointer_c(&self) -> Option<DVec2> {
        let pointer = self.pointer?;
        let uv = pointer / DVec2::new(self.viewport.0 as f64, self.viewport.1 as f64);
        Some(self.current.map(uv))
    }

    /// Live selection box for the in-progress drag, in screen pixels with y down.
    pub fn selection(&self) -> Option<[Vec2; 2]> {
        let (low, high) = selection_box(self.press?, self.pointer?, self.aspect())?;
        let h = self.viewport.1 as f64;
        Some([
            Vec2::new(low.x as f32, (h - high.y) as f32),
            Vec2::new(high.x as f32, (h - low.y) as f32),
        ])
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct FractalUniforms {
    bottom_left: [f32; 2],
    top_right: [f32; 2],
    max_iterations: u32,
    _padding: [u32; 3],
}

struct FractalRenderer {
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    pipeline: wgpu::RenderPipeline,
}

impl FractalRenderer {
    fn new(gpu: &GpuContext) -> Result<Self, GpuError> {
        let source = format!("{FULLSCREEN_WGSL}\n{FRACTAL_WGSL}");
        let module = gpu.compile_shader("fractal shader", &source)?;

        let uniform_buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("fractal view buffer"),
            size: std::mem::size_of::<FractalUniforms>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let layout = gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("fractal bind group layout"),
            entries: &[gpu::layout_entry(0, wgpu::ShaderStages::FRAGMENT, gpu::uniform_binding())],
        });
        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("fractal bind group"),
            layout: &layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });
        let pipeline = gpu.fullscreen_pipeline("fractal pipeline", &module, &[&layout]);

        Ok(Self {
            uniform_buffer,
            bind_group,
            pipeline,
        })
    }

    fn write_view(&self, queue: &wgpu::Queue, view: ViewWindow, max_iterations: u32) {
        let uniforms = FractalUniforms {
            bottom_left: view.bottom_left.as_vec2().to_array(),
            top_right: view.top_right.as_vec2().to_array(),
            max_iterations,
            _padding: [0; 3],
        };
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));
    }
}

pub struct FractalEngine {
    navigator: Navigator,
    max_iterations: u32,
    renderer: Option<FractalRenderer>,
}

impl FractalEngine {
    pub fn new(gpu: &GpuContext, config: &Config) -> Result<Self, GpuError> {
        Ok(Self {
            navigator: Navigator::new(gpu.size.width, gpu.size.height),
            max_iterations: config.max_iterations,
            renderer: Some(FractalRenderer::new(gpu)?),
        })
    }
}

impl Engine for FractalEngine {
    fn name(&self) -> &'static str {
        "fractal"
    }

    fn handle_input(&mut self, event: &InputEvent) {
        self.navigator.handle_input(event);
    }

    fn update(&mut self, gpu: &GpuContext, _dt: f32) {
        if self.navigator.take_dirty() {
            if let Some(renderer) = &self.renderer {
                renderer.write_view(&gpu.queue, self.navigator.current(), self.max_iterations);
            }
        }
    }

    fn render(&mut self, encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView) {
        if let Some(renderer) = &self.renderer {
            gpu::draw_fullscreen(encoder, view, "fractal pass", &renderer.pipeline, &renderer.bind_group);
        }
    }

    fn stats(&self) -> Vec<String> {
        let view = self.navigator.current();
        let mut lines = vec![
            format!("Bottom-left: ({:.6e}, {:.6e})", view.bottom_left.x, view.bottom_left.y),
            format!("Top-right: ({:.6e}, {:.6e})", view.top_right.x, view.top_right.y),
            format!("Size: {:.3e} x {:.3e}", view.width(), view.height()),
            format!("Zoom depth: {}", self.navigator.depth()),
        ];
        if let Some(c) = self.navigator.pointer_c() {
            let escape = escape_time(c, self.max_iterations);
            let [r, g, b] = palette(escape).map(|channel| (channel * 255.0).round() as u8);
            let value = match escape {
                Some(escape) => format!("{:.2} ({} iterations)", escape.smooth, escape.iterations),
                None => "bounded".to_string(),
            };
            lines.push(format!("Pointer: ({:.6}, {:.6}) -> {value} #{r:02x}{g:02x}{b:02x}", c.x, c.y));
        }
        lines
    }

    fn selection(&self) -> Option<[Vec2; 2]> {
        self.navigator.selection()
    }

    fn release(&mut self) {
        if let Some(renderer) = self.renderer.take() {
            renderer.uniform_buffer.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: DVec2, b: DVec2, epsilon: f64) -> bool {
        (a - b).abs().max_element() <= epsilon
    }

    fn down(x: f32, y: f32) -> InputEvent {
        InputEvent::PointerDown { button: PointerButton::Primary, x, y }
    }

    fn up(x: f32, y: f32) -> InputEvent {
        InputEvent::PointerUp { button: PointerButton::Primary, x, y }
    }

    #[test]
    fn origin_never_escapes() {
        assert_eq!(escape_time(DVec2::ZERO, 1000), None);
        assert_eq!(palette(None), INTERIOR);
    }

    #[test]
    fn far_point_escapes_quickly() {
        let escape = escape_time(DVec2::new(3.0, 3.0), 1000).expect("3+3i escapes");
        assert!(escape.iterations <= 3, "took {} iterations", escape.iterations);
        assert!(escape.smooth.is_finite());
    }

    #[test]
    fn smooth_value_matches_formula() {
        let c = DVec2::new(0.5, 0.5);
        let (mut x, mut y, mut iterations) = (0.0f64, 0.0f64, 0u32);
        while x * x + y * y < 65536.0 {
            (x, y) = (x * x - y * y + c.x, 2.0 * x * y + c.y);
            iterations += 1;
        }
        let nu = (((x * x + y * y).ln() / 2.0) / 2f64.ln()).ln() / 2f64.ln();
        let expected = iterations as f64 + 1.0 - nu;

        let escape = escape_time(c, 1000).expect("escapes");
        assert_eq!(escape.iterations, iterations);
        assert!((escape.smooth - expected).abs() < 1e-12, "{} vs {expected}", escape.smooth);
    }

    #[test]
    fn fractal_shader_validates_with_bailout() {
        let source = format!("{FULLSCREEN_WGSL}\n{FRACTAL_WGSL}");
        let module = gpu::validate_wgsl("fractal", &source);
        assert_eq!(gpu::wgsl_f32_constant(&module, "BAILOUT"), Some(BAILOUT as f32));
    }

    #[test]
    fn palette_band_endpoints() {
        let at = |smooth: f64| palette(Some(Escape { iterations: 1, smooth }));
        assert_eq!(at(0.0), BLACK);
        assert_eq!(at(10.0), BLUE);
        assert_eq!(at(20.0), WHITE);
        assert_eq!(at(30.0), ORANGE);
        assert_eq!(at(40.0), BLACK);
        let mid = at(5.0);
        assert!((mid[2] - 0.5).abs() < 1e-6);
        // negative values wrap into the cycle instead of indexing out of range
        assert_eq!(at(-10.0), ORANGE);
    }

    #[test]
    fn initial_window_keeps_aspect() {
        let nav = Navigator::new(1000, 500);
        let view = nav.current();
        assert_eq!(view.bottom_left, DVec2::new(-2.5, -1.4));
        assert!((view.height() - view.width() * 0.5).abs() < 1e-12);
    }

    #[test]
    fn zoom_then_undo_restores_exactly() {
        let mut nav = Navigator::new(800, 600);
        let before = nav.current();
        nav.handle_input(&down(100.0, 400.0));
        nav.handle_input(&up(300.0, 250.0));
        assert_eq!(nav.depth(), 1);
        assert_ne!(nav.current(), before);

        nav.handle_input(&InputEvent::PointerDown { button: PointerButton::Secondary, x: 0.0, y: 0.0 });
        assert_eq!(nav.current(), before);
        assert_eq!(nav.depth(), 0);
    }

    #[test]
    fn undo_on_empty_history_is_noop() {
        let mut nav = Navigator::new(800, 600);
        let before = nav.current();
        assert!(!nav.undo());
        assert_eq!(nav.current(), before);
    }

    #[test]
    fn small_drag_is_rejected() {
        let mut nav = Navigator::new(800, 600);
        let before = nav.current();
        nav.handle_input(&down(100.0, 100.0));
        nav.handle_input(&up(104.0, 300.0));
        assert_eq!(nav.current(), before);
        assert_eq!(nav.depth(), 0);
    }

    #[test]
    fn zoom_is_direction_independent() {
        let corners = [(120.0, 90.0), (420.0, 330.0), (120.0, 330.0), (420.0, 90.0)];
        for (a, b) in [(corners[0], corners[1]), (corners[2], corners[3])] {
            let mut forward = Navigator::new(800, 600);
            forward.handle_input(&down(a.0, a.1));
            forward.handle_input(&up(b.0, b.1));

            let mut backward = Navigator::new(800, 600);
            backward.handle_input(&down(b.0, b.1));
            backward.handle_input(&up(a.0, a.1));

            let (f, r) = (forward.current(), backward.current());
            assert!(approx_eq(f.bottom_left, r.bottom_left, 1e-12), "{f:?} vs {r:?}");
            assert!(approx_eq(f.top_right, r.top_right, 1e-12), "{f:?} vs {r:?}");
        }
    }

    #[test]
    fn zoom_preserves_aspect_and_ordering() {
        let mut nav = Navigator::new(800, 600);
        nav.handle_input(&down(500.0, 100.0));
        nav.handle_input(&up(200.0, 500.0));
        let view = nav.current();
        assert!(view.top_right.x > view.bottom_left.x);
        assert!(view.top_right.y > view.bottom_left.y);
        assert!((view.height() - view.width() * 0.75).abs() < 1e-12);
        // 300px of an 800px-wide, 5-unit window
        assert!((view.width() - 300.0 * 5.0 / 800.0).abs() < 1e-12);
    }

    #[test]
    fn zoom_maps_selected_pixels() {
        let mut nav = Navigator::new(1000, 500);
        // press at bottom-left of the screen, drag right and up
        nav.handle_input(&down(0.0, 500.0));
        nav.handle_input(&up(500.0, 0.0));
        let view = nav.current();
        assert!(approx_eq(view.bottom_left, DVec2::new(-2.5, -1.4), 1e-12));
        assert!(approx_eq(view.top_right, DVec2::new(0.0, -1.4 + 1.25), 1e-12));
    }

    #[test]
    fn secondary_release_does_not_zoom() {
        let mut nav = Navigator::new(800, 600);
        let before = nav.current();
        nav.handle_input(&InputEvent::PointerUp { button: PointerButton::Secondary, x: 400.0, y: 10.0 });
        assert_eq!(nav.current(), before);
    }

    #[test]
    fn resize_rederives_height() {
        let mut nav = Navigator::new(800, 600);
        nav.handle_input(&InputEvent::Resize { width: 1000, height: 250 });
        let view = nav.current();
        assert!((view.height() - view.width() * 0.25).abs() < 1e-12);
        assert_eq!(view.bottom_left, DVec2::new(-2.5, -1.4));
    }

    #[test]
    fn selection_outline_tracks_drag() {
        let mut nav = Navigator::new(800, 600);
        assert!(nav.selection().is_none());
        nav.handle_input(&down(100.0, 500.0));
        nav.handle_input(&InputEvent::PointerMove { x: 102.0, y: 400.0 });
        assert!(nav.selection().is_none());
        nav.handle_input(&InputEvent::PointerMove { x: 300.0, y: 400.0 });
        let [min, max] = nav.selection().expect("drag is wide enough");
        assert_eq!(min.x, 100.0);
        assert_eq!(max.x, 300.0);
        assert!((max.y - min.y - 150.0).abs() < 1e-4);
        assert_eq!(max.y, 500.0);
    }

    #[test]
    fn pointer_probe_maps_through_window() {
        let mut nav = Navigator::new(1000, 500);
        nav.handle_input(&InputEvent::PointerMove { x: 0.0, y: 500.0 });
        assert!(approx_eq(nav.pointer_c().expect("pointer seen"), DVec2::new(-2.5, -1.4), 1e-12));
        nav.handle_input(&InputEvent::PointerLeave);
        assert!(nav.pointer_c().is_none());
    }
}
