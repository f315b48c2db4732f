// Procedural visualization gallery
// Mounts one engine (life, boids, or fractal) into a window and drives it
// once per display refresh. See DESIGN.md for the engine contract.

mod config;
mod engine;

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use winit::{
    event::{ElementState, Event as WinitEvent, KeyEvent, WindowEvent},
    event_loop::EventLoop,
    keyboard::{KeyCode, PhysicalKey},
    window::Window,
};

use config::Config;
use engine::debug_overlay::{DebugOverlay, DebugStats, FrameTimer};
use engine::{GpuContext, InputRouter, Mounted};

// ============================================================================
// APPLICATION STATE
// ============================================================================

struct State {
    window: Arc<Window>,
    /// `None` when no usable adapter was found; frames are then skipped.
    gpu: Option<GpuContext>,
    mounted: Option<Mounted>,
    overlay: Option<DebugOverlay>,
    router: InputRouter,
    timer: FrameTimer,
    last_frame: Instant,
}

impl State {
    fn new(window: Arc<Window>, config: &Config) -> Self {
        let gpu = match pollster::block_on(GpuContext::new(window.clone())) {
            Ok(gpu) => Some(gpu),
            Err(e) => {
                log::error!("GPU initialization failed: {e}");
                None
            }
        };

        let mounted = gpu.as_ref().and_then(|gpu| match engine::mount(config.demo, gpu, config) {
            Ok(mounted) => Some(mounted),
            Err(e) => {
                log::error!("Could not mount {:?}: {e}", config.demo);
                None
            }
        });

        let overlay = gpu
            .as_ref()
            .map(|gpu| DebugOverlay::new(&window, &gpu.device, gpu.format(), config.debug));

        Self {
            window,
            gpu,
            mounted,
            overlay,
            router: InputRouter::new(),
            timer: FrameTimer::new(),
            last_frame: Instant::now(),
        }
    }

    fn handle_window_event(&mut self, event: &WindowEvent) {
        if let WindowEvent::Resized(size) = event {
            if let Some(gpu) = self.gpu.as_mut() {
                gpu.resize(*size);
            }
        }

        let consumed = self
            .overlay
            .as_mut()
            .is_some_and(|overlay| overlay.handle_window_event(&self.window, event).consumed);

        if let Some(input) = self.router.translate(event) {
            if consumed && !input.must_reach_engine() {
                return;
            }
            if let Some(mounted) = self.mounted.as_mut() {
                mounted.handle_input(&input);
            }
        }
    }

    fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let dt = now - self.last_frame;
        self.last_frame = now;
        if let Some(fps) = self.timer.tick(dt) {
            let (avg, _, max) = self.timer.frame_times();
            log::info!("FPS: {fps} | frame {avg:.2} ms (max {max:.1})");
        }
        dt
    }

    fn render(&mut self, dt: f32) -> Result<(), wgpu::SurfaceError> {
        let Some(gpu) = self.gpu.as_ref() else {
            return Ok(());
        };

        let output = gpu.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame encoder"),
            });

        let drawn = self
            .mounted
            .as_mut()
            .is_some_and(|mounted| mounted.frame(gpu, dt, &mut encoder, &view));
        if !drawn {
            engine::gpu::clear(&mut encoder, &view);
        }

        if let Some(overlay) = self.overlay.as_mut() {
            let engine = self.mounted.as_ref().and_then(|mounted| mounted.engine());
            let selection = engine.and_then(|engine| engine.selection());
            let stats = overlay.visible.then(|| {
                DebugStats::new(
                    &self.timer,
                    (gpu.size.width, gpu.size.height),
                    engine.map_or("none", |engine| engine.name()),
                    engine.map(|engine| engine.stats()).unwrap_or_default(),
                )
            });

            if selection.is_some() || stats.is_some() {
                let screen_descriptor = egui_wgpu::ScreenDescriptor {
                    size_in_pixels: [gpu.config.width, gpu.config.height],
                    pixels_per_point: self.window.scale_factor() as f32,
                };
                overlay.render(
                    &gpu.device,
                    &gpu.queue,
                    &mut encoder,
                    &self.window,
                    &view,
                    &screen_descriptor,
                    selection,
                    stats.as_ref(),
                );
            }
        }

        gpu.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }

    fn reconfigure(&mut self) {
        if let Some(gpu) = self.gpu.as_mut() {
            let size = gpu.size;
            gpu.resize(size);
        }
    }

    fn teardown(&mut self) {
        if let Some(mounted) = self.mounted.as_mut() {
            mounted.teardown();
        }
    }
}

// ============================================================================
// MAIN
// ============================================================================

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::parse();
    log::info!("Starting {:?} demo", config.demo);

    let event_loop = EventLoop::new()?;

    let window_attributes = Window::default_attributes()
        .with_title(config.demo.title())
        .with_inner_size(winit::dpi::LogicalSize::new(config.width, config.height));

    let window = Arc::new(event_loop.create_window(window_attributes)?);

    let mut state = State::new(window.clone(), &config);

    event_loop.run(move |event, control_flow| match event {
        WinitEvent::WindowEvent {
            ref event,
            window_id,
        } if window_id == window.id() => match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        state: ElementState::Pressed,
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        ..
                    },
                ..
            } => {
                state.teardown();
                control_flow.exit();
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        state: ElementState::Pressed,
                        physical_key: PhysicalKey::Code(KeyCode::F3),
                        repeat: false,
                        ..
                    },
                ..
            } => {
                if let Some(overlay) = state.overlay.as_mut() {
                    overlay.toggle();
                }
            }
            WindowEvent::RedrawRequested => {
                let dt = state.tick();
                match state.render(dt.as_secs_f32()) {
                    Ok(()) => {}
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => state.reconfigure(),
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        log::error!("Surface out of memory");
                        state.teardown();
                        control_flow.exit();
                    }
                    Err(e) => log::warn!("Dropped frame: {e:?}"),
                }
            }
            other => state.handle_window_event(other),
        },
        WinitEvent::AboutToWait => {
            window.request_redraw();
        }
        _ => {}
    })?;

    Ok(())
}
