// Engine module - the three procedural visualizations and their shared contract
// One engine is mounted at a time; the frame driver and input router in main.rs
// talk to it only through `Mounted`.

pub mod boids;
pub mod debug_overlay;
pub mod fractal;
pub mod gpu;
pub mod input;
pub mod life;

use glam::Vec2;

use crate::config::Config;
pub use gpu::{GpuContext, GpuError};
pub use input::{InputEvent, InputRouter};

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Demo {
    /// Toroidal cellular automaton with a paint brush
    Life,
    /// Flocking simulation following the pointer
    Boids,
    /// Escape-time fractal with drag-to-zoom and right-click undo
    Fractal,
}

impl Demo {
    pub fn title(self) -> &'static str {
        match self {
            Demo::Life => "Game of Life",
            Demo::Boids => "Boids",
            Demo::Fractal => "Mandelbrot",
        }
    }
}

/// Contract every visualization implements. Input handlers only record state;
/// simulation work happens in `update`, once per frame.
pub trait Engine {
    fn name(&self) -> &'static str;

    fn handle_input(&mut self, event: &InputEvent);

    /// Advance by `dt` seconds and stage GPU uploads/compute for this frame.
    fn update(&mut self, gpu: &GpuContext, dt: f32);

    fn render(&mut self, encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView);

    /// Engine-specific lines for the stats overlay.
    fn stats(&self) -> Vec<String>;

    /// In-progress selection rectangle in physical screen pixels (min, max), y down.
    fn selection(&self) -> Option<[Vec2; 2]> {
        None
    }

    /// Drop every GPU resource the engine owns. Called at most once by `Mounted`.
    fn release(&mut self);
}

/// Teardown handle for a mounted engine. Frames stop being delivered after
/// `teardown`, which is idempotent and also runs on drop.
pub struct Mounted {
    engine: Option<Box<dyn Engine>>,
}

impl Mounted {
    pub fn new(engine: Box<dyn Engine>) -> Self {
        log::info!("Mounted {}", engine.name());
        Self { engine: Some(engine) }
    }

    pub fn engine(&self) -> Option<&dyn Engine> {
        self.engine.as_deref()
    }

    pub fn handle_input(&mut self, event: &InputEvent) {
        if let Some(engine) = self.engine.as_mut() {
            engine.handle_input(event);
        }
    }

    /// Run one update + render. Returns false once torn down.
    pub fn frame(
        &mut self,
        gpu: &GpuContext,
        dt: f32,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
    ) -> bool {
        match self.engine.as_mut() {
            Some(engine) => {
                engine.update(gpu, dt);
                engine.render(encoder, view);
                true
            }
            None => false,
        }
    }

    pub fn teardown(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.release();
            log::info!("Tore down {}", engine.name());
        }
    }
}

impl Drop for Mounted {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Allocate the selected engine's state and GPU resources. Anything created
/// before a failure is dropped on the error path.
pub fn mount(demo: Demo, gpu: &GpuContext, config: &Config) -> Result<Mounted, GpuError> {
    let engine: Box<dyn Engine> = match demo {
        Demo::Life => Box::new(life::LifeEngine::new(gpu, config)?),
        Demo::Boids => Box::new(boids::FlockEngine::new(gpu, config)?),
        Demo::Fractal => Box::new(fractal::FractalEngine::new(gpu, config)?),
    };
    Ok(Mounted::new(engine))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct CountingEngine {
        releases: Rc<Cell<u32>>,
        inputs: Rc<Cell<u32>>,
    }

    impl Engine for CountingEngine {
        fn name(&self) -> &'static str {
            "counting"
        }
        fn handle_input(&mut self, _event: &InputEvent) {
            self.inputs.set(self.inputs.get() + 1);
        }
        fn update(&mut self, _gpu: &GpuContext, _dt: f32) {}
        fn render(&mut self, _encoder: &mut wgpu::CommandEncoder, _view: &wgpu::TextureView) {}
        fn stats(&self) -> Vec<String> {
            Vec::new()
        }
        fn release(&mut self) {
            self.releases.set(self.releases.get() + 1);
        }
    }

    fn counting() -> (Mounted, Rc<Cell<u32>>, Rc<Cell<u32>>) {
        let releases = Rc::new(Cell::new(0));
        let inputs = Rc::new(Cell::new(0));
        let mounted = Mounted::new(Box::new(CountingEngine {
            releases: releases.clone(),
            inputs: inputs.clone(),
        }));
        (mounted, releases, inputs)
    }

    #[test]
    fn teardown_is_idempotent() {
        let (mut mounted, releases, _) = counting();
        mounted.teardown();
        mounted.teardown();
        assert_eq!(releases.get(), 1);
        assert!(mounted.engine().is_none());
        drop(mounted);
        assert_eq!(releases.get(), 1);
    }

    #[test]
    fn drop_releases_resources() {
        let (mounted, releases, _) = counting();
        drop(mounted);
        assert_eq!(releases.get(), 1);
    }

    #[test]
    fn input_after_teardown_is_ignored() {
        let (mut mounted, _, inputs) = counting();
        mounted.handle_input(&InputEvent::PointerLeave);
        mounted.teardown();
        mounted.handle_input(&InputEvent::PointerLeave);
        assert_eq!(inputs.get(), 1);
        assert!(mounted.engine().is_none());
    }
}
