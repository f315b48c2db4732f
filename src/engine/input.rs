// Input routing for the mounted engine
// Translates winit window events into engine-level pointer/resize events and
// keeps a last-write-wins snapshot each engine reads at the start of a frame.

use glam::Vec2;
use winit::event::{ElementState, MouseButton, WindowEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
    Other,
}

impl From<MouseButton> for PointerButton {
    fn from(button: MouseButton) -> Self {
        match button {
            MouseButton::Left => PointerButton::Primary,
            MouseButton::Right => PointerButton::Secondary,
            _ => PointerButton::Other,
        }
    }
}

/// Screen coordinates are physical pixels, origin top-left, y down.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    PointerMove { x: f32, y: f32 },
    PointerDown { button: PointerButton, x: f32, y: f32 },
    PointerUp { button: PointerButton, x: f32, y: f32 },
    PointerLeave,
    Resize { width: u32, height: u32 },
}

impl InputEvent {
    /// Events that end a press or change the viewport. These reach the engine
    /// even when the overlay captured the pointer, so held state cannot stick.
    pub fn must_reach_engine(&self) -> bool {
        matches!(
            self,
            InputEvent::PointerUp { .. } | InputEvent::PointerLeave | InputEvent::Resize { .. }
        )
    }
}

/// Stateful translator: winit reports button presses without a position, so
/// the last cursor position is remembered and attached to down/up events.
#[derive(Debug, Default)]
pub struct InputRouter {
    cursor: Option<Vec2>,
}

impl InputRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a winit WindowEvent; returns the engine event it maps to, if any.
    pub fn translate(&mut self, event: &WindowEvent) -> Option<InputEvent> {
        match event {
            WindowEvent::CursorMoved { position, .. } => {
                let (x, y) = (position.x as f32, position.y as f32);
                self.cursor = Some(Vec2::new(x, y));
                Some(InputEvent::PointerMove { x, y })
            }
            WindowEvent::CursorLeft { .. } => {
                self.cursor = None;
                Some(InputEvent::PointerLeave)
            }
            WindowEvent::MouseInput { state, button, .. } => {
                let cursor = self.cursor?;
                let button = PointerButton::from(*button);
                Some(match state {
                    ElementState::Pressed => InputEvent::PointerDown { button, x: cursor.x, y: cursor.y },
                    ElementState::Released => InputEvent::PointerUp { button, x: cursor.x, y: cursor.y },
                })
            }
            WindowEvent::Resized(size) => Some(InputEvent::Resize {
                width: size.width,
                height: size.height,
            }),
            _ => None,
        }
    }
}

/// Latest observed pointer and viewport values, owned by an engine.
#[derive(Debug, Clone, Copy)]
pub struct PointerState {
    pub position: Option<Vec2>,
    pub primary_held: bool,
    pub viewport: (u32, u32),
}

impl PointerState {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            position: None,
            primary_held: false,
            viewport: (width.max(1), height.max(1)),
        }
    }

    /// Record an event. Only the latest value of each field survives.
    pub fn record(&mut self, event: &InputEvent) {
        match *event {
            InputEvent::PointerMove { x, y } => {
                self.position = Some(Vec2::new(x, y));
            }
            InputEvent::PointerDown { button, x, y } => {
                self.position = Some(Vec2::new(x, y));
                if button == PointerButton::Primary {
                    self.primary_held = true;
                }
            }
            InputEvent::PointerUp { button, x, y } => {
                self.position = Some(Vec2::new(x, y));
                if button == PointerButton::Primary {
                    self.primary_held = false;
                }
            }
            InputEvent::PointerLeave => {
                self.primary_held = false;
            }
            InputEvent::Resize { width, height } => {
                if width > 0 && height > 0 {
                    self.viewport = (width, height);
                }
            }
        }
    }

    /// Pointer in [0,1]² with y up, as used by the flock and fractal shaders.
    pub fn normalized(&self) -> Option<Vec2> {
        let (w, h) = self.viewport;
        self.position
            .map(|p| Vec2::new(p.x / w as f32, 1.0 - p.y / h as f32))
    }
}
