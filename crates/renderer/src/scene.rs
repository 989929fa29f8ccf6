//! The capability interface a demo implements to be driven by a [`FrameLoop`].
//!
//! [`FrameLoop`]: crate::host::FrameLoop

use waves_rhi::command::DrawIndexed;

use crate::error::RenderResult;
use crate::frame_resource::{SlotLayout, SlotWriter};

/// Timing information for one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameTime {
    /// Seconds since the loop started, excluding pauses.
    pub total: f32,
    /// Seconds since the previous frame.
    pub delta: f32,
    /// Frames completed before this one.
    pub frame: u64,
}

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// Input forwarded to the scene by whatever owns the window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    /// Cursor moved by `(dx, dy)` pixels while `button` was held.
    MouseDrag { button: MouseButton, dx: f32, dy: f32 },
    /// Scroll wheel moved by `delta` lines.
    Scroll { delta: f32 },
}

/// A demo driven once per frame by the host loop.
///
/// The host calls [`update`](Self::update) before acquiring a frame slot and
/// [`render`](Self::render) once the slot is safe to write.
pub trait Scene {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Buffer counts every frame slot must provide for this scene.
    fn slot_layout(&self) -> SlotLayout;

    /// One-time setup before the first frame.
    ///
    /// `frames_in_flight` is the number of slots in the host's ring. Data
    /// uploaded once per slot must be written that many times.
    fn init(&mut self, _frames_in_flight: usize) -> RenderResult<()> {
        Ok(())
    }

    /// Advances CPU-side state. No slot is held during this call.
    fn update(&mut self, time: &FrameTime) -> RenderResult<()>;

    /// Writes this frame's constants into `slot` and appends its draws.
    fn render(
        &mut self,
        time: &FrameTime,
        slot: &mut dyn SlotWriter,
        draws: &mut Vec<DrawIndexed>,
    ) -> RenderResult<()>;

    fn on_input(&mut self, _event: &InputEvent) {}

    /// Called after the host has drained all in-flight frames.
    fn on_resize(&mut self, _width: u32, _height: u32) {}

    /// Called once the GPU has finished every frame at shutdown.
    fn on_shutdown(&mut self) {}
}
