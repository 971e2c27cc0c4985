use crate::frame::Frame;
use crate::input::Key;

/// Events the presentation collaborator delivers each loop iteration, in
/// arrival order. `Tick` is the control-send timer (the window toolkit
/// owns the timer, same as the SDK owns the network).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Tick,
    Quit,
    KeyDown(Key),
    KeyUp(Key),
}

/// Pollable event stream. `drain()` returns everything pending and never
/// blocks.
pub trait EventSource {
    fn drain(&mut self) -> Vec<Event>;
}

/// The composed display surface. Pixel dimensions are expected to be
/// `pane_w * grid_columns` by `pane_h * grid_rows`; font rendering for
/// `draw_status` lives behind this trait, not in this crate.
pub trait Screen {
    fn clear(&mut self);
    fn blit(&mut self, frame: &Frame, x: u32, y: u32);
    fn draw_status(&mut self, line: &str, x: u32, y: u32);
    fn present(&mut self);
}
