use std::sync::Mutex;

use chrono::{DateTime, Local};

const BYTES_PER_PIXEL: usize = 3;

/// One decoded RGB24 picture. `data` is row-major, `width * height * 3`
/// bytes. Decoding happened in the SDK; this crate only carries the pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
        }
    }

    /// Solid-color frame, handy for demos and tests.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let n = (width * height) as usize;
        let mut data = Vec::with_capacity(n * BYTES_PER_PIXEL);
        for _ in 0..n {
            data.extend_from_slice(&rgb);
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Re-order pixels into the display surface's column-major convention
    /// (rotate 90 degrees counter-clockwise, then flip vertically, which
    /// collapses to a transpose). A `w x h` frame comes back as `h x w`.
    pub fn to_display(&self) -> Frame {
        let w = self.width as usize;
        let h = self.height as usize;
        let mut out = vec![0u8; w * h * BYTES_PER_PIXEL];
        for y in 0..h {
            for x in 0..w {
                let src = (y * w + x) * BYTES_PER_PIXEL;
                let dst = (x * h + y) * BYTES_PER_PIXEL;
                out[dst..dst + BYTES_PER_PIXEL]
                    .copy_from_slice(&self.data[src..src + BYTES_PER_PIXEL]);
            }
        }
        Frame {
            width: self.height,
            height: self.width,
            data: out,
        }
    }
}

/// Single-slot "latest value" cell shared between one capture thread and
/// the main loop. Copy-on-write, copy-on-read; the lock is held only for
/// the duration of the copy and never across I/O or sleeps.
#[derive(Debug)]
pub struct FrameCell {
    slot: Mutex<Option<(Frame, DateTime<Local>)>>,
}

impl FrameCell {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    pub fn store(&self, frame: &Frame) {
        let mut g = self.slot.lock().unwrap();
        *g = Some((frame.clone(), Local::now()));
    }

    pub fn load(&self) -> Option<Frame> {
        let g = self.slot.lock().unwrap();
        g.as_ref().map(|(f, _)| f.clone())
    }

    pub fn last_capture(&self) -> Option<DateTime<Local>> {
        let g = self.slot.lock().unwrap();
        g.as_ref().map(|(_, t)| *t)
    }
}

impl Default for FrameCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of grid columns for a fleet of the given size, capped at 2.
pub fn grid_columns(fleet_size: usize) -> usize {
    fleet_size.min(2)
}

/// Number of grid rows needed for the fleet (ceiling division).
pub fn grid_rows(fleet_size: usize) -> usize {
    let cols = grid_columns(fleet_size);
    if cols == 0 {
        return 0;
    }
    (fleet_size + cols - 1) / cols
}

/// Pixel offset of the pane for the device at `index`, left-to-right then
/// top-to-bottom in registration order.
pub fn pane_position(index: usize, cols: usize, pane_w: u32, pane_h: u32) -> (u32, u32) {
    let col = index % cols;
    let row = index / cols;
    (col as u32 * pane_w, row as u32 * pane_h)
}
