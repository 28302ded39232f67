//! Pixel source seam between the renderer hook and the capture path

use crate::error::Result;

/// Current viewport size as reported by the graphics API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Both sides at least `min` pixels.
    pub fn is_usable(&self, min: u32) -> bool {
        self.width >= min && self.height >= min
    }
}

/// Delivers raw pixels from the renderer.
///
/// Called on the renderer's own thread, right after the host presents a
/// frame. Rows are delivered bottom row first, tightly packed in the
/// session's pixel format.
pub trait PixelSource {
    fn viewport(&self) -> Viewport;

    /// Whether the downstream pipeline is ready for frames of this size
    /// and channel layout.
    fn prepared(&self, width: u32, height: u32, channels: usize) -> bool;

    /// Read a `width` x `height` block from the origin into `dst`.
    fn read_pixels(&mut self, width: u32, height: u32, dst: &mut [u8]) -> Result<()>;
}
