//! Synthetic renderer output for the demo binary and tests

use crate::capture::frame::PixelFormat;
use crate::capture::source::{PixelSource, Viewport};
use crate::error::{PacerError, Result};

/// Test-pattern source that mimics a GL back buffer.
///
/// Every byte of bottom-up row `r` is `(r + seed) % 256`, so a correctly
/// flipped frame has row 0 equal to `(height - 1 + seed) % 256`.
pub struct SyntheticSource {
    viewport: Viewport,
    format: PixelFormat,
    prepared: bool,
    seed: u8,
    reads: u64,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            viewport: Viewport::new(width, height),
            format,
            prepared: true,
            seed: 0,
            reads: 0,
        }
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = Viewport::new(width, height);
    }

    pub fn set_prepared(&mut self, prepared: bool) {
        self.prepared = prepared;
    }

    /// Change the scene so the next read produces different content.
    pub fn advance(&mut self) {
        self.seed = self.seed.wrapping_add(1);
    }

    pub fn seed(&self) -> u8 {
        self.seed
    }

    /// Number of completed `read_pixels` calls.
    pub fn reads(&self) -> u64 {
        self.reads
    }

    /// Expected byte value of top-down row `row` after a correct flip, or
    /// `None` when `row` lies outside a `height`-row image.
    pub fn expected_row_value(&self, row: u32, height: u32) -> Option<u8> {
        let from_bottom = height.checked_sub(1)?.checked_sub(row)?;
        Some((from_bottom as u8).wrapping_add(self.seed))
    }
}

impl PixelSource for SyntheticSource {
    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn prepared(&self, _width: u32, _height: u32, _channels: usize) -> bool {
        self.prepared
    }

    fn read_pixels(&mut self, width: u32, height: u32, dst: &mut [u8]) -> Result<()> {
        let row_len = self.format.row_bytes(width);
        let size = row_len * height as usize;
        if dst.len() < size {
            return Err(PacerError::Source(format!(
                "destination holds {} bytes, need {}",
                dst.len(),
                size
            )));
        }
        if row_len > 0 {
            for (r, row) in dst[..size].chunks_exact_mut(row_len).enumerate() {
                row.fill((r as u8).wrapping_add(self.seed));
            }
        }
        self.reads += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_row_value_bounds() {
        let mut source = SyntheticSource::new(4, 3, PixelFormat::Rgba);
        source.advance();
        assert_eq!(source.expected_row_value(0, 3), Some(3));
        assert_eq!(source.expected_row_value(2, 3), Some(1));
        assert_eq!(source.expected_row_value(3, 3), None);
        assert_eq!(source.expected_row_value(0, 0), None);
    }
}
