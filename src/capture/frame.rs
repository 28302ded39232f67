use std::time::Instant;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{PacerError, Result};

/// One captured or duplicated image.
///
/// The pixel buffer is owned exclusively by whoever holds the frame. Its
/// allocated length may exceed `meta.buffer_size`; only the first
/// `buffer_size` bytes are content.
#[derive(Clone)]
pub struct Frame {
    pub data: Vec<u8>,

    pub meta: FrameMetadata,

    /// When the real capture happened. Duplicates carry the time of the
    /// capture they repeat. `None` until the frame is populated.
    pub capture_time: Option<Instant>,
}

/// Frame metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameMetadata {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub format: PixelFormat,
    /// Bytes actually populated, `height * stride` for a full capture
    pub buffer_size: usize,
    /// Presentation timestamp in frame-interval ticks since the session epoch
    pub pts: u64,
    pub duplicate: bool,
}

/// Packed pixel formats a capture session can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    #[default]
    Rgba,
    Bgra,
    Rgb24,
    Bgr24,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba | PixelFormat::Bgra => 4,
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => 3,
        }
    }

    /// Bytes in one tightly packed row of `width` pixels.
    pub fn row_bytes(self, width: u32) -> usize {
        width as usize * self.bytes_per_pixel()
    }
}

impl Frame {
    /// A frame with no buffer and no content.
    pub fn empty() -> Self {
        Self {
            data: Vec::new(),
            meta: FrameMetadata::default(),
            capture_time: None,
        }
    }

    /// Populated pixel bytes.
    pub fn pixels(&self) -> &[u8] {
        &self.data[..self.meta.buffer_size.min(self.data.len())]
    }

    /// Length of the pixel buffer in bytes, not its allocation capacity.
    /// Content occupies the first `meta.buffer_size` bytes.
    pub fn buffer_len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meta.buffer_size == 0
    }

    /// Row `index` counted from the top of the image.
    pub fn row(&self, index: u32) -> Option<&[u8]> {
        if index >= self.meta.height {
            return None;
        }
        let stride = self.meta.stride as usize;
        let start = index as usize * stride;
        let row_len = self.meta.format.row_bytes(self.meta.width);
        self.data.get(start..start + row_len)
    }

    /// Grow the buffer to at least `len` bytes, keeping existing content.
    pub fn ensure_len(&mut self, len: usize) -> Result<()> {
        if self.data.len() >= len {
            return Ok(());
        }
        let additional = len - self.data.len();
        self.data
            .try_reserve_exact(additional)
            .map_err(|_| PacerError::Allocation { bytes: len })?;
        self.data.resize(len, 0);
        Ok(())
    }

    /// Populate this frame from a bottom-up readback buffer.
    ///
    /// `src` holds `height` tightly packed rows with the bottom image row
    /// first. The frame ends up top-down with `stride == row_bytes(width)`.
    pub fn fill_flipped(
        &mut self,
        src: &[u8],
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<()> {
        let row_len = format.row_bytes(width);
        let size = row_len * height as usize;
        if src.len() < size {
            return Err(PacerError::Source(format!(
                "readback holds {} bytes, {}x{} {:?} needs {}",
                src.len(),
                width,
                height,
                format,
                size
            )));
        }
        self.ensure_len(size)?;

        if row_len > 0 {
            let rows = src[..size].chunks_exact(row_len).rev();
            for (dst_row, src_row) in self.data[..size].chunks_exact_mut(row_len).zip(rows) {
                dst_row.copy_from_slice(src_row);
            }
        }

        self.meta.width = width;
        self.meta.height = height;
        self.meta.stride = row_len as u32;
        self.meta.format = format;
        self.meta.buffer_size = size;
        self.meta.duplicate = false;
        Ok(())
    }

    /// Deep copy of `other`'s content and metadata into this frame's buffer.
    pub fn copy_from(&mut self, other: &Frame) -> Result<()> {
        let pixels = other.pixels();
        self.ensure_len(pixels.len())?;
        self.data[..pixels.len()].copy_from_slice(pixels);
        self.meta = other.meta;
        self.capture_time = other.capture_time;
        Ok(())
    }

    /// Give the content to an encoder stage without copying it.
    pub fn into_bytes(mut self) -> Bytes {
        let len = self.meta.buffer_size.min(self.data.len());
        self.data.truncate(len);
        Bytes::from(self.data)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("meta", &self.meta)
            .field("buffer_len", &self.data.len())
            .field("captured", &self.capture_time.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bottom-up buffer where every byte of GL row `r` equals `r`.
    fn bottom_up(width: u32, height: u32, format: PixelFormat) -> Vec<u8> {
        let row_len = format.row_bytes(width);
        (0..height)
            .flat_map(|r| std::iter::repeat(r as u8).take(row_len))
            .collect()
    }

    #[test]
    fn test_fill_flipped_reverses_rows() {
        let src = bottom_up(3, 4, PixelFormat::Rgba);
        let mut frame = Frame::empty();
        frame.fill_flipped(&src, 3, 4, PixelFormat::Rgba).unwrap();

        assert_eq!(frame.meta.stride, 12);
        assert_eq!(frame.meta.buffer_size, 48);
        assert_eq!(frame.row(0).unwrap(), &[3u8; 12][..]);
        assert_eq!(frame.row(3).unwrap(), &[0u8; 12][..]);
        assert!(frame.row(4).is_none());
    }

    #[test]
    fn test_fill_flipped_preserves_row_layout() {
        // One row of distinct bytes must come through unchanged.
        let src: Vec<u8> = (0..8).collect();
        let mut frame = Frame::empty();
        frame.fill_flipped(&src, 2, 1, PixelFormat::Bgra).unwrap();
        assert_eq!(frame.pixels(), &src[..]);
    }

    #[test]
    fn test_fill_flipped_short_source() {
        let mut frame = Frame::empty();
        let err = frame
            .fill_flipped(&[0u8; 10], 4, 4, PixelFormat::Rgba)
            .unwrap_err();
        assert!(matches!(err, PacerError::Source(_)));
        assert!(frame.is_empty());
    }

    #[test]
    fn test_fill_reuses_larger_buffer() {
        let mut frame = Frame::empty();
        frame
            .fill_flipped(&bottom_up(8, 8, PixelFormat::Rgba), 8, 8, PixelFormat::Rgba)
            .unwrap();
        frame
            .fill_flipped(&bottom_up(2, 2, PixelFormat::Rgb24), 2, 2, PixelFormat::Rgb24)
            .unwrap();

        assert_eq!(frame.buffer_len(), 256);
        assert_eq!(frame.pixels().len(), 12);
        assert_eq!(frame.meta.format, PixelFormat::Rgb24);
    }

    #[test]
    fn test_copy_from_is_deep() {
        let mut original = Frame::empty();
        original
            .fill_flipped(&bottom_up(4, 4, PixelFormat::Rgba), 4, 4, PixelFormat::Rgba)
            .unwrap();
        original.meta.pts = 7;

        let mut copy = Frame::empty();
        copy.copy_from(&original).unwrap();
        original.data[0] = 0xff;

        assert_eq!(copy.meta, original.meta);
        assert_eq!(copy.data[0], 3);
        assert_eq!(copy.into_bytes().len(), 64);
    }

    #[test]
    fn test_into_bytes_drops_slack() {
        let mut frame = Frame::empty();
        frame
            .fill_flipped(&bottom_up(4, 4, PixelFormat::Rgba), 4, 4, PixelFormat::Rgba)
            .unwrap();
        frame
            .fill_flipped(&bottom_up(2, 2, PixelFormat::Rgba), 2, 2, PixelFormat::Rgba)
            .unwrap();
        assert_eq!(frame.buffer_len(), 64);

        let bytes = frame.into_bytes();
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[..8], &[1u8; 8][..]);
    }
}
