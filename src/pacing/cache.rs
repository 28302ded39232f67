//! Last real frame, kept for idle duplication

use std::time::{Duration, Instant};

use tracing::debug;

use crate::capture::Frame;
use crate::error::{PacerError, Result};

/// Deep copy of the most recent real frame, kept for duplication.
///
/// The buffer only ever grows. A larger frame is copied into a fresh
/// allocation that replaces the old one only after the copy succeeded, so
/// the previous content survives a failed grow.
pub struct LastFrameCache {
    frame: Frame,
}

impl LastFrameCache {
    pub fn new() -> Self {
        Self {
            frame: Frame::empty(),
        }
    }

    /// Cached frame, once a real capture has been stored.
    pub fn frame(&self) -> Option<&Frame> {
        self.frame.capture_time.map(|_| &self.frame)
    }

    pub fn buffer_len(&self) -> usize {
        self.frame.buffer_len()
    }

    /// Time since the cached capture, `None` before the first capture.
    pub fn idle_for(&self, now: Instant) -> Option<Duration> {
        self.frame
            .capture_time
            .map(|captured| now.saturating_duration_since(captured))
    }

    pub fn store(&mut self, frame: &Frame) -> Result<()> {
        let staged = self.prepare(frame.pixels().len())?;
        self.commit(frame, staged);
        Ok(())
    }

    /// Allocate room for `len` content bytes without touching the cached
    /// frame. The result is handed to [`commit`](Self::commit).
    pub fn prepare(&self, len: usize) -> Result<Option<Vec<u8>>> {
        if len <= self.frame.buffer_len() {
            return Ok(None);
        }
        let mut grown = Vec::new();
        grown
            .try_reserve_exact(len)
            .map_err(|_| PacerError::Allocation { bytes: len })?;
        Ok(Some(grown))
    }

    /// Replace the cached frame with `frame`. Cannot fail once `staged`
    /// came from [`prepare`](Self::prepare) for this frame.
    pub fn commit(&mut self, frame: &Frame, staged: Option<Vec<u8>>) {
        let pixels = frame.pixels();
        match staged {
            Some(mut grown) if grown.capacity() >= pixels.len() => {
                grown.extend_from_slice(pixels);
                debug!(
                    "Last-frame cache grew {} -> {} bytes",
                    self.frame.buffer_len(),
                    grown.len()
                );
                self.frame.data = grown;
            }
            _ if pixels.len() <= self.frame.buffer_len() => {
                self.frame.data[..pixels.len()].copy_from_slice(pixels);
            }
            _ => self.frame.data = pixels.to_vec(),
        }
        self.frame.meta = frame.meta;
        self.frame.capture_time = frame.capture_time;
    }

    /// Forget the cached frame but keep its allocation.
    pub fn clear(&mut self) {
        self.frame.meta = Default::default();
        self.frame.capture_time = None;
    }
}

impl Default for LastFrameCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::PixelFormat;

    fn captured(value: u8, width: u32, height: u32) -> Frame {
        let mut frame = Frame::empty();
        let len = PixelFormat::Rgba.row_bytes(width) * height as usize;
        frame
            .fill_flipped(&vec![value; len], width, height, PixelFormat::Rgba)
            .unwrap();
        frame.capture_time = Some(Instant::now());
        frame
    }

    #[test]
    fn test_empty_before_first_store() {
        let cache = LastFrameCache::new();
        assert!(cache.frame().is_none());
        assert!(cache.idle_for(Instant::now()).is_none());
        assert_eq!(cache.buffer_len(), 0);
    }

    #[test]
    fn test_store_grows_only() {
        let mut cache = LastFrameCache::new();
        cache.store(&captured(1, 8, 8)).unwrap();
        assert_eq!(cache.buffer_len(), 256);

        cache.store(&captured(2, 2, 2)).unwrap();
        assert_eq!(cache.buffer_len(), 256);
        let frame = cache.frame().unwrap();
        assert_eq!(frame.pixels(), &[2u8; 16][..]);
        assert_eq!(frame.meta.width, 2);

        cache.store(&captured(3, 16, 16)).unwrap();
        assert_eq!(cache.buffer_len(), 1024);
        assert!(cache.frame().unwrap().pixels().iter().all(|&b| b == 3));
    }

    #[test]
    fn test_prepare_leaves_content_untouched() {
        let mut cache = LastFrameCache::new();
        cache.store(&captured(1, 4, 4)).unwrap();

        assert!(cache.prepare(64).unwrap().is_none());
        let staged = cache.prepare(256).unwrap();
        assert!(staged.as_ref().is_some_and(|buf| buf.capacity() >= 256));
        assert_eq!(cache.buffer_len(), 64);
        assert!(cache.frame().unwrap().pixels().iter().all(|&b| b == 1));

        // A staged buffer that is never committed changes nothing.
        drop(staged);
        assert_eq!(cache.frame().unwrap().meta.width, 4);

        let next = captured(2, 8, 8);
        let staged = cache.prepare(next.pixels().len()).unwrap();
        cache.commit(&next, staged);
        assert_eq!(cache.buffer_len(), 256);
        assert!(cache.frame().unwrap().pixels().iter().all(|&b| b == 2));
    }

    #[test]
    fn test_prepare_reports_allocation_failure() {
        let cache = LastFrameCache::new();
        assert!(matches!(
            cache.prepare(usize::MAX),
            Err(PacerError::Allocation { .. })
        ));
    }

    #[test]
    fn test_clear_keeps_allocation() {
        let mut cache = LastFrameCache::new();
        cache.store(&captured(1, 4, 4)).unwrap();
        cache.clear();
        assert!(cache.frame().is_none());
        assert_eq!(cache.buffer_len(), 64);
    }
}
