//! Single-slot frame exchange between the pacer and a downstream consumer

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crossbeam::utils::CachePadded;
use parking_lot::{Condvar, Mutex};

use crate::capture::Frame;
use crate::error::Result;

/// Hand-off buffer for one output channel.
///
/// The pacer acquires a writable frame, fills it, and publishes it, which
/// moves ownership downstream. `notify_waiters` wakes consumers blocked on
/// a just-published frame.
pub trait ExchangeSlot: Send + Sync {
    fn acquire_writable(&self) -> Frame;
    fn publish(&self, frame: Frame);
    fn notify_waiters(&self);
}

/// Mirrors a frame from channel 0 to every secondary channel.
pub trait ChannelFanout: Send + Sync {
    fn duplicate_to_secondary_channels(&self, frame: &Frame) -> Result<()>;
}

/// Everything the pacer needs from the downstream pipeline.
pub trait FramePipeline: ExchangeSlot + ChannelFanout {}

impl<T: ExchangeSlot + ChannelFanout> FramePipeline for T {}

/// Holds at most one published frame plus one spare buffer for reuse.
///
/// Publishing over an unconsumed frame replaces it; the replaced frame's
/// buffer becomes the spare.
pub struct FrameSlot {
    inner: Mutex<SlotInner>,
    ready: Condvar,

    /// Statistics
    stats: CachePadded<Stats>,
}

#[derive(Default)]
struct SlotInner {
    pending: Option<Frame>,
    spare: Option<Frame>,
}

#[derive(Default)]
struct Stats {
    frames_written: AtomicUsize,
    frames_read: AtomicUsize,
    frames_overwritten: AtomicUsize,
}

/// Counters for one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlotStats {
    pub written: usize,
    pub read: usize,
    pub overwritten: usize,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SlotInner::default()),
            ready: Condvar::new(),
            stats: CachePadded::new(Stats::default()),
        }
    }

    /// Consumer: take the published frame, if any.
    pub fn try_take(&self) -> Option<Frame> {
        let frame = self.inner.lock().pending.take();
        if frame.is_some() {
            self.stats.frames_read.fetch_add(1, Ordering::Relaxed);
        }
        frame
    }

    /// Consumer: wait up to `timeout` for a published frame.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Frame> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if let Some(frame) = inner.pending.take() {
                self.stats.frames_read.fetch_add(1, Ordering::Relaxed);
                return Some(frame);
            }
            if self.ready.wait_until(&mut inner, deadline).timed_out() {
                let frame = inner.pending.take();
                if frame.is_some() {
                    self.stats.frames_read.fetch_add(1, Ordering::Relaxed);
                }
                return frame;
            }
        }
    }

    /// Consumer: hand a drained frame back so its buffer can be reused.
    pub fn recycle(&self, frame: Frame) {
        let mut inner = self.inner.lock();
        if inner.spare.is_none() {
            inner.spare = Some(frame);
        }
    }

    pub fn has_pending(&self) -> bool {
        self.inner.lock().pending.is_some()
    }

    pub fn stats(&self) -> SlotStats {
        SlotStats {
            written: self.stats.frames_written.load(Ordering::Relaxed),
            read: self.stats.frames_read.load(Ordering::Relaxed),
            overwritten: self.stats.frames_overwritten.load(Ordering::Relaxed),
        }
    }
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl ExchangeSlot for FrameSlot {
    fn acquire_writable(&self) -> Frame {
        self.inner.lock().spare.take().unwrap_or_else(Frame::empty)
    }

    fn publish(&self, frame: Frame) {
        let mut inner = self.inner.lock();
        if let Some(stale) = inner.pending.replace(frame) {
            self.stats.frames_overwritten.fetch_add(1, Ordering::Relaxed);
            if inner.spare.is_none() {
                inner.spare = Some(stale);
            }
        }
        self.stats.frames_written.fetch_add(1, Ordering::Relaxed);
    }

    fn notify_waiters(&self) {
        self.ready.notify_all();
    }
}
