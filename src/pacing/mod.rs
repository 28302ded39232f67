//! Frame pacing: capture path, last-frame cache and idle duplication
//!
//! A [`FramePacer`] is built once per capture session. The renderer thread
//! calls [`FramePacer::capture`] after every present; a [`PacerThread`]
//! re-publishes the cached frame whenever the renderer goes quiet for
//! longer than the minimum-rate interval.

mod cache;
mod clock;
mod watchdog;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::utils::CachePadded;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, instrument, trace};

pub use cache::LastFrameCache;
pub use clock::{duplication_interval, frame_interval_us, minimum_rate, PtsPolicy, SessionClock};
pub use watchdog::PacerThread;

use crate::capture::{Frame, IntervalRateControl, PixelSource, RateControl, Viewport};
use crate::error::{PacerError, Result};
use crate::pipeline::FramePipeline;
use crate::Config;

/// Result of one capture call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    Published(PublishedFrame),
    Skipped(SkipReason),
}

/// Why a capture call produced nothing. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    ViewportTooSmall,
    NotPrepared,
    RateLimited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishedFrame {
    pub pts: u64,
    pub sequence: u64,
    pub duplicate: bool,
}

/// Session counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacerStats {
    pub captured: u64,
    pub duplicated: u64,
    pub skipped: u64,
}

#[derive(Default)]
struct Counters {
    captured: AtomicU64,
    duplicated: AtomicU64,
    skipped: AtomicU64,
}

/// State shared by the capture path and the pacer thread.
struct SharedState {
    cache: LastFrameCache,
    /// `None` until the first capture of a session
    clock: Option<SessionClock>,
    next_sequence: u64,
}

/// State only the renderer thread touches.
struct RendererState {
    readback: Vec<u8>,
    rate_control: Option<Box<dyn RateControl>>,
}

/// How a pacer wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wake {
    Captured,
    TimedOut,
    Spurious,
    Stopped,
}

/// "A real frame was just published", plus the pacer's stop request.
struct FrameSignal {
    state: Mutex<SignalState>,
    cond: Condvar,
}

#[derive(Default)]
struct SignalState {
    generation: u64,
    stopped: bool,
}

impl FrameSignal {
    fn new() -> Self {
        Self {
            state: Mutex::new(SignalState::default()),
            cond: Condvar::new(),
        }
    }

    fn notify(&self) {
        self.state.lock().generation += 1;
        self.cond.notify_all();
    }

    fn request_stop(&self) {
        self.state.lock().stopped = true;
        self.cond.notify_all();
    }

    fn clear_stop(&self) {
        self.state.lock().stopped = false;
    }

    fn wait_until(&self, deadline: Instant) -> Wake {
        let mut state = self.state.lock();
        if state.stopped {
            return Wake::Stopped;
        }
        let seen = state.generation;
        let timed_out = self.cond.wait_until(&mut state, deadline).timed_out();
        if state.stopped {
            Wake::Stopped
        } else if state.generation != seen {
            Wake::Captured
        } else if timed_out {
            Wake::TimedOut
        } else {
            Wake::Spurious
        }
    }
}

/// Frame pacing for one capture session.
pub struct FramePacer {
    config: Config,
    pipeline: Arc<dyn FramePipeline>,
    minimum_rate: u32,
    duplication_interval: Duration,

    shared: Mutex<SharedState>,
    renderer: Mutex<RendererState>,
    signal: FrameSignal,
    failed: AtomicBool,

    /// Statistics
    stats: CachePadded<Counters>,
}

impl FramePacer {
    pub fn new(config: Config, pipeline: Arc<dyn FramePipeline>) -> Result<Self> {
        config.validate()?;

        let pacing = &config.pacing;
        let minimum_rate = minimum_rate(pacing.target_fps, pacing.minimum_rate_fraction);
        let duplication_interval = duplication_interval(minimum_rate);
        let rate_control: Option<Box<dyn RateControl>> = if config.capture.rate_control {
            Some(Box::new(IntervalRateControl::for_fps(pacing.target_fps)))
        } else {
            None
        };

        info!(
            "Creating FramePacer: target_fps={}, minimum_rate={}, gap_limit={:?}, channels={}",
            pacing.target_fps, minimum_rate, duplication_interval, config.pipeline.channels
        );

        Ok(Self {
            minimum_rate,
            duplication_interval,
            pipeline,
            shared: Mutex::new(SharedState {
                cache: LastFrameCache::new(),
                clock: None,
                next_sequence: 0,
            }),
            renderer: Mutex::new(RendererState {
                readback: Vec::new(),
                rate_control,
            }),
            signal: FrameSignal::new(),
            failed: AtomicBool::new(false),
            stats: CachePadded::new(Counters::default()),
            config,
        })
    }

    /// Replace the rate-control gate. It is only consulted when
    /// `capture.rate_control` is enabled.
    pub fn with_rate_control(self, gate: Box<dyn RateControl>) -> Self {
        if self.config.capture.rate_control {
            self.renderer.lock().rate_control = Some(gate);
        }
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn minimum_rate(&self) -> u32 {
        self.minimum_rate
    }

    /// Longest gap tolerated before the pacer injects a duplicate.
    pub fn duplication_interval(&self) -> Duration {
        self.duplication_interval
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PacerStats {
        PacerStats {
            captured: self.stats.captured.load(Ordering::Relaxed),
            duplicated: self.stats.duplicated.load(Ordering::Relaxed),
            skipped: self.stats.skipped.load(Ordering::Relaxed),
        }
    }

    /// Copy of the cached last real frame.
    pub fn last_frame(&self) -> Option<Frame> {
        self.shared.lock().cache.frame().cloned()
    }

    pub fn session_clock(&self) -> Option<SessionClock> {
        self.shared.lock().clock.clone()
    }

    /// Capture path: turn the renderer's current back buffer into a frame
    /// and publish it.
    ///
    /// Runs on the renderer thread. Returns `Skipped` without touching any
    /// state when the viewport is too small, the pipeline is not prepared,
    /// or rate control declines.
    #[instrument(level = "trace", skip_all)]
    pub fn capture(&self, source: &mut dyn PixelSource) -> Result<CaptureOutcome> {
        if self.is_failed() {
            return Err(PacerError::SessionFailed);
        }

        let viewport = source.viewport();
        if !viewport.is_usable(self.config.capture.min_dimension) {
            return Ok(self.skip(SkipReason::ViewportTooSmall, viewport));
        }
        if !source.prepared(viewport.width, viewport.height, self.config.pipeline.channels) {
            return Ok(self.skip(SkipReason::NotPrepared, viewport));
        }

        let mut renderer = self.renderer.lock();
        if let Some(gate) = renderer.rate_control.as_mut() {
            if !gate.may_capture_now() {
                return Ok(self.skip(SkipReason::RateLimited, viewport));
            }
        }

        let started = Instant::now();
        let format = self.config.capture.pixel_format;
        let raw_len = format.row_bytes(viewport.width) * viewport.height as usize;
        let reserve = format.row_bytes(self.config.capture.output_width)
            * self.config.capture.output_height as usize;
        if let Err(err) = grow_readback(&mut renderer.readback, raw_len, reserve) {
            return Err(self.fail(err));
        }

        source.read_pixels(viewport.width, viewport.height, &mut renderer.readback[..raw_len])?;
        let now = Instant::now();

        let published = {
            let mut shared = self.shared.lock();
            self.publish_capture(&mut shared, &renderer.readback[..raw_len], viewport, now)
        }
        .map_err(|err| self.fail(err))?;
        drop(renderer);

        self.pipeline.notify_waiters();
        self.signal.notify();

        self.stats.captured.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("frames_captured").increment(1);
        metrics::histogram!("capture_time_us").record(started.elapsed().as_micros() as f64);
        trace!(
            "Captured {}x{} frame pts={} seq={}",
            viewport.width,
            viewport.height,
            published.pts,
            published.sequence
        );

        Ok(CaptureOutcome::Published(published))
    }

    /// Build, mirror and publish one real frame.
    ///
    /// Every fallible step runs against a staged clock and sequence number;
    /// the session only advances once nothing can fail anymore, so an error
    /// leaves the epoch, pts, sequence, cache and every channel as they were.
    fn publish_capture(
        &self,
        shared: &mut SharedState,
        raw: &[u8],
        viewport: Viewport,
        now: Instant,
    ) -> Result<PublishedFrame> {
        let pacing = &self.config.pacing;

        let mut frame = self.pipeline.acquire_writable();
        frame.fill_flipped(
            raw,
            viewport.width,
            viewport.height,
            self.config.capture.pixel_format,
        )?;

        let starting = shared.clock.is_none();
        let mut clock = shared
            .clock
            .clone()
            .unwrap_or_else(|| SessionClock::start(now, pacing.target_fps, pacing.pts_policy));
        let published = PublishedFrame {
            pts: clock.stamp(now),
            sequence: shared.next_sequence,
            duplicate: false,
        };
        frame.meta.pts = published.pts;
        frame.meta.sequence = published.sequence;
        frame.capture_time = Some(now);

        let staged = shared.cache.prepare(frame.pixels().len())?;
        // Mirrors first, so no channel sees a frame ahead of the others.
        self.pipeline.duplicate_to_secondary_channels(&frame)?;

        if starting {
            info!(
                "Capture session started at {}x{} (frame interval {}us)",
                viewport.width,
                viewport.height,
                clock.frame_interval_us()
            );
        }
        shared.clock = Some(clock);
        shared.next_sequence += 1;
        shared.cache.commit(&frame, staged);
        self.pipeline.publish(frame);

        Ok(published)
    }

    /// Re-publish the cached frame if the renderer has been idle for longer
    /// than the duplication interval.
    ///
    /// Returns `Ok(None)` before the first capture, while captures are
    /// recent, when the cached frame has no content, or after the session
    /// failed.
    pub fn inject_duplicate(&self, now: Instant) -> Result<Option<PublishedFrame>> {
        if self.is_failed() {
            return Ok(None);
        }

        let published = {
            let mut shared = self.shared.lock();
            let SharedState {
                cache,
                clock,
                next_sequence,
            } = &mut *shared;

            let (Some(cached), Some(idle), Some(clock)) =
                (cache.frame(), cache.idle_for(now), clock.as_mut())
            else {
                return Ok(None);
            };
            if idle <= self.duplication_interval {
                trace!("Renderer active {:?} ago; no duplicate", idle);
                return Ok(None);
            }
            if cached.is_empty() {
                debug!("Cached frame has no content; skipping duplicate");
                return Ok(None);
            }

            let mut frame = self.pipeline.acquire_writable();
            frame.copy_from(cached).map_err(|err| self.fail(err))?;

            let mut staged_clock = clock.clone();
            let published = PublishedFrame {
                pts: staged_clock.stamp(now),
                sequence: *next_sequence,
                duplicate: true,
            };
            frame.meta.pts = published.pts;
            frame.meta.sequence = published.sequence;
            frame.meta.duplicate = true;

            self.pipeline
                .duplicate_to_secondary_channels(&frame)
                .map_err(|err| self.fail(err))?;

            *clock = staged_clock;
            *next_sequence += 1;
            self.pipeline.publish(frame);
            debug!(
                "Injected duplicate pts={} seq={} after {:?} idle",
                published.pts, published.sequence, idle
            );
            published
        };

        self.pipeline.notify_waiters();
        self.stats.duplicated.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("frames_duplicated").increment(1);

        Ok(Some(published))
    }

    /// Start a new session: forget the epoch, the cached frame and any
    /// fatal error. Buffers keep their allocations.
    pub fn reset_session(&self) {
        let mut renderer = self.renderer.lock();
        if let Some(gate) = renderer.rate_control.as_mut() {
            gate.reset();
        }

        let mut shared = self.shared.lock();
        shared.cache.clear();
        shared.clock = None;
        shared.next_sequence = 0;
        self.failed.store(false, Ordering::Release);
        info!("Capture session reset");
    }

    pub(crate) fn wait_for_capture(&self, deadline: Instant) -> Wake {
        self.signal.wait_until(deadline)
    }

    fn skip(&self, reason: SkipReason, viewport: Viewport) -> CaptureOutcome {
        trace!(
            "Skipping capture ({:?}) for {}x{} viewport",
            reason,
            viewport.width,
            viewport.height
        );
        self.stats.skipped.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("frames_skipped").increment(1);
        CaptureOutcome::Skipped(reason)
    }

    /// Disable the session on fatal errors; pass the error through.
    fn fail(&self, err: PacerError) -> PacerError {
        if err.is_fatal() && !self.failed.swap(true, Ordering::AcqRel) {
            error!("Capture session disabled: {}", err);
        }
        err
    }
}

/// Size the reusable readback buffer: the configured output size on first
/// use, then whatever a larger viewport needs.
fn grow_readback(buf: &mut Vec<u8>, needed: usize, reserve: usize) -> Result<()> {
    if buf.len() >= needed {
        return Ok(());
    }
    let target = if buf.is_empty() {
        needed.max(reserve)
    } else {
        needed
    };
    buf.try_reserve_exact(target - buf.len())
        .map_err(|_| PacerError::Allocation { bytes: target })?;
    buf.resize(target, 0);
    Ok(())
}
