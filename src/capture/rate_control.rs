use std::time::{Duration, Instant};

use tracing::debug;

/// Server-side gate consulted before each capture when rate control is on.
pub trait RateControl: Send {
    fn may_capture_now(&mut self) -> bool;

    /// Forget any history; called when a capture session is reset.
    fn reset(&mut self) {}
}

/// Permits at most one capture per interval.
pub struct IntervalRateControl {
    interval: Duration,
    last_permit: Option<Instant>,
}

impl IntervalRateControl {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_permit: None,
        }
    }

    /// Gate at the target frame rate.
    pub fn for_fps(target_fps: u32) -> Self {
        Self::new(Duration::from_micros(1_000_000 / u64::from(target_fps.max(1))))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn permit_at(&mut self, now: Instant) -> bool {
        match self.last_permit {
            Some(last) if now.saturating_duration_since(last) < self.interval => {
                debug!(
                    "Rate control declined capture ({:?} since last)",
                    now.saturating_duration_since(last)
                );
                false
            }
            _ => {
                self.last_permit = Some(now);
                true
            }
        }
    }
}

impl RateControl for IntervalRateControl {
    fn may_capture_now(&mut self) -> bool {
        self.permit_at(Instant::now())
    }

    fn reset(&mut self) {
        self.last_permit = None;
    }
}
