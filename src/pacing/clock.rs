//! Session epoch and presentation timestamp arithmetic

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// How duplicate and real frames get their pts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PtsPolicy {
    /// Elapsed time since the epoch divided by the frame interval.
    #[default]
    Elapsed,
    /// One tick per published frame, regardless of elapsed time.
    Counter,
}

/// Frame interval in microseconds, rounded up by one so truncation never
/// makes the interval shorter than the real frame period.
pub fn frame_interval_us(target_fps: u32) -> u64 {
    1_000_000 / u64::from(target_fps.max(1)) + 1
}

/// Lowest acceptable delivery rate, at least 1 fps.
pub fn minimum_rate(target_fps: u32, fraction: f64) -> u32 {
    // The epsilon keeps 30 * 0.8 from landing on 23.999...
    let rate = (f64::from(target_fps) * fraction + 1e-9).floor();
    (rate as u32).max(1)
}

/// Longest tolerated gap between published frames.
pub fn duplication_interval(minimum_rate: u32) -> Duration {
    Duration::from_nanos(1_000_000_000 / u64::from(minimum_rate.max(1)))
}

/// Epoch and pts bookkeeping for one capture session.
#[derive(Debug, Clone)]
pub struct SessionClock {
    initial_time: Instant,
    frame_interval_us: u64,
    policy: PtsPolicy,
    last_pts: Option<u64>,
}

impl SessionClock {
    pub fn start(initial_time: Instant, target_fps: u32, policy: PtsPolicy) -> Self {
        Self {
            initial_time,
            frame_interval_us: frame_interval_us(target_fps),
            policy,
            last_pts: None,
        }
    }

    pub fn initial_time(&self) -> Instant {
        self.initial_time
    }

    pub fn frame_interval_us(&self) -> u64 {
        self.frame_interval_us
    }

    pub fn last_pts(&self) -> Option<u64> {
        self.last_pts
    }

    /// `floor((t - initial_time) / frame_interval)`; instants before the
    /// epoch map to 0.
    pub fn elapsed_pts(&self, t: Instant) -> u64 {
        let elapsed_us = t.saturating_duration_since(self.initial_time).as_micros();
        (elapsed_us / u128::from(self.frame_interval_us)) as u64
    }

    /// Pts for the next published frame at time `t`.
    ///
    /// Always strictly greater than the previous one, even when two frames
    /// land inside the same frame interval.
    pub fn stamp(&mut self, t: Instant) -> u64 {
        let pts = match (self.policy, self.last_pts) {
            (PtsPolicy::Elapsed, Some(last)) => self.elapsed_pts(t).max(last + 1),
            (PtsPolicy::Elapsed, None) => self.elapsed_pts(t),
            (PtsPolicy::Counter, Some(last)) => last + 1,
            (PtsPolicy::Counter, None) => 0,
        };
        self.last_pts = Some(pts);
        pts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_interval_rounds_up() {
        assert_eq!(frame_interval_us(30), 33_334);
        assert_eq!(frame_interval_us(60), 16_667);
        assert_eq!(frame_interval_us(25), 40_001);
        assert_eq!(frame_interval_us(0), 1_000_001);
    }

    #[test]
    fn test_minimum_rate() {
        assert_eq!(minimum_rate(30, 0.8), 24);
        assert_eq!(minimum_rate(60, 0.8), 48);
        assert_eq!(minimum_rate(25, 0.8), 20);
        assert_eq!(minimum_rate(1, 0.5), 1);
        assert_eq!(minimum_rate(30, 1.0), 30);
    }

    #[test]
    fn test_duplication_interval_at_24fps() {
        let interval = duplication_interval(minimum_rate(30, 0.8));
        assert_eq!(interval, Duration::from_nanos(41_666_666));
    }

    #[test]
    fn test_elapsed_pts() {
        let t0 = Instant::now();
        let clock = SessionClock::start(t0, 30, PtsPolicy::Elapsed);
        assert_eq!(clock.elapsed_pts(t0), 0);
        assert_eq!(clock.elapsed_pts(t0 + Duration::from_micros(33_333)), 0);
        assert_eq!(clock.elapsed_pts(t0 + Duration::from_micros(33_334)), 1);
        assert_eq!(clock.elapsed_pts(t0 + Duration::from_millis(42)), 1);
        assert_eq!(clock.elapsed_pts(t0 + Duration::from_millis(84)), 2);
        assert_eq!(clock.elapsed_pts(t0 + Duration::from_secs(10)), 299);
    }

    #[test]
    fn test_stamp_is_strictly_increasing() {
        let t0 = Instant::now();
        let mut clock = SessionClock::start(t0, 30, PtsPolicy::Elapsed);
        assert_eq!(clock.stamp(t0), 0);
        // 5ms later is still inside the first interval.
        assert_eq!(clock.stamp(t0 + Duration::from_millis(5)), 1);
        assert_eq!(clock.stamp(t0 + Duration::from_millis(10)), 2);
        // Elapsed time catches up and takes over.
        assert_eq!(clock.stamp(t0 + Duration::from_millis(200)), 5);
        assert_eq!(clock.last_pts(), Some(5));
    }

    #[test]
    fn test_stamp_counter_policy() {
        let t0 = Instant::now();
        let mut clock = SessionClock::start(t0, 30, PtsPolicy::Counter);
        assert_eq!(clock.stamp(t0 + Duration::from_secs(3)), 0);
        assert_eq!(clock.stamp(t0 + Duration::from_secs(9)), 1);
    }
}
