//! Primary exchange slot plus mirrored secondary channels

use std::sync::Arc;

use tracing::debug;

use crate::capture::Frame;
use crate::error::Result;
use crate::pipeline::exchange::{ChannelFanout, ExchangeSlot, FrameSlot, SlotStats};

/// One [`FrameSlot`] per output channel; channel 0 is primary.
pub struct ChannelSet {
    channels: Vec<Arc<FrameSlot>>,
}

impl ChannelSet {
    /// At least one channel is always created.
    pub fn new(count: usize) -> Self {
        let channels = (0..count.max(1)).map(|_| Arc::new(FrameSlot::new())).collect();
        Self { channels }
    }

    pub fn primary(&self) -> Arc<FrameSlot> {
        Arc::clone(&self.channels[0])
    }

    pub fn channel(&self, index: usize) -> Option<Arc<FrameSlot>> {
        self.channels.get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn stats(&self) -> Vec<SlotStats> {
        self.channels.iter().map(|c| c.stats()).collect()
    }
}

impl ExchangeSlot for ChannelSet {
    fn acquire_writable(&self) -> Frame {
        self.channels[0].acquire_writable()
    }

    fn publish(&self, frame: Frame) {
        self.channels[0].publish(frame);
    }

    fn notify_waiters(&self) {
        for channel in &self.channels {
            channel.notify_waiters();
        }
    }
}

impl ChannelFanout for ChannelSet {
    /// All mirrors are copied before any is published; a failed copy
    /// publishes nothing.
    fn duplicate_to_secondary_channels(&self, frame: &Frame) -> Result<()> {
        let secondaries = &self.channels[1..];
        let mut staged = Vec::with_capacity(secondaries.len());
        for channel in secondaries {
            let mut mirror = channel.acquire_writable();
            if let Err(err) = mirror.copy_from(frame) {
                channel.recycle(mirror);
                for (channel, mirror) in secondaries.iter().zip(staged) {
                    channel.recycle(mirror);
                }
                return Err(err);
            }
            staged.push(mirror);
        }

        for (index, (channel, mirror)) in secondaries.iter().zip(staged).enumerate() {
            channel.publish(mirror);
            debug!(channel = index + 1, pts = frame.meta.pts, "Mirrored frame");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::PixelFormat;

    #[test]
    fn test_single_channel_fanout_is_noop() {
        let set = ChannelSet::new(0);
        assert_eq!(set.len(), 1);
        set.duplicate_to_secondary_channels(&Frame::empty()).unwrap();
        assert_eq!(set.primary().stats().written, 0);
    }

    #[test]
    fn test_fanout_mirrors_before_primary() {
        let set = ChannelSet::new(3);
        let mut frame = set.acquire_writable();
        frame
            .fill_flipped(&[5u8; 48], 4, 4, PixelFormat::Rgb24)
            .unwrap();
        frame.meta.pts = 4;

        set.duplicate_to_secondary_channels(&frame).unwrap();
        assert!(!set.primary().has_pending());
        for index in 1..3 {
            let mirror = set.channel(index).unwrap().try_take().unwrap();
            assert_eq!(mirror.meta, frame.meta);
            assert_eq!(mirror.pixels(), frame.pixels());
        }

        set.publish(frame);
        assert_eq!(set.primary().try_take().unwrap().meta.pts, 4);
        assert_eq!(set.stats().iter().map(|s| s.written).sum::<usize>(), 3);
    }
}
