pub mod exchange;
pub mod fanout;

pub use exchange::{ChannelFanout, ExchangeSlot, FramePipeline, FrameSlot, SlotStats};
pub use fanout::ChannelSet;
