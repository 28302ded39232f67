pub mod frame;
pub mod rate_control;
pub mod source;
pub mod synthetic;

pub use frame::{Frame, FrameMetadata, PixelFormat};
pub use rate_control::{IntervalRateControl, RateControl};
pub use source::{PixelSource, Viewport};
pub use synthetic::SyntheticSource;
