//! Error types for the capture session

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PacerError>;

/// Errors surfaced to the host of a capture session.
///
/// Expected skips (small viewport, pipeline not prepared, rate-control
/// decline, idle conditions unmet) are not errors; see
/// [`crate::pacing::CaptureOutcome`].
#[derive(Debug, Error)]
pub enum PacerError {
    /// A frame buffer could not be allocated. Fatal to the session.
    #[error("failed to allocate {bytes} bytes for frame buffer")]
    Allocation { bytes: usize },

    /// The session hit a fatal error earlier and is disabled until reset.
    #[error("capture session disabled after a fatal error; reset required")]
    SessionFailed,

    /// The pixel source could not deliver pixels.
    #[error("pixel source error: {0}")]
    Source(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error("failed to spawn pacer thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),
}

impl PacerError {
    /// Whether this error disables the capture session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Allocation { .. } | Self::SessionFailed)
    }
}
