//! Error types shared across the frame-exchange pipeline.

use thiserror::Error;

use crate::shm::ElementType;

/// Errors raised by the shared-memory transfer primitive.
#[derive(Debug, Error)]
pub enum ShmError {
    /// The named region does not exist (already unlinked, or never created).
    #[error("shared-memory region not found: {name}")]
    RegionNotFound { name: String },

    /// A region with this name is already live.
    #[error("shared-memory region already exists: {name}")]
    RegionExists { name: String },

    /// The shape is empty, has a zero dimension, or overflows `usize`.
    #[error("invalid shape {shape:?}")]
    InvalidShape { shape: Vec<usize> },

    /// Payload length disagrees with the descriptor.
    #[error("size mismatch for {name}: expected {expected} bytes, found {actual}")]
    SizeMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// A resolved array was interpreted with the wrong element type or layout.
    #[error("expected {expected:?} array with shape {layout}, got {actual:?} {shape:?}")]
    ElementMismatch {
        expected: ElementType,
        layout: &'static str,
        actual: ElementType,
        shape: Vec<usize>,
    },

    #[error("shared-memory syscall failed: {0}")]
    Os(#[from] nix::errno::Errno),

    #[error("shared-memory I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl ShmError {
    /// True for the "region no longer exists" protocol violation.
    pub fn is_region_not_found(&self) -> bool {
        matches!(self, ShmError::RegionNotFound { .. })
    }
}

/// Errors raised by a capture source. All of them stop the owning producer.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// No frame pair arrived within the bounded wait.
    #[error("timed out after {0:?} waiting for a frame pair")]
    Timeout(std::time::Duration),

    /// Device could not be opened, configured or read.
    #[error("capture device error: {0}")]
    Device(String),

    /// The device delivered data we cannot interpret.
    #[error("frame format error: {0}")]
    Format(String),

    /// The source has no more frames to give (bounded sources only).
    #[error("capture source exhausted after {0} frame pairs")]
    EndOfStream(u64),

    #[error("capture session not started")]
    NotStarted,
}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::TimedOut {
            Self::Timeout(std::time::Duration::ZERO)
        } else {
            Self::Device(err.to_string())
        }
    }
}

/// Errors raised by the frameset queue transport.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The other end of the queue is gone.
    #[error("frameset queue disconnected")]
    Disconnected,

    #[error("frameset encoding failed: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("frameset transport I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum MulticamError {
    #[error(transparent)]
    Shm(#[from] ShmError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    /// Informational: framesets were still queued at shutdown. Logged, never returned as fatal.
    #[error("{0} frameset(s) left in the queue at shutdown")]
    QueueDrainResidual(usize),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("signal setup failed: {0}")]
    Signal(nix::errno::Errno),
}

pub type Result<T, E = MulticamError> = std::result::Result<T, E>;
