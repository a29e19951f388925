pub mod decoder;
pub mod frame;
pub mod synthetic;
pub mod v4l2;

use std::time::Duration;

pub use frame::{FramePair, PixelFormat, RawFrame};
pub use synthetic::SyntheticSource;
pub use v4l2::V4l2Source;

use crate::error::CaptureError;
use crate::pipeline::SourceConfiguration;

/// A color + depth capture device, driven by one producer.
pub trait CaptureSource {
    /// Start streaming with the configuration's serial, dimensions and rate.
    /// Fills in the configuration's descriptive fields.
    fn open(&mut self, config: &mut SourceConfiguration) -> Result<(), CaptureError>;

    /// Block until the next color and depth frame arrive, or fail with
    /// [`CaptureError::Timeout`] after `timeout`.
    fn wait_for_frame_pair(&mut self, timeout: Duration) -> Result<FramePair, CaptureError>;

    /// Stop streaming. Safe to call on a source that never opened.
    fn close(&mut self);
}

impl<T: CaptureSource + ?Sized> CaptureSource for Box<T> {
    fn open(&mut self, config: &mut SourceConfiguration) -> Result<(), CaptureError> {
        (**self).open(config)
    }

    fn wait_for_frame_pair(&mut self, timeout: Duration) -> Result<FramePair, CaptureError> {
        (**self).wait_for_frame_pair(timeout)
    }

    fn close(&mut self) {
        (**self).close()
    }
}
