//! Producer loop: capture, publish, enqueue, repeat.
//!
//! Fail-stop: the first error of any kind ends the loop and closes the
//! capture session. There is no reconnect; the viewer shows the source as
//! stale once its frames stop.

use std::time::Duration;

use tracing::{error, info};

use crate::capture::CaptureSource;
use crate::error::{CaptureError, MulticamError};
use crate::pipeline::{Frameset, FramesetSink, Rejected, SourceConfiguration};

/// Default bounded wait for a frame pair.
pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_secs(5);

/// Why and when a producer stopped.
#[derive(Debug)]
pub struct ProducerReport {
    pub alias: String,
    pub published: u64,
    pub reason: MulticamError,
}

impl ProducerReport {
    /// A bounded source running out is a normal stop.
    pub fn is_clean(&self) -> bool {
        matches!(
            self.reason,
            MulticamError::Capture(CaptureError::EndOfStream(_))
        )
    }
}

pub struct Producer<C, S> {
    config: SourceConfiguration,
    capture: C,
    sink: S,
    frame_timeout: Duration,
}

impl<C: CaptureSource, S: FramesetSink> Producer<C, S> {
    pub fn new(config: SourceConfiguration, capture: C, sink: S, frame_timeout: Duration) -> Self {
        Self {
            config,
            capture,
            sink,
            frame_timeout,
        }
    }

    /// Run until the first error. Never returns early with `Err`: errors stop
    /// only this producer and are reported in the returned [`ProducerReport`].
    pub fn run(mut self) -> ProducerReport {
        let alias = self.config.alias().to_owned();

        if let Err(err) = self.capture.open(&mut self.config) {
            error!("Camera {} ({}) failed to open: {}", alias, self.config.serial_number(), err);
            self.capture.close();
            return ProducerReport {
                alias,
                published: 0,
                reason: err.into(),
            };
        }
        info!(
            "Camera {} pipeline started (connection {}, firmware {})",
            self.config.serial_number(),
            self.config.connection_class().unwrap_or("unknown"),
            self.config.firmware_version().unwrap_or("unknown"),
        );

        let mut published = 0;
        let reason = loop {
            match self.step() {
                Ok(()) => published += 1,
                Err(err) => break err,
            }
        };

        let report = ProducerReport {
            alias,
            published,
            reason,
        };
        if report.is_clean() {
            info!("{}", report.reason);
        } else {
            error!("{}", report.reason);
        }
        self.capture.close();
        report
    }

    fn step(&mut self) -> Result<(), MulticamError> {
        let pair = self.capture.wait_for_frame_pair(self.frame_timeout)?;
        let frameset = Frameset::publish(&pair.color, &pair.depth, &self.config)?;

        if let Err(Rejected { frameset, error }) = self.sink.push(frameset) {
            // Never handed over, so the regions are still ours to unlink.
            if let Err(err) = frameset.release_all() {
                error!("failed to release rejected frameset: {}", err);
            }
            return Err(error.into());
        }

        metrics::counter!("multicam_framesets_published").increment(1);
        Ok(())
    }
}
