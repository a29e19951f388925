//! Renderer for running without a window

use std::path::PathBuf;
use std::time::{Duration, Instant};

use color_eyre::Result;
use image::RgbImage;
use tracing::{debug, info};

use super::Renderer;

const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(1);

/// Counts composites, optionally writes the latest one to a PNG, and can
/// request quit after a fixed number of composites.
pub struct HeadlessRenderer {
    shown: u64,
    max_frames: Option<u64>,
    snapshot: Option<PathBuf>,
    last_snapshot: Option<Instant>,
}

impl HeadlessRenderer {
    pub fn new(max_frames: Option<u64>, snapshot: Option<PathBuf>) -> Self {
        Self {
            shown: 0,
            max_frames,
            snapshot,
            last_snapshot: None,
        }
    }

    pub fn shown(&self) -> u64 {
        self.shown
    }

    fn write_snapshot(&mut self, composite: &RgbImage) -> Result<()> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let due = self
            .last_snapshot
            .map_or(true, |at| at.elapsed() >= SNAPSHOT_INTERVAL);
        if due {
            composite.save(path)?;
            self.last_snapshot = Some(Instant::now());
        }
        Ok(())
    }
}

impl Renderer for HeadlessRenderer {
    fn show(&mut self, composite: &RgbImage) -> Result<bool> {
        self.shown += 1;
        debug!(
            "composite #{} ({}x{})",
            self.shown,
            composite.width(),
            composite.height()
        );
        self.write_snapshot(composite)?;

        let done = self.max_frames.is_some_and(|max| self.shown >= max);
        if done {
            info!("headless renderer reached {} composites", self.shown);
        }
        Ok(done)
    }
}
