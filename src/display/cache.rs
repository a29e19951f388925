//! Per-source frame cache and FPS tracking.

use std::time::{Instant, SystemTime};

use image::RgbImage;

use crate::pipeline::SourceConfiguration;

/// Frame-rate estimate refreshed at most once per one-second window.
#[derive(Debug, Clone)]
pub struct FpsStats {
    count: u32,
    window_start: Instant,
    fps: f32,
    last_frame: Instant,
}

impl FpsStats {
    pub fn new(now: Instant) -> Self {
        Self {
            count: 0,
            window_start: now,
            fps: 0.0,
            last_frame: now,
        }
    }

    /// Count one frame arriving at `now` and return the current estimate.
    pub fn record(&mut self, now: Instant) -> f32 {
        self.count += 1;
        self.last_frame = now;

        let elapsed = now.saturating_duration_since(self.window_start).as_secs_f32();
        if elapsed >= 1.0 {
            self.fps = self.count as f32 / elapsed;
            self.count = 0;
            self.window_start = now;
        }
        self.fps
    }

    /// Last computed rate; 0 until the first window closes.
    pub fn fps(&self) -> f32 {
        self.fps
    }

    pub fn last_frame(&self) -> Instant {
        self.last_frame
    }
}

/// Latest frame from one source.
#[derive(Debug, Clone)]
pub struct FrameCacheEntry {
    /// Rotated, undecorated color frame, kept for re-decorating when stale.
    pub(crate) raw: RgbImage,
    /// Bordered and labelled frame as last shown.
    pub(crate) image: RgbImage,
    pub(crate) stats: FpsStats,
    pub(crate) source: SourceConfiguration,
    pub(crate) captured_at: SystemTime,
}

impl FrameCacheEntry {
    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn stats(&self) -> &FpsStats {
        &self.stats
    }

    pub fn source(&self) -> &SourceConfiguration {
        &self.source
    }

    /// Capture time reported by the producer.
    pub fn captured_at(&self) -> SystemTime {
        self.captured_at
    }
}
