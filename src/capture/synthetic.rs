//! Test-pattern source for running without camera hardware

use std::thread;
use std::time::{Duration, Instant};

use image::{Luma, Rgb, RgbImage};
use tracing::info;

use crate::capture::frame::FramePair;
use crate::capture::CaptureSource;
use crate::error::CaptureError;
use crate::pipeline::SourceConfiguration;
use crate::shm::DepthImage;

const PALETTE: [[u8; 3]; 6] = [
    [200, 60, 60],
    [60, 170, 60],
    [60, 90, 200],
    [200, 170, 40],
    [150, 60, 180],
    [40, 170, 170],
];

/// Paces frames at the configured rate. Each alias gets its own base color
/// and a bar sweeps across the frame so motion is visible.
pub struct SyntheticSource {
    frame_limit: Option<u64>,
    sequence: u64,
    dims: (u32, u32),
    base: [u8; 3],
    period: Duration,
    next_due: Option<Instant>,
    open: bool,
}

impl SyntheticSource {
    pub fn new(frame_limit: Option<u64>) -> Self {
        Self {
            frame_limit,
            sequence: 0,
            dims: (0, 0),
            base: PALETTE[0],
            period: Duration::ZERO,
            next_due: None,
            open: false,
        }
    }

    fn render(&self) -> (RgbImage, DepthImage) {
        let (w, h) = self.dims;
        let bar = (self.sequence * 4 % u64::from(w.max(1))) as u32;
        let color = RgbImage::from_fn(w, h, |x, y| {
            if x.abs_diff(bar) < 3 {
                Rgb([255, 255, 255])
            } else {
                let shade = (y * 64 / h.max(1)) as u8;
                Rgb(self.base.map(|c| c.saturating_add(shade)))
            }
        });
        let depth = DepthImage::from_fn(w, h, |x, y| {
            Luma([(500 + x * 4 + y * 2).min(u32::from(u16::MAX)) as u16])
        });
        (color, depth)
    }
}

impl CaptureSource for SyntheticSource {
    fn open(&mut self, config: &mut SourceConfiguration) -> Result<(), CaptureError> {
        let (w, h) = config.frame_dimensions();
        if w == 0 || h == 0 || config.fps() == 0 {
            return Err(CaptureError::Device(format!(
                "cannot synthesize {w}x{h} at {} fps",
                config.fps()
            )));
        }
        let index = config.alias().bytes().map(usize::from).sum::<usize>() % PALETTE.len();

        self.dims = (w, h);
        self.base = PALETTE[index];
        self.period = Duration::from_secs(1) / config.fps();
        self.next_due = None;
        self.open = true;
        config.describe("synthetic", env!("CARGO_PKG_VERSION"));

        info!(
            "Synthetic source {} ({}) started at {}x{} {} fps",
            config.alias(),
            config.serial_number(),
            w,
            h,
            config.fps()
        );
        Ok(())
    }

    fn wait_for_frame_pair(&mut self, timeout: Duration) -> Result<FramePair, CaptureError> {
        if !self.open {
            return Err(CaptureError::NotStarted);
        }
        if self.frame_limit.is_some_and(|limit| self.sequence >= limit) {
            return Err(CaptureError::EndOfStream(self.sequence));
        }

        let now = Instant::now();
        let due = self.next_due.unwrap_or(now);
        let wait = due.saturating_duration_since(now);
        if wait > timeout {
            thread::sleep(timeout);
            return Err(CaptureError::Timeout(timeout));
        }
        thread::sleep(wait);

        self.sequence += 1;
        let captured_at = Instant::now();
        // No catch-up bursts after a stall
        let next = due + self.period;
        self.next_due = Some(if next < captured_at { captured_at } else { next });

        let (color, depth) = self.render();
        Ok(FramePair {
            color,
            depth,
            sequence: self.sequence,
            captured_at,
        })
    }

    fn close(&mut self) {
        self.open = false;
    }
}
