//! Consumer loop: pop, cache, release, repaint.

use std::borrow::Cow;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::time::{Duration, Instant, SystemTime};

use color_eyre::Result;
use image::RgbImage;
use tracing::{debug, error, info, warn};

use super::cache::{FpsStats, FrameCacheEntry};
use super::grid::{compose_grid, GRID_CAPACITY};
use super::overlay::{rotate, Overlay};
use super::Renderer;
use crate::error::MulticamError;
use crate::pipeline::{Frameset, FramesetQueue};

/// How the display loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerExit {
    QuitRequested,
    Interrupted,
}

pub struct Viewer {
    /// Keyed by alias; iteration order is the grid order.
    cache: BTreeMap<String, FrameCacheEntry>,
    overlay: Overlay,
    stale_after: Duration,
    processed: u64,
    overflow_logged: bool,
}

impl Viewer {
    pub fn new(overlay: Overlay, stale_after: Duration) -> Self {
        Self {
            cache: BTreeMap::new(),
            overlay,
            stale_after,
            processed: 0,
            overflow_logged: false,
        }
    }

    pub fn cache(&self) -> &BTreeMap<String, FrameCacheEntry> {
        &self.cache
    }

    pub fn entry(&self, alias: &str) -> Option<&FrameCacheEntry> {
        self.cache.get(alias)
    }

    /// Framesets taken off the queue so far.
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Copy the color frame into the cache, then release the frameset.
    ///
    /// The frameset is released even when resolving fails; the resolve error
    /// is still returned, since a missing region means the protocol was broken
    /// upstream.
    pub fn process(&mut self, frameset: Frameset, now: Instant) -> Result<(), MulticamError> {
        self.processed += 1;
        let updated = self.update(&frameset, now);
        let alias = frameset.alias().to_owned();
        let released = frameset.release_all();

        updated?;
        released.map_err(|err| {
            error!("failed to release frameset from {}: {}", alias, err);
            MulticamError::from(err)
        })
    }

    fn update(&mut self, frameset: &Frameset, now: Instant) -> Result<(), MulticamError> {
        let raw = rotate(frameset.resolve_color()?, frameset.source().rotation());

        if let Ok(latency) = SystemTime::now().duration_since(frameset.timestamp()) {
            metrics::histogram!("multicam_frame_latency_ms").record(latency.as_secs_f64() * 1000.0);
        }

        let entry = match self.cache.entry(frameset.alias().to_owned()) {
            Entry::Occupied(slot) => slot.into_mut(),
            Entry::Vacant(slot) => {
                info!("first frame from {}", frameset.alias());
                slot.insert(FrameCacheEntry {
                    raw: RgbImage::new(0, 0),
                    image: RgbImage::new(0, 0),
                    stats: FpsStats::new(now),
                    source: frameset.source().clone(),
                    captured_at: frameset.timestamp(),
                })
            }
        };

        let fps = entry.stats.record(now);
        entry.image = self.overlay.decorate(&raw, frameset.alias(), fps, false);
        entry.raw = raw;
        entry.source = frameset.source().clone();
        entry.captured_at = frameset.timestamp();
        Ok(())
    }

    pub fn is_stale(&self, entry: &FrameCacheEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.stats.last_frame()) > self.stale_after
    }

    /// Current grid, with silent sources shown as `NO SIGNAL`. `None` until
    /// the first frame arrives.
    pub fn compose(&mut self, now: Instant) -> Option<RgbImage> {
        if self.cache.len() > GRID_CAPACITY && !self.overflow_logged {
            warn!(
                "{} sources but the grid holds {}; showing the first {} by alias",
                self.cache.len(),
                GRID_CAPACITY,
                GRID_CAPACITY
            );
            self.overflow_logged = true;
        }

        let cells: Vec<Cow<'_, RgbImage>> = self
            .cache
            .iter()
            .take(GRID_CAPACITY)
            .map(|(alias, entry)| {
                if self.is_stale(entry, now) {
                    Cow::Owned(self.overlay.decorate(&entry.raw, alias, 0.0, true))
                } else {
                    Cow::Borrowed(&entry.image)
                }
            })
            .collect();
        let refs: Vec<&RgbImage> = cells.iter().map(|c| c.as_ref()).collect();
        compose_grid(&refs)
    }

    /// Run until the renderer asks to quit, `interrupted` returns true, or an error occurs.
    ///
    /// The pop waits at most the stale threshold, so the grid is repainted and
    /// the interrupt flag checked even when every source is silent.
    pub fn run<R>(&mut self, queue: &FramesetQueue, renderer: &mut R, interrupted: impl Fn() -> bool) -> Result<ViewerExit>
    where
        R: Renderer + ?Sized,
    {
        info!("viewer started");
        loop {
            if interrupted() {
                info!("interrupted, leaving display loop");
                return Ok(ViewerExit::Interrupted);
            }

            let popped = queue.pop(self.stale_after)?;
            let now = Instant::now();
            if let Some(frameset) = popped {
                self.process(frameset, now)?;
            }

            let quit = match self.compose(now) {
                Some(grid) => renderer.show(&grid)?,
                None => renderer.idle()?,
            };
            if quit {
                debug!("renderer requested quit after {} framesets", self.processed);
                return Ok(ViewerExit::QuitRequested);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{RotationAngle, SourceConfiguration};
    use crate::display::HeadlessRenderer;
    use crate::shm::{region_exists, DepthImage};
    use color_eyre::eyre::eyre;
    use image::Rgb;

    fn frameset(alias: &str, rgb: [u8; 3], rotation: RotationAngle) -> Frameset {
        let source = SourceConfiguration::new(alias, "s", (20, 10), 5, rotation);
        let color = RgbImage::from_pixel(20, 10, Rgb(rgb));
        Frameset::publish(&color, &DepthImage::new(20, 10), &source).unwrap()
    }

    fn viewer() -> Viewer {
        Viewer::new(Overlay::without_text(), Duration::from_secs(2))
    }

    #[test]
    fn processing_caches_and_releases() {
        let mut viewer = viewer();
        let fs = frameset("A", [10, 20, 30], RotationAngle::Deg0);
        let names: Vec<String> = fs.region_names().iter().map(|n| n.to_string()).collect();

        viewer.process(fs, Instant::now()).unwrap();

        let entry = viewer.entry("A").unwrap();
        assert_eq!(entry.stats().fps(), 0.0);
        assert_eq!(entry.image().dimensions(), (24, 14));
        assert_eq!(entry.image().get_pixel(12, 7).0, [10, 20, 30]);
        assert!(names.iter().all(|n| !region_exists(n)));
    }

    #[test]
    fn rotation_is_applied() {
        let mut viewer = viewer();
        viewer
            .process(frameset("R", [1, 2, 3], RotationAngle::Deg90), Instant::now())
            .unwrap();
        assert_eq!(viewer.entry("R").unwrap().image().dimensions(), (14, 24));
    }

    #[test]
    fn silent_source_turns_stale() {
        let mut viewer = viewer();
        let t0 = Instant::now();
        viewer.process(frameset("A", [200, 0, 0], RotationAngle::Deg0), t0).unwrap();

        let live = viewer.compose(t0 + Duration::from_secs(1)).unwrap();
        assert_eq!(live.get_pixel(0, 0).0, [0, 255, 0]);

        let stale = viewer.compose(t0 + Duration::from_secs(3)).unwrap();
        assert_eq!(stale.get_pixel(0, 0).0, [255, 0, 0]);
        let px = stale.get_pixel(12, 7).0;
        assert!(px[0] == px[1] && px[1] == px[2]);
    }

    #[test]
    fn released_region_is_fatal_but_still_counted() {
        let mut viewer = viewer();
        let fs = frameset("A", [0, 0, 0], RotationAngle::Deg0);
        let color = fs.color().name().to_owned();
        crate::shm::region::unlink_name(&color).unwrap();

        let err = viewer.process(fs, Instant::now()).unwrap_err();
        assert!(matches!(err, MulticamError::Shm(ref e) if e.is_region_not_found()));
        assert!(viewer.cache().is_empty());
        assert_eq!(viewer.processed(), 1);
    }

    fn queue_with(framesets: Vec<Frameset>) -> FramesetQueue {
        let queue = FramesetQueue::new();
        let tx = queue.sender();
        for fs in framesets {
            tx.send(fs).unwrap();
        }
        queue
    }

    /// Keeps every composite; quits after `quit_after` of them or fails on the first.
    struct Recorder {
        shown: Vec<RgbImage>,
        quit_after: usize,
        fail: bool,
    }

    impl Renderer for Recorder {
        fn show(&mut self, composite: &RgbImage) -> Result<bool> {
            if self.fail {
                return Err(eyre!("display lost"));
            }
            self.shown.push(composite.clone());
            Ok(self.shown.len() >= self.quit_after)
        }
    }

    #[test]
    fn run_stops_when_renderer_quits() {
        let queue = queue_with(vec![
            frameset("A", [1, 1, 1], RotationAngle::Deg0),
            frameset("B", [2, 2, 2], RotationAngle::Deg0),
            frameset("A", [3, 3, 3], RotationAngle::Deg0),
        ]);
        let mut viewer = viewer();
        let mut renderer = HeadlessRenderer::new(Some(3), None);

        let exit = viewer.run(&queue, &mut renderer, || false).unwrap();
        assert_eq!(exit, ViewerExit::QuitRequested);
        assert_eq!(renderer.shown(), 3);
        assert_eq!(viewer.processed(), 3);
        assert_eq!(viewer.cache().len(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn run_honours_interrupt_before_popping() {
        let mut queue = queue_with(vec![frameset("A", [1, 1, 1], RotationAngle::Deg0)]);
        let mut viewer = viewer();
        let mut renderer = HeadlessRenderer::new(None, None);

        let exit = viewer.run(&queue, &mut renderer, || true).unwrap();
        assert_eq!(exit, ViewerExit::Interrupted);
        assert_eq!(viewer.processed(), 0);
        assert_eq!(renderer.shown(), 0);

        for fs in queue.drain() {
            fs.release_all().unwrap();
        }
    }

    #[test]
    fn run_fails_on_missing_region_and_still_releases_the_rest() {
        let fs = frameset("A", [0, 0, 0], RotationAngle::Deg0);
        let depth = fs.depth().name().to_owned();
        crate::shm::region::unlink_name(fs.color().name()).unwrap();
        let queue = queue_with(vec![fs]);
        let mut viewer = viewer();
        let mut renderer = HeadlessRenderer::new(None, None);

        assert!(viewer.run(&queue, &mut renderer, || false).is_err());
        assert!(!region_exists(&depth));
        assert_eq!(renderer.shown(), 0);
    }

    #[test]
    fn run_propagates_renderer_errors() {
        let queue = queue_with(vec![frameset("A", [5, 5, 5], RotationAngle::Deg0)]);
        let mut viewer = viewer();
        let mut renderer = Recorder {
            shown: Vec::new(),
            quit_after: 1,
            fail: true,
        };

        assert!(viewer.run(&queue, &mut renderer, || false).is_err());
        assert_eq!(viewer.processed(), 1);
    }

    #[test]
    fn silent_queue_still_repaints_stale_sources() {
        let mut viewer = Viewer::new(Overlay::without_text(), Duration::from_millis(30));
        viewer
            .process(frameset("A", [200, 0, 0], RotationAngle::Deg0), Instant::now())
            .unwrap();
        let queue = FramesetQueue::new();
        let mut renderer = Recorder {
            shown: Vec::new(),
            quit_after: 1,
            fail: false,
        };

        let exit = viewer.run(&queue, &mut renderer, || false).unwrap();
        assert_eq!(exit, ViewerExit::QuitRequested);
        assert_eq!(viewer.processed(), 1);
        assert_eq!(renderer.shown[0].get_pixel(0, 0).0, [255, 0, 0]);
    }
}
