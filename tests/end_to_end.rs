//! Runs real producer processes from the built binary.

use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::time::{Duration, Instant};

use multicam::display::{HeadlessRenderer, Overlay, Renderer, Viewer};
use multicam::pipeline::{Frameset, ProducerGroup};
use multicam::shm::region_exists;
use tempfile::NamedTempFile;

const ALIASES: [&str; 3] = ["A", "B", "C"];

fn config_file(frame_limit: Option<u64>) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "[capture]\nbackend = \"synthetic\"").unwrap();
    if let Some(limit) = frame_limit {
        writeln!(file, "frame_limit = {limit}").unwrap();
    }
    for (i, alias) in ALIASES.iter().enumerate() {
        writeln!(
            file,
            "\n[[sources]]\nalias = \"{alias}\"\nserial = \"00000{i}\"\nwidth = 32\nheight = 24\nfps = 30"
        )
        .unwrap();
    }
    file
}

fn exe() -> &'static Path {
    Path::new(env!("CARGO_BIN_EXE_multicam"))
}

/// Block until at least `n` framesets sit unread in the queue.
fn wait_for_backlog(group: &ProducerGroup, n: usize) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while group.queue().len() < n {
        assert!(Instant::now() < deadline, "no backlog built up");
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn names(fs: &Frameset) -> Vec<String> {
    fs.region_names().iter().map(|n| n.to_string()).collect()
}

#[test]
fn bounded_producers_fill_the_grid_and_leave_nothing_behind() {
    let config = config_file(Some(5));
    let group = ProducerGroup::spawn(exe(), Some(config.path()), ALIASES).unwrap();
    assert_eq!(group.len(), 3);

    let mut viewer = Viewer::new(Overlay::without_text(), Duration::from_secs(2));
    let mut renderer = HeadlessRenderer::new(None, None);
    let mut seen = Vec::new();
    while viewer.processed() < 15 {
        let fs = group
            .queue()
            .pop(Duration::from_secs(10))
            .unwrap()
            .expect("producers stalled");
        seen.extend(names(&fs));
        let now = Instant::now();
        viewer.process(fs, now).unwrap();
        renderer.show(&viewer.compose(now).unwrap()).unwrap();
    }

    let report = group.shutdown();
    assert_eq!(report.leftover, 0);
    assert_eq!(renderer.shown(), 15);
    assert_eq!(viewer.cache().keys().map(String::as_str).collect::<Vec<_>>(), ALIASES);
    assert_eq!(viewer.entry("B").unwrap().source().serial_number(), "000001");
    assert_eq!(seen.len(), 30);
    assert!(seen.iter().all(|n| !region_exists(n)));
}

#[test]
fn shutdown_stops_running_producers_and_releases_backlog() {
    let config = config_file(None);
    let group = ProducerGroup::spawn(exe(), Some(config.path()), ALIASES).unwrap();

    let mut viewer = Viewer::new(Overlay::without_text(), Duration::from_secs(2));
    for _ in 0..6 {
        let fs = group.queue().pop(Duration::from_secs(10)).unwrap().expect("producers stalled");
        viewer.process(fs, Instant::now()).unwrap();
    }
    wait_for_backlog(&group, 1);

    let report = group.shutdown();
    assert!(report.leftover > 0);
    assert_eq!(report.released, report.leftover);
    assert_eq!(report.failed, 0);
}

#[test]
fn panicking_viewer_still_releases_queued_framesets() {
    let config = config_file(None);
    let mut queued = Vec::new();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let group = ProducerGroup::spawn(exe(), Some(config.path()), ALIASES).unwrap();
        // Pop a few and put them back unreleased, so their names are known.
        let tx = group.queue().sender();
        for _ in 0..4 {
            let fs = group.queue().pop(Duration::from_secs(10)).unwrap().expect("producers stalled");
            queued.extend(names(&fs));
            tx.send(fs).unwrap();
        }
        wait_for_backlog(&group, 6);
        panic!("display loop blew up");
    }));

    assert!(outcome.is_err());
    assert_eq!(queued.len(), 8);
    assert!(queued.iter().all(|n| !region_exists(n)));
}
