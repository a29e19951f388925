//! Process entry points: the viewer (parent) and one producer per source (children).

use std::path::Path;

use color_eyre::{eyre::eyre, Result};
use tracing::{info, info_span, warn};

use crate::capture::{CaptureSource, SyntheticSource, V4l2Source};
use crate::display::{HeadlessRenderer, Overlay, Renderer, Viewer, ViewerExit};
use crate::pipeline::{PipeSink, Producer, ProducerGroup};
use crate::{shm, utils, CaptureBackend, Config, ViewerSettings};

/// Spawn a producer per configured source, display until quit or interrupt,
/// then stop the producers and release everything still queued.
pub fn run_viewer(config: &Config, config_path: Option<&Path>) -> Result<ViewerExit> {
    config.validate()?;
    if config.sources.is_empty() {
        return Err(eyre!("no sources configured"));
    }
    utils::install_interrupt_handler()?;

    let exe = std::env::current_exe()?;
    let group = ProducerGroup::spawn(
        &exe,
        config_path,
        config.sources.iter().map(|s| s.alias.as_str()),
    )?;
    info!("Started {} camera processes", group.len());

    let overlay = Overlay::load(config.viewer.font_path.as_deref());
    let mut viewer = Viewer::new(overlay, config.viewer.stale_after());

    // Shutdown runs whatever the display loop returned.
    let outcome = open_renderer(&config.viewer)
        .and_then(|mut renderer| viewer.run(group.queue(), renderer.as_mut(), utils::interrupted));

    let report = group.shutdown();
    // Producers untrack their regions, so this only catches regions published
    // inside the viewer process itself.
    let swept = shm::tracker::sweep();
    if swept > 0 {
        warn!("{} shared-memory region(s) were still registered at exit", swept);
    }
    info!(
        "Viewer stopped after {} framesets ({} drained at shutdown, {} failed to release)",
        viewer.processed(),
        report.released,
        report.failed
    );
    outcome
}

fn open_renderer(settings: &ViewerSettings) -> Result<Box<dyn Renderer>> {
    if settings.headless {
        return Ok(Box::new(HeadlessRenderer::new(
            settings.headless_max_frames,
            settings.snapshot_path.clone(),
        )));
    }

    #[cfg(feature = "sdl-display")]
    {
        let display =
            crate::display::Sdl2Display::new(&settings.title, settings.width, settings.height)?;
        Ok(Box::new(display))
    }

    #[cfg(not(feature = "sdl-display"))]
    {
        warn!("built without the sdl-display feature, running headless");
        Ok(Box::new(HeadlessRenderer::new(
            settings.headless_max_frames,
            settings.snapshot_path.clone(),
        )))
    }
}

/// Body of a `produce --alias` child: capture and publish into stdout until
/// the first error or SIGTERM.
pub fn run_producer(config: &Config, alias: &str) -> Result<()> {
    // The viewer releases every region this process publishes.
    shm::untrack_shared_memory();
    utils::ignore_interrupt()?;

    let settings = config
        .source(alias)
        .ok_or_else(|| eyre!("no source with alias {}", alias))?;
    let source = settings.to_source_configuration()?;

    let _span = info_span!("producer", alias).entered();

    let capture: Box<dyn CaptureSource> = match config.capture.backend {
        CaptureBackend::V4l2 => Box::new(V4l2Source::new(settings, config.capture.buffer_count)),
        CaptureBackend::Synthetic => Box::new(SyntheticSource::new(config.capture.frame_limit)),
    };
    let sink = PipeSink::new(std::io::stdout().lock());

    let report = Producer::new(source, capture, sink, config.capture.frame_timeout()).run();
    if report.is_clean() {
        info!("Camera {} finished after {} framesets", report.alias, report.published);
        Ok(())
    } else {
        Err(eyre!(
            "camera {} stopped after {} framesets: {}",
            report.alias,
            report.published,
            report.reason
        ))
    }
}

/// Print every V4L2 capture node, one per line.
pub fn list_devices() {
    let devices = utils::list_capture_devices();
    if devices.is_empty() {
        println!("No capture devices found");
    }
    for dev in devices {
        println!(
            "{}\t{}\t{}\tdriver {}\t[{}]",
            dev.path,
            dev.card,
            dev.bus,
            dev.driver_version,
            dev.formats.join(", ")
        );
    }
}
