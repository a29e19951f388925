use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use v4l::{capability::Flags, video::Capture, Device};

use crate::error::MulticamError;

// Detected capture device info
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoundDevice {
    pub path: String,
    pub card: String,
    /// Bus info, e.g. `usb-0000:00:14.0-3`; the prefix tells the connection class
    pub bus: String,
    pub driver_version: String,
    /// FourCC codes offered by the node
    pub formats: Vec<String>,
}

/// Enumerate V4L2 nodes that can capture video
pub fn list_capture_devices() -> Vec<FoundDevice> {
    info!("Scanning for capture devices...");

    let mut found = Vec::new();
    for i in 0..64 {
        let path = format!("/dev/video{}", i);
        if !Path::new(&path).exists() {
            continue;
        }

        let Ok(dev) = Device::with_path(&path) else {
            debug!("{} could not be opened", path);
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            continue;
        }

        let formats = dev
            .enum_formats()
            .map(|formats| formats.iter().map(|f| f.fourcc.to_string()).collect())
            .unwrap_or_default();
        let (major, minor, patch) = caps.version;
        found.push(FoundDevice {
            path,
            card: caps.card,
            bus: caps.bus,
            driver_version: format!("{}.{}.{}", major, minor, patch),
            formats,
        });
    }

    info!("Found {} capture device(s)", found.len());
    found
}

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_interrupt(_: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Route SIGINT and SIGTERM to a flag polled by [`interrupted`].
pub fn install_interrupt_handler() -> Result<(), MulticamError> {
    let action = SigAction::new(
        SigHandler::Handler(on_interrupt),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    for sig in [Signal::SIGINT, Signal::SIGTERM] {
        // SAFETY: the handler only stores to an atomic.
        unsafe { signal::sigaction(sig, &action) }.map_err(MulticamError::Signal)?;
    }
    Ok(())
}

pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Producers share the terminal's process group, so Ctrl-C reaches them too.
/// They ignore it and wait for the viewer's SIGTERM instead.
pub fn ignore_interrupt() -> Result<(), MulticamError> {
    // SAFETY: SIG_IGN installs no handler code.
    unsafe { signal::signal(Signal::SIGINT, SigHandler::SigIgn) }
        .map_err(MulticamError::Signal)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_without_devices_is_not_an_error() {
        // Whatever the host has, every entry must be a capture node path.
        for dev in list_capture_devices() {
            assert!(dev.path.starts_with("/dev/video"));
        }
    }
}
