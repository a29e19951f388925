//! Producer process group and the shutdown drain.
//!
//! A [`ProducerGroup`] owns every producer child and the queue they feed.
//! Shutting it down terminates the children, waits for them, and releases
//! every frameset still queued without resolving it. The same sequence runs
//! from `Drop`, so an error or panic in the display loop still reclaims the
//! regions.
//!
//! A region a producer allocated but had not yet written to its pipe when it
//! was killed is not discoverable here and leaks until reboot or manual
//! removal from `/dev/shm`.

use std::path::Path;
use std::process::{Child, Command, Stdio};

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use crate::error::{MulticamError, QueueError};
use crate::pipeline::FramesetQueue;

/// Outcome of draining the queue at shutdown.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Framesets found in the queue.
    pub leftover: usize,
    /// Framesets whose regions were unlinked.
    pub released: usize,
    /// Framesets with at least one region that could not be unlinked.
    pub failed: usize,
}

/// Release everything still queued, without resolving any pixel data.
///
/// Producers must already be stopped.
pub fn drain_queue(queue: &mut FramesetQueue) -> DrainReport {
    let leftovers = queue.drain();
    let mut report = DrainReport {
        leftover: leftovers.len(),
        ..DrainReport::default()
    };

    if report.leftover > 0 {
        warn!("{}", MulticamError::QueueDrainResidual(report.leftover));
    }

    for frameset in leftovers {
        let alias = frameset.alias().to_owned();
        match frameset.release_all() {
            Ok(()) => report.released += 1,
            Err(err) => {
                report.failed += 1;
                warn!("failed to release leftover frameset from {}: {}", alias, err);
            }
        }
    }

    metrics::counter!("multicam_framesets_drained").increment(report.leftover as u64);
    if report.leftover > 0 {
        info!("All shared memories are released ({} framesets)", report.released);
    }
    report
}

struct ProducerProcess {
    alias: String,
    child: Child,
}

impl ProducerProcess {
    /// SIGTERM, then reap. Producers ignore SIGINT, so this is the only way they stop early.
    fn terminate(&mut self) {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                debug!("producer {} already exited: {}", self.alias, status);
                return;
            }
            Ok(None) => {}
            Err(err) => warn!("cannot poll producer {}: {}", self.alias, err),
        }

        match i32::try_from(self.child.id()) {
            Ok(pid) => match kill(Pid::from_raw(pid), Signal::SIGTERM) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(err) => {
                    warn!("SIGTERM to producer {} failed ({}), killing", self.alias, err);
                    let _ = self.child.kill();
                }
            },
            Err(_) => {
                let _ = self.child.kill();
            }
        }

        match self.child.wait() {
            Ok(status) => debug!("producer {} exited: {}", self.alias, status),
            Err(err) => warn!("failed to reap producer {}: {}", self.alias, err),
        }
    }
}

/// Producer child processes plus the queue their pipes feed.
pub struct ProducerGroup {
    producers: Vec<ProducerProcess>,
    queue: FramesetQueue,
    finished: bool,
}

impl ProducerGroup {
    /// Re-execute `exe` once per alias as `produce --alias <alias>`.
    ///
    /// If any spawn fails, the children already started are torn down by `Drop`.
    pub fn spawn<I, S>(exe: &Path, config_path: Option<&Path>, aliases: I) -> Result<Self, MulticamError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut group = Self {
            producers: Vec::new(),
            queue: FramesetQueue::new(),
            finished: false,
        };

        for alias in aliases {
            let alias = alias.as_ref();
            let mut command = Command::new(exe);
            if let Some(path) = config_path {
                command.arg("--config").arg(path);
            }
            command
                .arg("produce")
                .arg("--alias")
                .arg(alias)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::inherit());

            let mut child = command.spawn().map_err(QueueError::from)?;
            let stdout = child.stdout.take();
            group.producers.push(ProducerProcess {
                alias: alias.to_owned(),
                child,
            });

            let stdout = stdout.ok_or(QueueError::Disconnected)?;
            group.queue.attach(alias, stdout)?;
            debug!("spawned producer {}", alias);
        }

        Ok(group)
    }

    pub fn queue(&self) -> &FramesetQueue {
        &self.queue
    }

    pub fn len(&self) -> usize {
        self.producers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }

    /// Terminate every producer, then drain the queue.
    pub fn shutdown(mut self) -> DrainReport {
        self.finish()
    }

    fn finish(&mut self) -> DrainReport {
        if self.finished {
            return DrainReport::default();
        }
        self.finished = true;

        for producer in &mut self.producers {
            producer.terminate();
        }
        info!("All camera processes terminated!");

        drain_queue(&mut self.queue)
    }
}

impl Drop for ProducerGroup {
    fn drop(&mut self) {
        if !self.finished {
            warn!("producer group dropped without shutdown, cleaning up");
            self.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Frameset, FramesetSink, RotationAngle, SourceConfiguration};
    use crate::shm::{region_exists, DepthImage};
    use image::RgbImage;

    #[test]
    fn drain_releases_every_leftover() {
        let mut queue = FramesetQueue::new();
        let mut tx = queue.sender();
        let source = SourceConfiguration::new("A", "1", (3, 2), 5, RotationAngle::Deg0);

        let mut names = Vec::new();
        for _ in 0..5 {
            let fs = Frameset::publish(&RgbImage::new(3, 2), &DepthImage::new(3, 2), &source).unwrap();
            names.extend(fs.region_names().iter().map(|n| n.to_string()));
            tx.push(fs).unwrap();
        }

        let report = drain_queue(&mut queue);
        assert_eq!(
            report,
            DrainReport {
                leftover: 5,
                released: 5,
                failed: 0
            }
        );
        assert!(names.iter().all(|n| !region_exists(n)));
        assert!(queue.is_empty());
    }

    #[test]
    fn empty_queue_drains_to_zero() {
        let mut queue = FramesetQueue::new();
        assert_eq!(drain_queue(&mut queue), DrainReport::default());
    }
}
