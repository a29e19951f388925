//! Multi-producer, single-consumer frameset queue.
//!
//! Producers live in other processes and write one JSON line per frameset to
//! their stdout. The viewer runs one reader thread per producer pipe; each
//! decodes lines and forwards framesets into a single unbounded `flume`
//! channel, which the viewer pops from. Order is preserved per producer only.

use std::io::{BufRead, BufReader, Read, Write};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, warn};

use crate::error::QueueError;
use crate::pipeline::Frameset;

/// A push the queue refused. The frameset is handed back because the
/// producer still owns its regions.
#[derive(Debug)]
pub struct Rejected {
    pub frameset: Frameset,
    pub error: QueueError,
}

/// Producer end of the queue.
pub trait FramesetSink {
    fn push(&mut self, frameset: Frameset) -> Result<(), Rejected>;
}

impl<T: FramesetSink + ?Sized> FramesetSink for &mut T {
    fn push(&mut self, frameset: Frameset) -> Result<(), Rejected> {
        (**self).push(frameset)
    }
}

impl FramesetSink for Sender<Frameset> {
    fn push(&mut self, frameset: Frameset) -> Result<(), Rejected> {
        self.send(frameset).map_err(|flume::SendError(frameset)| Rejected {
            frameset,
            error: QueueError::Disconnected,
        })
    }
}

/// Writes framesets as newline-delimited JSON, one `write` per frameset.
///
/// Lines are a few hundred bytes, far below `PIPE_BUF`, so a producer killed
/// mid-stream never leaves a torn line interleaved with a later one.
pub struct PipeSink<W: Write> {
    writer: W,
    line: Vec<u8>,
}

impl<W: Write> PipeSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            line: Vec::with_capacity(512),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_line(&mut self, frameset: &Frameset) -> Result<(), QueueError> {
        self.line.clear();
        serde_json::to_writer(&mut self.line, frameset)?;
        self.line.push(b'\n');
        self.writer.write_all(&self.line)?;
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write> FramesetSink for PipeSink<W> {
    fn push(&mut self, frameset: Frameset) -> Result<(), Rejected> {
        match self.write_line(&frameset) {
            Ok(()) => Ok(()),
            Err(error) => Err(Rejected { frameset, error }),
        }
    }
}

/// Consumer end of the queue, plus the reader threads feeding it.
pub struct FramesetQueue {
    tx: Sender<Frameset>,
    rx: Receiver<Frameset>,
    readers: Vec<JoinHandle<usize>>,
}

impl Default for FramesetQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl FramesetQueue {
    /// Unbounded: producers are never blocked or told to drop frames.
    pub fn new() -> Self {
        let (tx, rx) = flume::unbounded();
        Self {
            tx,
            rx,
            readers: Vec::new(),
        }
    }

    /// In-process producer handle.
    pub fn sender(&self) -> Sender<Frameset> {
        self.tx.clone()
    }

    /// Forward framesets read from a producer's pipe until it closes.
    pub fn attach<R>(&mut self, label: &str, reader: R) -> Result<(), QueueError>
    where
        R: Read + Send + 'static,
    {
        let tx = self.tx.clone();
        let label = label.to_owned();
        let handle = thread::Builder::new()
            .name(format!("queue-{label}"))
            .spawn(move || forward_lines(&label, reader, &tx))?;
        self.readers.push(handle);
        Ok(())
    }

    /// Wait up to `timeout` for the next frameset.
    pub fn pop(&self, timeout: Duration) -> Result<Option<Frameset>, QueueError> {
        match self.rx.recv_timeout(timeout) {
            Ok(frameset) => Ok(Some(frameset)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(QueueError::Disconnected),
        }
    }

    /// Framesets currently waiting.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Wait for every attached pipe to close, then take everything still queued.
    ///
    /// Only call once the producers are gone, otherwise this blocks for as
    /// long as they keep writing.
    pub fn drain(&mut self) -> Vec<Frameset> {
        for handle in self.readers.drain(..) {
            if handle.join().is_err() {
                error!("queue reader thread panicked");
            }
        }
        self.rx.try_iter().collect()
    }
}

fn forward_lines<R: Read>(label: &str, reader: R, tx: &Sender<Frameset>) -> usize {
    let mut forwarded = 0;
    for line in BufReader::new(reader).lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!(producer = label, "pipe read failed: {}", err);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Frameset>(&line) {
            Ok(frameset) => {
                if let Err(flume::SendError(frameset)) = tx.send(frameset) {
                    // Viewer is gone; nobody else will release this one.
                    let _ = frameset.release_all();
                    break;
                }
                forwarded += 1;
            }
            Err(err) => error!(producer = label, "dropping malformed frameset: {}", err),
        }
    }
    debug!(producer = label, forwarded, "producer pipe closed");
    forwarded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{RotationAngle, SourceConfiguration};
    use crate::shm::DepthImage;
    use image::RgbImage;

    fn frameset(alias: &str) -> Frameset {
        let source = SourceConfiguration::new(alias, "serial", (2, 2), 5, RotationAngle::Deg0);
        Frameset::publish(&RgbImage::new(2, 2), &DepthImage::new(2, 2), &source).unwrap()
    }

    #[test]
    fn pipe_lines_reach_the_queue_in_order() {
        let mut sink = PipeSink::new(Vec::new());
        let mut names = Vec::new();
        for _ in 0..3 {
            let fs = frameset("A");
            names.push(fs.color().name().to_owned());
            sink.push(fs).unwrap();
        }
        let mut bytes = sink.into_inner();
        bytes.extend_from_slice(b"not json\n\n");

        let mut queue = FramesetQueue::new();
        queue.attach("A", std::io::Cursor::new(bytes)).unwrap();

        let drained = queue.drain();
        let got: Vec<String> = drained.iter().map(|fs| fs.color().name().to_owned()).collect();
        assert_eq!(got, names);
        for fs in drained {
            fs.release_all().unwrap();
        }
    }

    #[test]
    fn pop_times_out_on_empty_queue() {
        let queue = FramesetQueue::new();
        assert!(queue.pop(Duration::from_millis(5)).unwrap().is_none());
    }

    #[test]
    fn closed_pipe_hands_frameset_back() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::ErrorKind::BrokenPipe.into())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut sink = PipeSink::new(Broken);
        let rejected = sink.push(frameset("B")).unwrap_err();
        assert!(matches!(rejected.error, QueueError::Io(_)));
        rejected.frameset.release_all().unwrap();
    }
}
