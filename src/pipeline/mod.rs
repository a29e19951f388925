//! Producer-to-viewer handoff: framesets, the queue, producers and shutdown.

pub mod frameset;
pub mod producer;
pub mod queue;
pub mod shutdown;
pub mod source;

pub use frameset::Frameset;
pub use producer::{Producer, ProducerReport, DEFAULT_FRAME_TIMEOUT};
pub use queue::{FramesetQueue, FramesetSink, PipeSink, Rejected};
pub use shutdown::{drain_queue, DrainReport, ProducerGroup};
pub use source::{RotationAngle, SourceConfiguration};
