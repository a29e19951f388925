//! Shared-memory transfer primitive.
//!
//! A producer copies an array into a freshly created named region and sends
//! only the [`SharedBufferDescriptor`] across the queue. The consumer copies
//! the bytes back out with [`resolve_and_copy`] and destroys the region with
//! [`release`]. Each frame gets its own region; nothing is reused, so a region
//! is never written while someone reads it.

pub mod array;
pub mod descriptor;
pub mod region;
pub mod tracker;

pub use array::{DepthImage, SharedArray};
pub use descriptor::{Element, ElementType, SharedBufferDescriptor};
pub use region::{allocate_and_publish, publish, region_exists, release, resolve_and_copy};
pub use tracker::{untrack_shared_memory, ResourceTracker};
