//! Process-local leak tracking for shared-memory regions.
//!
//! Every region this process creates is recorded until this process releases
//! it; [`sweep`] unlinks whatever is still recorded. That is the right policy
//! for a process that owns its regions end to end, and the wrong one for a
//! producer: a producer creates regions that the viewer, a different process,
//! releases. Its table would only ever grow, and a sweep at producer exit
//! would unlink frames the viewer has not consumed yet.
//!
//! Producers therefore call [`untrack_shared_memory`] once at startup. From
//! then on lifecycle discipline replaces tracking: the consumer or the
//! shutdown drain is responsible for every region the producer publishes.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{debug, warn};

static TRACKER: Lazy<Mutex<ResourceTracker>> = Lazy::new(|| Mutex::new(ResourceTracker::new()));

/// Registry of region names created and not yet released by this process.
#[derive(Debug)]
pub struct ResourceTracker {
    shared_memory: bool,
    regions: HashSet<String>,
}

impl Default for ResourceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self {
            shared_memory: true,
            regions: HashSet::new(),
        }
    }

    /// Record a freshly created region. Returns false when tracking is off.
    pub fn register(&mut self, name: &str) -> bool {
        if !self.shared_memory {
            return false;
        }
        self.regions.insert(name.to_owned())
    }

    /// Forget a region after it was unlinked.
    pub fn forget(&mut self, name: &str) -> bool {
        self.regions.remove(name)
    }

    /// Stop tracking shared memory in this process. Regions already recorded stay recorded.
    pub fn untrack_shared_memory(&mut self) {
        self.shared_memory = false;
    }

    pub fn is_tracking_shared_memory(&self) -> bool {
        self.shared_memory
    }

    pub fn is_tracked(&self, name: &str) -> bool {
        self.regions.contains(name)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Take every recorded name, leaving the table empty.
    pub fn take_all(&mut self) -> Vec<String> {
        self.regions.drain().collect()
    }
}

pub(crate) fn register(name: &str) {
    TRACKER.lock().register(name);
}

pub(crate) fn forget(name: &str) {
    TRACKER.lock().forget(name);
}

/// Disable shared-memory leak tracking for the calling process.
///
/// Required in every process that publishes regions another process releases.
/// Call once, before the first publish.
pub fn untrack_shared_memory() {
    TRACKER.lock().untrack_shared_memory();
    debug!("shared-memory leak tracking disabled for pid {}", std::process::id());
}

pub fn is_tracked(name: &str) -> bool {
    TRACKER.lock().is_tracked(name)
}

/// Unlink every region this process created and never released. Returns how many were swept.
pub fn sweep() -> usize {
    let names = TRACKER.lock().take_all();
    let mut swept = 0;
    for name in names {
        match super::region::unlink_name(&name) {
            Ok(()) => {
                warn!("unlinked leaked shared-memory region {}", name);
                swept += 1;
            }
            // Another process already released it.
            Err(err) if err.is_region_not_found() => {}
            Err(err) => warn!("failed to unlink leaked region {}: {}", name, err),
        }
    }
    swept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_and_forgets() {
        let mut tracker = ResourceTracker::new();
        assert!(tracker.register("/a"));
        assert!(tracker.register("/b"));
        assert!(tracker.forget("/a"));
        assert!(!tracker.forget("/a"));
        assert_eq!(tracker.len(), 1);
        assert!(tracker.is_tracked("/b"));
    }

    #[test]
    fn untracked_process_does_not_grow() {
        let mut tracker = ResourceTracker::new();
        tracker.register("/before");
        assert!(tracker.is_tracking_shared_memory());
        tracker.untrack_shared_memory();
        assert!(!tracker.is_tracking_shared_memory());

        for i in 0..1000 {
            assert!(!tracker.register(&format!("/frame_{i}")));
        }
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.take_all(), vec!["/before".to_string()]);
        assert!(tracker.is_empty());
    }
}
