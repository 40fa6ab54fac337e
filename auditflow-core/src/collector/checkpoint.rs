//! High-water mark between delivered and new events

/// Load/store capability for the last seen event GUID.
///
/// Only the collector holds one. The in-memory store starts empty on every
/// process start; a persistent store can be swapped in without touching the
/// collector.
pub trait CheckpointStore: Send {
    fn load(&self) -> Option<String>;
    fn store(&mut self, guid: String);
}

/// Process-local checkpoint
#[derive(Debug, Default, Clone)]
pub struct MemoryCheckpoint {
    last_seen: Option<String>,
}

impl MemoryCheckpoint {
    /// Start from a known GUID instead of empty
    pub fn starting_at(guid: impl Into<String>) -> Self {
        Self {
            last_seen: Some(guid.into()),
        }
    }
}

impl CheckpointStore for MemoryCheckpoint {
    fn load(&self) -> Option<String> {
        self.last_seen.clone()
    }

    fn store(&mut self, guid: String) {
        self.last_seen = Some(guid);
    }
}
