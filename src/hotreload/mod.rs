//! Hot Reloading
//!
//! Two long-lived execution contexts cooperate here. The background
//! [`Scanner`](scanner::Scanner) re-checks registered description files and
//! live resources' sources, reconverting anything stale into a private
//! staging database. The main-thread publisher
//! ([`publish::publish_pending`]) drains staged batches off a bounded
//! channel (a non-blocking receive, so the render loop never waits) and
//! merges them into the live database, moving new contents into existing
//! allocations so pointers held by live game objects stay valid.
//!
//! The channel *is* the ownership handoff: a batch is owned by the scanner
//! until the moment it is sent, and by the publisher from the moment it is
//! received. No third state exists.

pub mod publish;
pub mod resolve;
pub mod scanner;

use crate::database::ResourceDatabase;

/// A metadata-only change that must run on the main thread (the thread
/// that owns the graphics context), e.g. retuning a sampler without
/// re-uploading pixels.
pub type UpdateClosure = Box<dyn FnOnce(&ResourceDatabase) + Send>;

/// One scanner (or async-load) product: a private database of freshly
/// loaded resources plus any main-thread-only update closures.
pub struct StagedBatch {
    pub db: ResourceDatabase,
    pub updates: Vec<UpdateClosure>,
}

impl StagedBatch {
    #[must_use]
    pub fn new() -> Self {
        Self {
            db: ResourceDatabase::new(),
            updates: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.db.is_empty() && self.updates.is_empty()
    }
}

impl Default for StagedBatch {
    fn default() -> Self {
        Self::new()
    }
}
