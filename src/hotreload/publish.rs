//! Publishing (main-thread merge)
//!
//! Called once per frame (or at an explicit sync point). Receiving from
//! the staging channel is non-blocking: if the scanner is mid-stage there
//! is simply nothing to receive and the render loop moves on, merge
//! deferred to the next call.

use crate::database::ResourceDatabase;
use crate::hotreload::{resolve, StagedBatch};
use crate::settings::PipelineSettings;

/// Merges one staged batch into the live database.
///
/// Per kind, in fixed dependency order: staged contents are moved into
/// existing allocations (addresses stable for every outstanding handle),
/// new names are inserted. Update closures then run on this thread (the
/// thread that owns the graphics context) and finally the soft-link
/// resolver binds whatever the merge made resolvable. Returns how many
/// resources were merged.
pub fn publish_batch(
    live: &ResourceDatabase,
    batch: StagedBatch,
    settings: &PipelineSettings,
) -> usize {
    let StagedBatch { db, updates } = batch;

    let mut merged = 0;
    merged += live.shaders.merge_from(db.shaders);
    merged += live.textures.merge_from(db.textures);
    merged += live.materials.merge_from(db.materials);
    merged += live.models.merge_from(db.models);
    merged += live.scripts.merge_from(db.scripts);

    for update in updates {
        update(live);
    }

    let bound = resolve::resolve_soft_links(live, settings);
    if merged > 0 || bound > 0 {
        log::debug!("published batch: {merged} resources merged, {bound} links bound");
    }
    merged
}

/// Drains every batch currently waiting on the channel and merges them in
/// arrival order. Never blocks. Returns the number of batches published.
pub fn publish_pending(
    live: &ResourceDatabase,
    rx: &flume::Receiver<StagedBatch>,
    settings: &PipelineSettings,
) -> usize {
    let mut batches = 0;
    while let Ok(batch) = rx.try_recv() {
        publish_batch(live, batch, settings);
        batches += 1;
    }
    batches
}
