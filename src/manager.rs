//! Resource Manager
//!
//! The engine-facing context object for the whole pipeline: owns the live
//! [`ResourceDatabase`], the staging channel, the background scanner and
//! any in-flight async loads. Created at engine init, shut down at engine
//! shutdown; nothing here is global.
//!
//! The live database is mutated only from the thread that calls
//! [`publish_pending`](ResourceManager::publish_pending) and
//! [`wait_for_completion`](ResourceManager::wait_for_completion), by
//! convention the main thread. The scanner and async load tasks populate
//! private staging databases and hand them over through the channel.
//!
//! ```rust,ignore
//! use kiln::manager::ResourceManager;
//! use kiln::settings::PipelineSettings;
//!
//! let mut manager = ResourceManager::new(PipelineSettings::new("assets", "assets/.cache"));
//! manager.load_async("assets/level1.res");
//! manager.wait_for_completion(None)?;   // startup: block until present
//! manager.start_watching();             // dev-time hot reload
//!
//! // per frame:
//! manager.publish_pending();
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

use crate::convert::composite::CompositeConverter;
use crate::database::ResourceDatabase;
use crate::errors::Result;
use crate::hotreload::publish::{publish_batch, publish_pending};
use crate::hotreload::scanner::Scanner;
use crate::hotreload::StagedBatch;
use crate::settings::PipelineSettings;

fn loader_runtime() -> &'static Runtime {
    static RUNTIME: OnceLock<Runtime> = OnceLock::new();
    RUNTIME.get_or_init(|| Runtime::new().expect("Failed to create asset loader runtime"))
}

struct PendingLoad {
    path: PathBuf,
    task: JoinHandle<Result<StagedBatch>>,
}

pub struct ResourceManager {
    db: Arc<ResourceDatabase>,
    settings: PipelineSettings,
    tx: flume::Sender<StagedBatch>,
    rx: flume::Receiver<StagedBatch>,
    scanner: Option<Scanner>,
    manifests: Vec<PathBuf>,
    pending: Vec<PendingLoad>,
}

impl ResourceManager {
    #[must_use]
    pub fn new(settings: PipelineSettings) -> Self {
        let (tx, rx) = flume::bounded(settings.staging_capacity);
        Self {
            db: Arc::new(ResourceDatabase::new()),
            settings,
            tx,
            rx,
            scanner: None,
            manifests: Vec::new(),
            pending: Vec::new(),
        }
    }

    /// The live database. Safe to read from anywhere; mutated only by this
    /// manager's publish operations.
    #[must_use]
    pub fn database(&self) -> &Arc<ResourceDatabase> {
        &self.db
    }

    #[must_use]
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Synchronously converts and loads one description file, merging the
    /// result immediately. The file is registered for watching. Returns
    /// how many resources were loaded.
    pub fn load_manifest(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref().to_path_buf();
        let mut composite = CompositeConverter::from_file(&path, &self.settings)?;

        let mut batch = StagedBatch::new();
        let staged = composite.stage_into(&self.db, &batch.db, self.settings.force);
        publish_batch(&self.db, batch, &self.settings);

        self.register_manifest(path);
        Ok(staged)
    }

    /// Spawns a one-shot background load of a description file: the same
    /// parse → convert → load pipeline the scanner runs, but as a task
    /// instead of a loop. Multiple files may load concurrently. Use
    /// [`wait_for_completion`](Self::wait_for_completion) to block on and
    /// merge the result.
    pub fn load_async(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        let settings = self.settings.clone();
        let live = Arc::clone(&self.db);
        let task_path = path.clone();

        let task = loader_runtime().spawn(async move {
            let mut composite = CompositeConverter::from_file(&task_path, &settings)?;
            let mut batch = StagedBatch::new();
            composite.stage_into(&live, &batch.db, settings.force);
            Ok(batch)
        });

        self.pending.push(PendingLoad { path, task });
    }

    /// Blocks until the async loads matching `filter` (a path substring;
    /// `None` matches all) finish, merging each resulting batch
    /// synchronously. These loads are load-bearing, so the first failure
    /// propagates instead of falling back silently.
    pub fn wait_for_completion(&mut self, filter: Option<&str>) -> Result<()> {
        let matches = |p: &PendingLoad| {
            filter.is_none_or(|needle| p.path.to_string_lossy().contains(needle))
        };

        let mut kept = Vec::new();
        let mut first_error = None;
        for pending in self.pending.drain(..) {
            if !matches(&pending) {
                kept.push(pending);
                continue;
            }
            let path = pending.path.clone();
            match loader_runtime().block_on(pending.task) {
                Ok(Ok(batch)) => {
                    publish_batch(&self.db, batch, &self.settings);
                    self.manifests.push(path);
                }
                Ok(Err(err)) => {
                    log::error!("failed to load resource file {}: {err}", path.display());
                    first_error.get_or_insert(err);
                }
                Err(join_err) => {
                    log::error!("load task for {} did not complete: {join_err}", path.display());
                    first_error.get_or_insert(join_err.into());
                }
            }
        }
        self.pending = kept;
        self.dedup_manifests();

        match first_error {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    /// Non-blocking merge of whatever the scanner has staged. Call once
    /// per frame. Returns the number of batches merged.
    pub fn publish_pending(&self) -> usize {
        publish_pending(&self.db, &self.rx, &self.settings)
    }

    /// Starts (or restarts, picking up newly registered description files)
    /// the background hot-reload scanner.
    pub fn start_watching(&mut self) {
        if let Some(mut scanner) = self.scanner.take() {
            scanner.shutdown();
        }
        self.scanner = Some(Scanner::spawn(
            Arc::clone(&self.db),
            self.manifests.clone(),
            self.settings.clone(),
            self.tx.clone(),
        ));
    }

    #[must_use]
    pub fn is_watching(&self) -> bool {
        self.scanner.is_some()
    }

    /// Stops the scanner and abandons un-waited async loads. Idempotent.
    pub fn shutdown(&mut self) {
        if let Some(mut scanner) = self.scanner.take() {
            scanner.shutdown();
        }
        for pending in self.pending.drain(..) {
            pending.task.abort();
        }
    }

    fn register_manifest(&mut self, path: PathBuf) {
        self.manifests.push(path);
        self.dedup_manifests();
    }

    fn dedup_manifests(&mut self) {
        self.manifests.sort_unstable();
        self.manifests.dedup();
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
