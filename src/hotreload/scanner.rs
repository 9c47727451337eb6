//! Background Scanner
//!
//! A dedicated worker thread that alternates between sleeping and one scan
//! cycle. A cycle re-stats every registered description file (a changed
//! manifest triggers a full reparse and reload of everything it declares)
//! and then asks every live
//! resource whether its own sources changed, reconverting and staging
//! what did.
//!
//! The thread never writes to the live database and never holds a lock
//! across I/O; its only interaction with the main thread is sending
//! finished batches over the bounded staging channel. Shutdown is
//! cooperative: an exit flag polled at the top of each cycle, inside the
//! per-resource loops and while waiting on a full channel, so shutdown
//! latency is bounded by one resource's reload, not a whole batch.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::convert::composite::CompositeConverter;
use crate::convert::stamp::TimestampedFile;
use crate::convert::{converter_for, ConvertStatus};
use crate::database::{ResourceDatabase, ResourceType};
use crate::hotreload::StagedBatch;
use crate::resources::{Model, Reloadable, ResourceKind, Script, Shader, Texture};
use crate::settings::PipelineSettings;

/// Granularity at which the worker re-checks the exit flag while sleeping
/// or waiting on a full staging channel.
const POLL_SLICE: Duration = Duration::from_millis(50);

pub struct Scanner {
    exit: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl Scanner {
    /// Starts the scanner thread watching `manifests`.
    #[must_use]
    pub fn spawn(
        live: Arc<ResourceDatabase>,
        manifests: Vec<PathBuf>,
        settings: PipelineSettings,
        tx: flume::Sender<StagedBatch>,
    ) -> Self {
        let exit = Arc::new(AtomicBool::new(false));
        let worker_exit = Arc::clone(&exit);

        let join = std::thread::Builder::new()
            .name("kiln-scanner".to_string())
            .spawn(move || {
                let mut worker = Worker {
                    live,
                    settings,
                    tx,
                    exit: worker_exit,
                    manifests: manifests
                        .into_iter()
                        .map(|path| {
                            let stamp = TimestampedFile::new(&path);
                            (path, stamp)
                        })
                        .collect(),
                };
                worker.run();
            })
            .expect("failed to spawn scanner thread");

        Self {
            exit,
            join: Some(join),
        }
    }

    /// Raises the exit flag and joins the worker. May block for one
    /// in-flight conversion; there is no hard timeout.
    pub fn shutdown(&mut self) {
        self.exit.store(true, Ordering::Release);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                log::error!("scanner thread panicked during shutdown");
            }
        }
    }
}

impl Drop for Scanner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// Worker
// ============================================================================

struct Worker {
    live: Arc<ResourceDatabase>,
    settings: PipelineSettings,
    tx: flume::Sender<StagedBatch>,
    exit: Arc<AtomicBool>,
    manifests: Vec<(PathBuf, TimestampedFile)>,
}

impl Worker {
    fn should_exit(&self) -> bool {
        self.exit.load(Ordering::Acquire)
    }

    fn run(&mut self) {
        log::debug!(
            "scanner watching {} description file(s), interval {:?}",
            self.manifests.len(),
            self.settings.scan_interval
        );
        loop {
            if self.should_exit() {
                break;
            }

            let mut batch = StagedBatch::new();
            self.scan_manifests(&mut batch.db);
            self.scan_live_resources(&mut batch.db);

            if !batch.is_empty() && !self.send_batch(batch) {
                break; // receiver gone, manager shut down
            }

            self.sleep_interval();
        }
        log::debug!("scanner exiting");
        // staging contents (if any) are dropped with the worker
    }

    /// Sends a batch, blocking in short slices with the exit flag re-checked
    /// between attempts. A full channel applies back-pressure to this thread,
    /// never to the render loop, but must not wedge shutdown: on exit the
    /// batch is dropped and the next startup rescan rebuilds it. Returns
    /// `false` when the receiver is gone.
    fn send_batch(&self, batch: StagedBatch) -> bool {
        let mut pending = batch;
        loop {
            if self.should_exit() {
                return true;
            }
            match self.tx.send_timeout(pending, POLL_SLICE) {
                Ok(()) => return true,
                Err(flume::SendTimeoutError::Timeout(batch)) => pending = batch,
                Err(flume::SendTimeoutError::Disconnected(_)) => return false,
            }
        }
    }

    /// Step 1: changed description files get a full reparse and reload of
    /// everything they declare.
    fn scan_manifests(&mut self, staging: &mut ResourceDatabase) {
        // split borrow: the manifest list is updated in place while the
        // composite pipeline reads settings/live
        let (live, settings) = (&self.live, &self.settings);
        for (path, stamp) in &mut self.manifests {
            if self.exit.load(Ordering::Acquire) {
                return;
            }
            match stamp.update() {
                Ok(false) => {}
                Ok(true) => {
                    log::info!("description file {} changed, reloading", path.display());
                    match CompositeConverter::from_file(&*path, settings) {
                        Ok(mut composite) => {
                            composite.stage_into(live, staging, false);
                        }
                        Err(err) => {
                            // other description files are unaffected
                            log::error!("{err}");
                        }
                    }
                }
                Err(err) => {
                    log::warn!("{err} (will retry next cycle)");
                }
            }
        }
    }

    /// Step 2: every live resource re-stats its own sources. Materials are
    /// skipped: their only dependency is the description file, which step
    /// 1 already covers.
    fn scan_live_resources(&self, staging: &mut ResourceDatabase) {
        self.scan_kind::<Shader>(staging);
        self.scan_kind::<Texture>(staging);
        self.scan_kind::<Model>(staging);
        self.scan_kind::<Script>(staging);
    }

    fn scan_kind<T>(&self, staging: &mut ResourceDatabase)
    where
        T: ResourceType + Reloadable,
    {
        debug_assert_ne!(T::KIND, ResourceKind::Material);
        for (name, handle) in T::map(&self.live).handles() {
            if self.should_exit() {
                return;
            }
            let source = handle.read().source_ref().cloned();
            let Some(source) = source else { continue };

            match source.any_dependency_changed() {
                Ok(false) => {}
                Ok(true) => {
                    log::info!("{} \"{name}\" source changed, reconverting", T::KIND);
                    self.reconvert(&source, staging);
                }
                Err(err) => {
                    log::warn!("{err} (will retry next cycle)");
                }
            }
        }
    }

    /// Rebuilds one resource from its recorded declaration into the
    /// staging database. On failure the live resource keeps its previous
    /// contents; hot reload failures are log-only.
    fn reconvert(&self, source: &crate::resources::SourceRef, staging: &mut ResourceDatabase) {
        let manifest_hint = source
            .dependencies
            .first()
            .map(|dep| dep.path().to_path_buf())
            .unwrap_or_default();
        let mut converter = converter_for(&source.decl, &manifest_hint, &self.settings);
        converter.check_dependencies();
        match converter.convert(false) {
            ConvertStatus::Success | ConvertStatus::HelpDisplayed => {
                if let Err(err) = converter.load_into(staging) {
                    log::warn!("{err}; keeping previous contents");
                }
            }
            _ => {
                log::warn!(
                    "{} \"{}\" reconversion failed; keeping previous contents",
                    converter.kind(),
                    converter.name()
                );
            }
        }
    }

    /// Sleeps the scan interval in short slices so shutdown is prompt even
    /// with a long interval.
    fn sleep_interval(&self) {
        let mut remaining = self.settings.scan_interval;
        while !remaining.is_zero() {
            if self.should_exit() {
                return;
            }
            let step = remaining.min(POLL_SLICE);
            std::thread::sleep(step);
            remaining -= step;
        }
    }
}
