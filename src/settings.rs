//! Pipeline Settings
//!
//! Configuration for the conversion pipeline and the hot-reload scanner.
//! There is no global state: a [`PipelineSettings`] value is handed to
//! [`ResourceManager::new`](crate::manager::ResourceManager::new) and owned
//! by it for the process lifetime.
//!
//! ```rust,ignore
//! use kiln::settings::PipelineSettings;
//!
//! let settings = PipelineSettings {
//!     force: true,
//!     ..PipelineSettings::new("assets", "assets/.cache")
//! };
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for converters, the scanner and the async loader.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Root directory that relative source paths in description files are
    /// resolved against.
    pub asset_root: PathBuf,

    /// Directory that cache artifacts ("fastfiles") are written under, one
    /// subdirectory per resource kind.
    pub cache_dir: PathBuf,

    /// How long the scanner sleeps between scan cycles.
    pub scan_interval: Duration,

    /// Reconvert everything regardless of staleness.
    pub force: bool,

    /// Capacity of the staging channel between the scanner and the
    /// publisher. A full channel applies back-pressure to the scanner, never
    /// to the main thread.
    pub staging_capacity: usize,
}

impl PipelineSettings {
    #[must_use]
    pub fn new(asset_root: impl AsRef<Path>, cache_dir: impl AsRef<Path>) -> Self {
        Self {
            asset_root: asset_root.as_ref().to_path_buf(),
            cache_dir: cache_dir.as_ref().to_path_buf(),
            scan_interval: Duration::from_millis(500),
            force: false,
            staging_capacity: 4,
        }
    }

    /// Resolves a source path from a description file against the asset root.
    #[must_use]
    pub fn resolve_source(&self, filename: &str) -> PathBuf {
        let path = Path::new(filename);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.asset_root.join(path)
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::new("assets", "assets/.cache")
    }
}
