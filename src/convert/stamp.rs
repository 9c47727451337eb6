//! Timestamped file dependencies.
//!
//! A [`TimestampedFile`] remembers the modification time a file had the last
//! time we looked at it, and answers "has this changed since then?". A
//! missing file is a legitimate (stale) state, not an error; only genuine
//! I/O failures such as permission errors surface as
//! [`KilnError::Checking`].

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::errors::{KilnError, Result};

/// A file path plus its last-observed modification time.
#[derive(Debug, Clone)]
pub struct TimestampedFile {
    path: PathBuf,
    mtime: Option<SystemTime>,
    valid: bool,
}

impl TimestampedFile {
    /// Stats the file once and records what it finds. Never fails: a
    /// missing file yields an invalid stamp.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let mtime = stat_mtime(&path).ok().flatten();
        let valid = mtime.is_some();
        Self { path, mtime, valid }
    }

    /// Like [`new`](Self::new), but surfaces genuine I/O failures
    /// (permission denied and the like) as [`KilnError::Checking`] instead
    /// of recording an invalid stamp. Dependency checking uses this so it
    /// can distinguish "stale" from "could not check".
    pub fn try_new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mtime = stat_mtime(&path).map_err(|err| KilnError::Checking {
            path: path.display().to_string(),
            source: err,
        })?;
        let valid = mtime.is_some();
        Ok(Self { path, mtime, valid })
    }

    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file existed (and was readable) at last check.
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    #[inline]
    #[must_use]
    pub fn mtime(&self) -> Option<SystemTime> {
        self.mtime
    }

    /// Re-stats the file. Returns `Ok(true)` iff the observed state changed
    /// (mtime advanced, file appeared, or file disappeared). This is the
    /// only mutation path.
    pub fn update(&mut self) -> Result<bool> {
        let mtime = match stat_mtime(&self.path) {
            Ok(m) => m,
            Err(err) => {
                return Err(KilnError::Checking {
                    path: self.path.display().to_string(),
                    source: err,
                });
            }
        };
        let valid = mtime.is_some();
        let changed = valid != self.valid || mtime != self.mtime;
        self.mtime = mtime;
        self.valid = valid;
        Ok(changed)
    }

    /// Staleness relative to a dependency: `self` is the derived artifact,
    /// `other` the source. Stale if the artifact is missing while the source
    /// exists, or both exist and the source is newer.
    #[must_use]
    pub fn is_stale_relative_to(&self, other: &TimestampedFile) -> bool {
        match (self.valid, other.valid) {
            (false, true) => true,
            (true, true) => self.mtime < other.mtime,
            _ => false,
        }
    }
}

/// `Ok(None)` for a missing file, `Err` only for genuine I/O failures.
fn stat_mtime(path: &Path) -> io::Result<Option<SystemTime>> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(Some(meta.modified()?)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_invalid_not_error() {
        let stamp = TimestampedFile::new("/definitely/not/here.png");
        assert!(!stamp.is_valid());
        assert!(stamp.mtime().is_none());
    }

    #[test]
    fn missing_artifact_is_stale_against_existing_source() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("source.txt");
        std::fs::write(&src, "hello").unwrap();

        let artifact = TimestampedFile::new(dir.path().join("artifact.bin"));
        let source = TimestampedFile::new(&src);
        assert!(artifact.is_stale_relative_to(&source));
        // The reverse is not stale: a source missing its artifact says
        // nothing about the source itself.
        assert!(!source.is_stale_relative_to(&artifact));
    }

    #[test]
    fn update_detects_mtime_change() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("source.txt");
        std::fs::write(&src, "v1").unwrap();

        let mut stamp = TimestampedFile::new(&src);
        assert!(!stamp.update().unwrap());

        let newer = SystemTime::now() + std::time::Duration::from_secs(5);
        let file = std::fs::File::options().write(true).open(&src).unwrap();
        file.set_modified(newer).unwrap();
        drop(file);

        assert!(stamp.update().unwrap());
        assert!(!stamp.update().unwrap());
    }

    #[test]
    fn update_detects_deletion() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("source.txt");
        std::fs::write(&src, "v1").unwrap();

        let mut stamp = TimestampedFile::new(&src);
        std::fs::remove_file(&src).unwrap();
        assert!(stamp.update().unwrap());
        assert!(!stamp.is_valid());
    }
}
