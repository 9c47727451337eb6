//! Error Types
//!
//! This module defines the error types used throughout the pipeline.
//!
//! # Overview
//!
//! The main error type [`KilnError`] covers all failure modes including:
//! - Description-file parse errors
//! - Dependency checking (stat) failures
//! - Conversion failures
//! - Cache-artifact load failures
//!
//! # Usage
//!
//! All public APIs return [`Result<T>`] which is an alias for `std::result::Result<T, KilnError>`.
//!
//! ```rust,ignore
//! use kiln::errors::{KilnError, Result};
//!
//! fn load_manifest() -> Result<()> {
//!     // Operations that may fail return Result
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// The main error type for the kiln pipeline.
///
/// Each variant provides specific context about what went wrong. The
/// taxonomy matters for containment: `Parse` aborts one description file,
/// `Checking` means "assume stale, retry next cycle", `Convert` leaves the
/// previous cache artifact in place, and `Load` falls back to the resource
/// kind's default.
#[derive(Error, Debug)]
pub enum KilnError {
    // ========================================================================
    // Description File Errors
    // ========================================================================
    /// Malformed resource description file. Aborts that file's load
    /// entirely; other files are unaffected.
    #[error("Parse error in {file}: {message}")]
    Parse {
        /// Path of the offending description file
        file: String,
        /// What was wrong
        message: String,
    },

    // ========================================================================
    // Dependency Checking Errors
    // ========================================================================
    /// I/O failure while stat'ing a dependency. Distinct from staleness:
    /// a missing file is a legitimate stale state, not an error.
    #[error("Checking error for {path}: {source}")]
    Checking {
        /// Path being stat'ed
        path: String,
        /// The underlying I/O error
        source: std::io::Error,
    },

    // ========================================================================
    // Conversion Errors
    // ========================================================================
    /// A kind-specific transform failed. The cache is left untouched (or
    /// the partial artifact removed), so the resource keeps its previous
    /// cached value if one exists.
    #[error("Convert error for {name}: {message}")]
    Convert {
        /// Name of the resource being converted
        name: String,
        /// What failed
        message: String,
    },

    // ========================================================================
    // Load Errors
    // ========================================================================
    /// A converted/cached artifact could not be turned into a live resource.
    #[error("Load error for {name}: {message}")]
    Load {
        /// Name of the resource being loaded
        name: String,
        /// What failed
        message: String,
    },

    /// The requested resource was not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    // ========================================================================
    // I/O Errors
    // ========================================================================
    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ========================================================================
    // Image & Texture Errors
    // ========================================================================
    /// Image decoding error.
    #[error("Image decode error: {0}")]
    ImageDecode(String),

    // ========================================================================
    // Async & Threading Errors
    // ========================================================================
    /// Task join error (when async load tasks fail to complete).
    #[error("Task join error: {0}")]
    TaskJoin(String),
}

// ============================================================================
// Convenient conversion implementations
// ============================================================================

impl From<image::ImageError> for KilnError {
    fn from(err: image::ImageError) -> Self {
        KilnError::ImageDecode(err.to_string())
    }
}

impl From<tokio::task::JoinError> for KilnError {
    fn from(err: tokio::task::JoinError) -> Self {
        KilnError::TaskJoin(err.to_string())
    }
}

/// Alias for `Result<T, KilnError>`.
pub type Result<T> = std::result::Result<T, KilnError>;
