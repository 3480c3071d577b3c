//! Error taxonomy for the analysis pipeline.
//!
//! Errors are classified, never formatted for end users beyond `Display`.
//! Every variant carries the context (path, pair indices, shapes) a caller
//! needs to present a useful message.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for analysis operations.
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Errors raised while encoding glyphs, solving, or running an analysis.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Invalid run parameters (grid size, image count, noise scale, trial count).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Vector or matrix shapes that must agree do not.
    #[error("dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Operation that detected the mismatch.
        context: &'static str,
        /// Expected length or row count.
        expected: usize,
        /// Actual length or row count.
        actual: usize,
    },

    /// A decomposition failed or produced non-finite values.
    #[error("solver failure: {0}")]
    Solver(String),

    /// An image could not be opened, decoded, or resized.
    #[error("failed to load image {}: {reason}", path.display())]
    Load {
        /// Offending image path.
        path: PathBuf,
        /// Underlying decoder message.
        reason: String,
    },

    /// Analysis of a single pair failed. Recorded on the pair, never fatal.
    #[error("pair ({first}, {second}) failed: {reason}")]
    Pair {
        /// Index of the first image of the pair.
        first: usize,
        /// Index of the second image of the pair.
        second: usize,
        /// What went wrong.
        reason: String,
    },

    /// The report renderer failed; any partial artifact has been removed.
    #[error("failed to write report {}: {reason}", path.display())]
    Reporting {
        /// Report artifact path.
        path: PathBuf,
        /// Underlying writer message.
        reason: String,
    },

    /// The run was cancelled between pairs.
    #[error("analysis cancelled")]
    Cancelled,

    /// The background worker could not be started or panicked.
    #[error("analysis worker failed: {0}")]
    Worker(String),
}

impl AnalysisError {
    /// Whether this error aborts a whole run.
    ///
    /// Pair errors are isolated to their pair; everything else is fatal.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Pair { .. })
    }

    pub(crate) fn load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Load {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_errors_are_not_fatal() {
        let err = AnalysisError::Pair {
            first: 0,
            second: 2,
            reason: "singular".into(),
        };
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "pair (0, 2) failed: singular");
    }

    #[test]
    fn test_load_error_names_path() {
        let err = AnalysisError::load("glyphs/a.png", "unsupported format");
        assert!(err.is_fatal());
        assert!(err.to_string().contains("glyphs/a.png"));
    }
}
