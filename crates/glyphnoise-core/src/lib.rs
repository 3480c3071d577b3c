//! Core analysis logic for the Glyphnoise library.
//!
//! Glyphnoise measures how robust a least-squares glyph recognizer is to
//! additive noise. Each character image is reduced to a small binary raster,
//! glyphs are compared pairwise, and a Monte-Carlo loop counts how often a
//! perturbed glyph pulls the least-squares fit away from its noise-free answer.
//!
//! # Architecture Overview
//!
//! 1. **Encoding** ([`encoder`]):
//!    - Decode, convert to luma, resize to the target [`GridSize`].
//!    - Laplacian sharpening ([`filter`]) and global binarization ([`threshold`]).
//!    - Column-major flattening into an [`ImageVector`].
//!
//! 2. **Primitives** ([`linalg`], [`noise`]):
//!    - Cosine angle, sample covariance, ordinary and covariance-weighted least squares.
//!    - Uniform noise, additive perturbation, SNR in decibels.
//!
//! 3. **Experiment** ([`experiment`]):
//!    - Every unordered pair `(i, j)` fits `v_i` against `[v_i | v_j]`.
//!    - N noisy trials per pair re-solve with the same design matrix.
//!    - Results roll up into a [`ResultsBundle`].
//!
//! 4. **Reporting** ([`report`]): JSON, CSV or text artifacts; partial files are removed on failure.
//!
//! Progress is pushed as [`ProgressEvent`]s into a caller-supplied
//! [`ProgressSink`]; [`worker::spawn_analysis`] runs a job on its own thread.
//! Diagnostics go through `tracing`; installing a subscriber is up to the caller.
//!
//! # Example
//!
//! ```
//! use glyphnoise_core::{AnalysisConfig, EncodedGlyph, ExperimentRunner, GridSize, NullSink};
//! use glyphnoise_core::image::ImageMatrix;
//!
//! let grid = GridSize::new(3, 3).unwrap();
//! let l = ImageMatrix::from_row_major(3, 3, vec![1, 0, 0, 1, 0, 0, 1, 1, 1]).unwrap();
//! let t = ImageMatrix::from_row_major(3, 3, vec![1, 1, 1, 0, 1, 0, 0, 1, 0]).unwrap();
//! let glyphs = vec![EncodedGlyph::from_matrix("L", l), EncodedGlyph::from_matrix("T", t)];
//!
//! let runner = ExperimentRunner::with_config(
//!     AnalysisConfig::builder().trials_per_pair(50).seed(1).build(),
//! );
//! let bundle = runner.run_encoded(glyphs, grid, Some(0.5), &mut NullSink).unwrap();
//! assert_eq!(bundle.pairs.len(), 1);
//! ```

/// Configuration types for encoding and analysis.
pub mod config;
/// Image-to-vector encoding.
pub mod encoder;
/// Error taxonomy.
pub mod error;
/// Monte-Carlo experiment runner and results model.
pub mod experiment;
/// Sharpening enhancement.
pub mod filter;
/// Image buffer abstractions.
pub mod image;
/// Angle, covariance and least-squares primitives.
pub mod linalg;
/// Additive noise model.
pub mod noise;
/// Progress events, sinks and cancellation.
pub mod progress;
/// Report renderers.
pub mod report;
/// Binarization.
pub mod threshold;
/// Utilities for testing and synthetic glyph generation.
pub mod test_utils;
/// Background execution.
pub mod worker;

pub use crate::config::{AnalysisConfig, EncoderConfig, GridSize};
pub use crate::encoder::{encode, EncodedGlyph, ImageVector};
pub use crate::error::{AnalysisError, Result};
pub use crate::experiment::{
    Experiment, ExperimentRunner, PairAnalysis, ResultsBundle, RunParameters, Statistics,
};
pub use crate::progress::{CancellationToken, NullSink, ProgressEvent, ProgressSink, RunPhase};
pub use crate::report::{ReportFormat, ReportRenderer};
