//! Configuration types for the analysis pipeline.
//!
//! This module provides:
//! - [`GridSize`]: the target raster every glyph is resized to
//! - [`EncoderConfig`]: image-to-vector encoding settings
//! - [`AnalysisConfig`]: runner-level settings (trial count, thresholds, weighting)

use crate::error::{AnalysisError, Result};

/// Smallest accepted grid dimension.
pub const MIN_GRID_DIM: usize = 3;
/// Largest accepted grid dimension.
pub const MAX_GRID_DIM: usize = 100;
/// Largest glyph vector length (`width * height`) accepted under [`Weighting::Covariance`].
///
/// The weight is a dense D x D matrix that is eigen-decomposed once per run;
/// 2500 pixels (50x50) keeps that at 50 MB.
pub const MAX_COVARIANCE_PIXELS: usize = 2_500;

// ============================================================================
// GridSize
// ============================================================================

/// Target (width, height) every glyph is resized to before vectorization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GridSize {
    /// Number of columns.
    pub width: usize,
    /// Number of rows.
    pub height: usize,
}

impl GridSize {
    /// Create a grid size, rejecting dimensions outside `[3, 100]`.
    pub fn new(width: usize, height: usize) -> Result<Self> {
        let size = Self { width, height };
        size.validate()?;
        Ok(size)
    }

    /// Check both dimensions lie in the accepted range.
    pub fn validate(&self) -> Result<()> {
        let range = MIN_GRID_DIM..=MAX_GRID_DIM;
        if !range.contains(&self.width) || !range.contains(&self.height) {
            return Err(AnalysisError::Validation(format!(
                "grid size {}x{} outside accepted range {MIN_GRID_DIM}..={MAX_GRID_DIM}",
                self.width, self.height
            )));
        }
        Ok(())
    }

    /// Length of the flattened glyph vector.
    #[must_use]
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    /// Always false for a validated grid.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for GridSize {
    /// 5x7, the classic dot-matrix glyph cell.
    fn default() -> Self {
        Self {
            width: 5,
            height: 7,
        }
    }
}

impl std::fmt::Display for GridSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// ============================================================================
// EncoderConfig
// ============================================================================

/// Image-to-vector encoding settings.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EncoderConfig {
    /// Apply Laplacian sharpening after resizing (default: true).
    pub sharpen: bool,
    /// Normalized intensity below which a pixel counts as ink (default: 0.5).
    pub ink_threshold: f64,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            sharpen: true,
            ink_threshold: 0.5,
        }
    }
}

// ============================================================================
// AnalysisConfig
// ============================================================================

/// How the least-squares fit weights residuals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Weighting {
    /// Plain `min ||Ax - b||`.
    #[default]
    Ordinary,
    /// Generalized least squares weighted by the inverse pixel covariance of the batch.
    /// Allocates a D x D matrix (D = width * height), so grids are limited to
    /// [`MAX_COVARIANCE_PIXELS`].
    Covariance,
}

/// Which vector of a pair is used as the least-squares target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TargetMode {
    /// Pair (i, j) tests recoverability of vector i only.
    #[default]
    First,
    /// Run trials targeting both vectors and average the two directions.
    Both,
}

/// Basis used when measuring the angle between two glyph vectors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AngleBasis {
    /// Use the {0, 1} vectors as encoded.
    #[default]
    Binary,
    /// Map each element `x` to `2x - 1` first, so complementary glyphs are antiparallel.
    Signed,
}

/// What to do when one input image fails to load.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LoadPolicy {
    /// The first load failure aborts the run.
    #[default]
    Abort,
    /// Report the failure and continue with the remaining images.
    Skip,
}

/// Runner-level configuration.
///
/// Immutable once handed to an [`ExperimentRunner`](crate::ExperimentRunner).
///
/// # Example
/// ```
/// use glyphnoise_core::config::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .trials_per_pair(250)
///     .error_threshold(0.05)
///     .seed(7)
///     .build();
/// assert_eq!(config.trials_per_pair, 250);
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnalysisConfig {
    /// Encoder settings.
    pub encoder: EncoderConfig,
    /// Noisy trials per pair (default: 100).
    pub trials_per_pair: usize,
    /// Euclidean distance between solutions above which a trial counts as an error (default: 0.1).
    pub error_threshold: f64,
    /// Relative per-trial jitter of the noise scale, clamped to `[0, 0.2]` (default: 0 = off).
    pub scale_jitter: f64,
    /// Least-squares weighting mode.
    pub weighting: Weighting,
    /// Least-squares target selection.
    pub target_mode: TargetMode,
    /// Angle basis.
    pub angle_basis: AngleBasis,
    /// Load failure policy.
    pub load_policy: LoadPolicy,
    /// RNG seed for reproducible runs. `None` seeds from OS entropy.
    pub seed: Option<u64>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            encoder: EncoderConfig::default(),
            trials_per_pair: 100,
            error_threshold: 0.1,
            scale_jitter: 0.0,
            weighting: Weighting::Ordinary,
            target_mode: TargetMode::First,
            angle_basis: AngleBasis::Binary,
            load_policy: LoadPolicy::Abort,
            seed: None,
        }
    }
}

impl AnalysisConfig {
    /// Default noise scale when the caller supplies none.
    pub const DEFAULT_NOISE_SCALE: f64 = 3.0;

    /// Create a new builder for `AnalysisConfig`.
    #[must_use]
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder::default()
    }

    /// Reject configurations the runner cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.trials_per_pair == 0 {
            return Err(AnalysisError::Validation(
                "trials_per_pair must be at least 1".into(),
            ));
        }
        if !self.error_threshold.is_finite() || self.error_threshold < 0.0 {
            return Err(AnalysisError::Validation(format!(
                "error_threshold must be a non-negative finite number, got {}",
                self.error_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.encoder.ink_threshold) {
            return Err(AnalysisError::Validation(format!(
                "ink_threshold must lie in [0, 1], got {}",
                self.encoder.ink_threshold
            )));
        }
        Ok(())
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Default)]
pub struct AnalysisConfigBuilder {
    sharpen: Option<bool>,
    ink_threshold: Option<f64>,
    trials_per_pair: Option<usize>,
    error_threshold: Option<f64>,
    scale_jitter: Option<f64>,
    weighting: Option<Weighting>,
    target_mode: Option<TargetMode>,
    angle_basis: Option<AngleBasis>,
    load_policy: Option<LoadPolicy>,
    seed: Option<u64>,
}

impl AnalysisConfigBuilder {
    /// Enable or disable sharpening in the encoder.
    #[must_use]
    pub fn sharpen(mut self, enabled: bool) -> Self {
        self.sharpen = Some(enabled);
        self
    }

    /// Set the ink binarization threshold.
    #[must_use]
    pub fn ink_threshold(mut self, threshold: f64) -> Self {
        self.ink_threshold = Some(threshold);
        self
    }

    /// Set the number of noisy trials per pair.
    #[must_use]
    pub fn trials_per_pair(mut self, trials: usize) -> Self {
        self.trials_per_pair = Some(trials);
        self
    }

    /// Set the solution-distance error threshold.
    #[must_use]
    pub fn error_threshold(mut self, threshold: f64) -> Self {
        self.error_threshold = Some(threshold);
        self
    }

    /// Set the per-trial noise scale jitter.
    #[must_use]
    pub fn scale_jitter(mut self, jitter: f64) -> Self {
        self.scale_jitter = Some(jitter);
        self
    }

    /// Set the least-squares weighting mode.
    #[must_use]
    pub fn weighting(mut self, weighting: Weighting) -> Self {
        self.weighting = Some(weighting);
        self
    }

    /// Set the target mode.
    #[must_use]
    pub fn target_mode(mut self, mode: TargetMode) -> Self {
        self.target_mode = Some(mode);
        self
    }

    /// Set the angle basis.
    #[must_use]
    pub fn angle_basis(mut self, basis: AngleBasis) -> Self {
        self.angle_basis = Some(basis);
        self
    }

    /// Set the load failure policy.
    #[must_use]
    pub fn load_policy(mut self, policy: LoadPolicy) -> Self {
        self.load_policy = Some(policy);
        self
    }

    /// Seed the trial RNG.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> AnalysisConfig {
        let d = AnalysisConfig::default();
        AnalysisConfig {
            encoder: EncoderConfig {
                sharpen: self.sharpen.unwrap_or(d.encoder.sharpen),
                ink_threshold: self.ink_threshold.unwrap_or(d.encoder.ink_threshold),
            },
            trials_per_pair: self.trials_per_pair.unwrap_or(d.trials_per_pair),
            error_threshold: self.error_threshold.unwrap_or(d.error_threshold),
            scale_jitter: self.scale_jitter.unwrap_or(d.scale_jitter),
            weighting: self.weighting.unwrap_or(d.weighting),
            target_mode: self.target_mode.unwrap_or(d.target_mode),
            angle_basis: self.angle_basis.unwrap_or(d.angle_basis),
            load_policy: self.load_policy.unwrap_or(d.load_policy),
            seed: self.seed.or(d.seed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_size_bounds() {
        assert!(GridSize::new(3, 3).is_ok());
        assert!(GridSize::new(100, 100).is_ok());
        assert!(matches!(
            GridSize::new(2, 2),
            Err(AnalysisError::Validation(_))
        ));
        assert!(GridSize::new(5, 101).is_err());
    }

    #[test]
    fn test_grid_size_len() {
        let size = GridSize::new(5, 7).unwrap();
        assert_eq!(size.len(), 35);
        assert_eq!(size.to_string(), "5x7");
    }

    #[test]
    fn test_analysis_config_builder() {
        let config = AnalysisConfig::builder()
            .trials_per_pair(10)
            .weighting(Weighting::Covariance)
            .build();
        assert_eq!(config.trials_per_pair, 10);
        assert_eq!(config.weighting, Weighting::Covariance);
        // Check defaults
        assert!((config.error_threshold - 0.1).abs() < f64::EPSILON);
        assert_eq!(config.target_mode, TargetMode::First);
        assert!(config.encoder.sharpen);
        assert!(config.seed.is_none());
    }

    #[test]
    fn test_zero_trials_rejected() {
        let config = AnalysisConfig::builder().trials_per_pair(0).build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_defaults_validate() {
        assert!(AnalysisConfig::default().validate().is_ok());
    }
}
