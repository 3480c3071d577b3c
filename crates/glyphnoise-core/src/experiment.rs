//! The experiment runner: load, pairwise analysis, Monte-Carlo trials, aggregation.
//!
//! A run walks `Idle → Loading → PairwiseAnalysis → Aggregating → [Reporting →] Done`.
//! Validation, load (under [`LoadPolicy::Abort`]), reporting and cancellation
//! failures move it to `Failed`; a failure inside one pair is recorded on that
//! pair and the run carries on.
//!
//! Pair `(i, j)` fits `b = v_i` against `A = [v_i | v_j]`. The noise-free
//! solution is the reference; each trial perturbs `v_i`, re-solves with the same
//! `A`, and counts an error when the solution moves further than
//! [`AnalysisConfig::error_threshold`].

use crate::config::{
    AnalysisConfig, AngleBasis, GridSize, LoadPolicy, TargetMode, Weighting, MAX_COVARIANCE_PIXELS,
};
use crate::encoder::{self, EncodedGlyph, ImageVector};
use crate::error::{AnalysisError, Result};
use crate::linalg::{self, PreparedSystem, WeightInverse};
use crate::noise;
use crate::progress::{CancellationToken, ProgressEvent, ProgressSink, RunPhase};
use crate::report::ReportRenderer;
use nalgebra::DMatrix;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::path::Path;

/// One Monte-Carlo trial.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Experiment {
    /// Noise scale actually applied (nominal scale, possibly jittered).
    pub noise_level: f64,
    /// Signal-to-noise ratio of the perturbed target, in decibels.
    /// `None` when the target carries no signal (the ratio is `-inf`).
    pub snr_db: Option<f64>,
    /// Whether the noisy solution diverged from the reference.
    pub error_occurred: bool,
}

/// Everything computed for one unordered pair of glyphs.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PairAnalysis {
    /// Index of the first glyph (always the smaller index).
    pub first: usize,
    /// Index of the second glyph.
    pub second: usize,
    /// Angle between the two glyph vectors, in degrees.
    pub angle_degrees: f64,
    /// Noise-free least-squares solution for the (first) target.
    pub reference_solution: Option<ImageVector>,
    /// `||A x_ref - b||` of the reference fit.
    pub residual: Option<f64>,
    /// Fraction of trials that diverged.
    pub error_rate: Option<f64>,
    /// Mean SNR over this pair's trials that have one, in decibels.
    pub average_snr_db: Option<f64>,
    /// Per-trial records, in execution order.
    pub experiments: Vec<Experiment>,
    /// Set when the pair failed; the other optional fields are then `None`.
    pub error: Option<String>,
}

impl PairAnalysis {
    /// Whether the pair completed its trials.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Number of diverged trials.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.experiments.iter().filter(|e| e.error_occurred).count()
    }
}

/// Input parameters of a run, as recorded in the bundle.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RunParameters {
    /// Number of glyphs that entered the pairwise phase.
    pub image_count: usize,
    /// Target grid.
    pub grid_size: GridSize,
    /// Nominal noise scale.
    pub noise_scale: f64,
    /// Trials per pair and direction.
    pub trials_per_pair: usize,
    /// Solution-distance error threshold.
    pub error_threshold: f64,
    /// Least-squares weighting.
    pub weighting: Weighting,
    /// Target selection.
    pub target_mode: TargetMode,
    /// Completion time, RFC 3339 in UTC.
    pub timestamp: String,
}

/// Rolled-up figures across all pairs.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Statistics {
    /// Angle of every pair, in pair order.
    pub angles: Vec<f64>,
    /// SNR of every trial that has one, pair by pair.
    pub snr_values: Vec<f64>,
    /// Error rate of every successful pair.
    pub error_rates: Vec<f64>,
    /// Mean of `snr_values`.
    pub mean_snr_db: Option<f64>,
    /// Total diverged trials over total trials.
    pub overall_error_rate: Option<f64>,
    /// Number of pairs carrying an error annotation.
    pub failed_pairs: usize,
}

impl Statistics {
    fn collect(pairs: &[PairAnalysis]) -> Self {
        let angles = pairs.iter().map(|p| p.angle_degrees).collect();
        let snr_values: Vec<f64> = pairs
            .iter()
            .flat_map(|p| p.experiments.iter().filter_map(|e| e.snr_db))
            .collect();
        let error_rates = pairs.iter().filter_map(|p| p.error_rate).collect();

        let trials: usize = pairs.iter().map(|p| p.experiments.len()).sum();
        let errors: usize = pairs.iter().map(PairAnalysis::error_count).sum();

        Self {
            angles,
            mean_snr_db: mean(&snr_values),
            snr_values,
            error_rates,
            overall_error_rate: (trials > 0).then(|| errors as f64 / trials as f64),
            failed_pairs: pairs.iter().filter(|p| !p.is_ok()).count(),
        }
    }
}

/// The complete output of one run, handed by value to reporting.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResultsBundle {
    /// Input parameters.
    pub parameters: RunParameters,
    /// Encoded glyphs; pair indices refer to positions in this list.
    pub images: Vec<EncodedGlyph>,
    /// One entry per unordered pair `(i, j)`, `i < j`, in lexicographic order.
    pub pairs: Vec<PairAnalysis>,
    /// Aggregates.
    pub statistics: Statistics,
}

impl ResultsBundle {
    /// Look up a pair regardless of argument order.
    #[must_use]
    pub fn pair(&self, a: usize, b: usize) -> Option<&PairAnalysis> {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        self.pairs
            .iter()
            .find(|p| p.first == first && p.second == second)
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

/// Outcome of the trials for one target direction.
struct DirectionOutcome {
    reference: ImageVector,
    residual: f64,
    experiments: Vec<Experiment>,
}

/// Drives a full analysis. Holds only immutable configuration, so one runner
/// can serve many runs.
#[derive(Clone, Debug, Default)]
pub struct ExperimentRunner {
    config: AnalysisConfig,
    cancel: Option<CancellationToken>,
}

impl ExperimentRunner {
    /// Runner with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner with custom configuration.
    #[must_use]
    pub fn with_config(config: AnalysisConfig) -> Self {
        Self {
            config,
            cancel: None,
        }
    }

    /// Observe `token` between pairs.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Encode `paths` and analyze every pair.
    ///
    /// `noise_scale` defaults to [`AnalysisConfig::DEFAULT_NOISE_SCALE`].
    pub fn run<P: AsRef<Path>>(
        &self,
        paths: &[P],
        grid_size: GridSize,
        noise_scale: Option<f64>,
        sink: &mut dyn ProgressSink,
    ) -> Result<ResultsBundle> {
        let bundle = self.guarded(sink, |runner, sink| {
            runner.execute(paths, grid_size, noise_scale, sink)
        })?;
        sink.emit(ProgressEvent::Phase(RunPhase::Done));
        Ok(bundle)
    }

    /// Analyze glyphs that were encoded elsewhere.
    pub fn run_encoded(
        &self,
        glyphs: Vec<EncodedGlyph>,
        grid_size: GridSize,
        noise_scale: Option<f64>,
        sink: &mut dyn ProgressSink,
    ) -> Result<ResultsBundle> {
        let bundle = self.guarded(sink, |runner, sink| {
            let scale = runner.validate(glyphs.len(), grid_size, noise_scale)?;
            runner.analyze(glyphs, grid_size, scale, sink)
        })?;
        sink.emit(ProgressEvent::Phase(RunPhase::Done));
        Ok(bundle)
    }

    /// Run, then render the bundle to `output` with `renderer`.
    ///
    /// A rendering failure is fatal and leaves no artifact at `output`.
    pub fn run_and_report<P: AsRef<Path>>(
        &self,
        paths: &[P],
        grid_size: GridSize,
        noise_scale: Option<f64>,
        sink: &mut dyn ProgressSink,
        renderer: &dyn ReportRenderer,
        output: &Path,
    ) -> Result<ResultsBundle> {
        let bundle = self.guarded(sink, |runner, sink| {
            let bundle = runner.execute(paths, grid_size, noise_scale, sink)?;
            sink.emit(ProgressEvent::Phase(RunPhase::Reporting));
            let _span = tracing::info_span!("reporting", path = %output.display()).entered();
            crate::report::write_report(renderer, &bundle, output)?;
            Ok(bundle)
        })?;
        sink.emit(ProgressEvent::Phase(RunPhase::Done));
        Ok(bundle)
    }

    /// Run `body`, emitting `Failed` if it returns an error.
    fn guarded<T>(
        &self,
        sink: &mut dyn ProgressSink,
        body: impl FnOnce(&Self, &mut dyn ProgressSink) -> Result<T>,
    ) -> Result<T> {
        sink.emit(ProgressEvent::Phase(RunPhase::Idle));
        body(self, sink).inspect_err(|err| {
            tracing::error!(error = %err, "analysis failed");
            sink.emit(ProgressEvent::Phase(RunPhase::Failed));
        })
    }

    fn execute<P: AsRef<Path>>(
        &self,
        paths: &[P],
        grid_size: GridSize,
        noise_scale: Option<f64>,
        sink: &mut dyn ProgressSink,
    ) -> Result<ResultsBundle> {
        let scale = self.validate(paths.len(), grid_size, noise_scale)?;
        let glyphs = self.load(paths, grid_size, sink)?;
        self.analyze(glyphs, grid_size, scale, sink)
    }

    /// Check everything that can be checked before touching any image.
    fn validate(
        &self,
        image_count: usize,
        grid_size: GridSize,
        noise_scale: Option<f64>,
    ) -> Result<f64> {
        self.config.validate()?;
        grid_size.validate()?;
        if self.config.weighting == Weighting::Covariance && grid_size.len() > MAX_COVARIANCE_PIXELS {
            return Err(AnalysisError::Validation(format!(
                "covariance weighting supports at most {MAX_COVARIANCE_PIXELS} pixels, grid {grid_size} has {}",
                grid_size.len(),
            )));
        }
        if image_count < 2 {
            return Err(AnalysisError::Validation(format!(
                "at least 2 images are required, got {image_count}"
            )));
        }
        let scale = noise_scale.unwrap_or(AnalysisConfig::DEFAULT_NOISE_SCALE);
        noise::validate_scale(scale)?;
        Ok(scale)
    }

    fn load<P: AsRef<Path>>(
        &self,
        paths: &[P],
        grid_size: GridSize,
        sink: &mut dyn ProgressSink,
    ) -> Result<Vec<EncodedGlyph>> {
        sink.emit(ProgressEvent::Phase(RunPhase::Loading));
        let _span = tracing::info_span!("load_glyphs", count = paths.len()).entered();

        let mut glyphs = Vec::with_capacity(paths.len());
        for (index, path) in paths.iter().enumerate() {
            let path = path.as_ref();
            match encoder::encode_with_config(path, grid_size, &self.config.encoder) {
                Ok(glyph) => {
                    sink.emit(ProgressEvent::ImageLoaded {
                        index,
                        path: path.to_path_buf(),
                        ink_pixels: glyph.matrix.ink_count(),
                    });
                    glyphs.push(glyph);
                }
                Err(err) if self.config.load_policy == LoadPolicy::Skip => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping image");
                    sink.emit(ProgressEvent::ImageSkipped {
                        index,
                        path: path.to_path_buf(),
                        reason: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }

        if glyphs.len() < 2 {
            return Err(AnalysisError::Validation(format!(
                "at least 2 valid images are required, {} loaded",
                glyphs.len()
            )));
        }
        Ok(glyphs)
    }

    fn analyze(
        &self,
        glyphs: Vec<EncodedGlyph>,
        grid_size: GridSize,
        scale: f64,
        sink: &mut dyn ProgressSink,
    ) -> Result<ResultsBundle> {
        if glyphs.len() < 2 {
            return Err(AnalysisError::Validation(format!(
                "at least 2 images are required, got {}",
                glyphs.len()
            )));
        }
        for glyph in &glyphs {
            if glyph.vector.len() != grid_size.len() {
                return Err(AnalysisError::DimensionMismatch {
                    context: "glyph vector",
                    expected: grid_size.len(),
                    actual: glyph.vector.len(),
                });
            }
        }

        sink.emit(ProgressEvent::Phase(RunPhase::PairwiseAnalysis));
        let pairs = {
            let _span = tracing::info_span!("pairwise_analysis", glyphs = glyphs.len()).entered();
            self.analyze_pairs(&glyphs, scale, sink)?
        };

        sink.emit(ProgressEvent::Phase(RunPhase::Aggregating));
        let statistics = Statistics::collect(&pairs);
        sink.emit(ProgressEvent::Summary {
            pairs: pairs.len(),
            mean_snr_db: statistics.mean_snr_db,
            overall_error_rate: statistics.overall_error_rate,
        });

        Ok(ResultsBundle {
            parameters: RunParameters {
                image_count: glyphs.len(),
                grid_size,
                noise_scale: scale,
                trials_per_pair: self.config.trials_per_pair,
                error_threshold: self.config.error_threshold,
                weighting: self.config.weighting,
                target_mode: self.config.target_mode,
                timestamp: chrono::Utc::now().to_rfc3339(),
            },
            images: glyphs,
            pairs,
            statistics,
        })
    }

    fn analyze_pairs(
        &self,
        glyphs: &[EncodedGlyph],
        scale: f64,
        sink: &mut dyn ProgressSink,
    ) -> Result<Vec<PairAnalysis>> {
        let weight = match self.config.weighting {
            Weighting::Ordinary => None,
            Weighting::Covariance => {
                // Non-finite glyphs fail their own pairs; they stay out of the weight.
                let vectors: Vec<ImageVector> = glyphs
                    .iter()
                    .map(|g| &g.vector)
                    .filter(|v| v.iter().all(|x| x.is_finite()))
                    .cloned()
                    .collect();
                if vectors.len() < 2 {
                    // Every pair contains a non-finite glyph and fails before solving.
                    None
                } else {
                    let covariance = linalg::covariance_matrix(&vectors)?;
                    Some(WeightInverse::new(&covariance)?)
                }
            }
        };

        let mut rng = match self.config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        let n = glyphs.len();
        let mut pairs = Vec::with_capacity(n * (n - 1) / 2);
        for first in 0..n {
            for second in (first + 1)..n {
                if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
                    tracing::info!(completed = pairs.len(), "analysis cancelled");
                    return Err(AnalysisError::Cancelled);
                }

                let pair = self.analyze_pair(
                    first,
                    second,
                    &glyphs[first].vector,
                    &glyphs[second].vector,
                    weight.as_ref(),
                    scale,
                    &mut rng,
                )?;

                match (&pair.error, pair.error_rate) {
                    (None, Some(error_rate)) => sink.emit(ProgressEvent::PairCompleted {
                        first,
                        second,
                        angle_degrees: pair.angle_degrees,
                        error_rate,
                    }),
                    (Some(reason), _) => sink.emit(ProgressEvent::PairFailed {
                        first,
                        second,
                        reason: reason.clone(),
                    }),
                    (None, None) => {}
                }
                pairs.push(pair);
            }
        }
        Ok(pairs)
    }

    /// Angle plus trials for one pair. Only a dimension mismatch is fatal;
    /// any other failure becomes the pair's error annotation.
    #[allow(clippy::too_many_arguments)]
    fn analyze_pair<R: Rng>(
        &self,
        first: usize,
        second: usize,
        v_first: &ImageVector,
        v_second: &ImageVector,
        weight: Option<&WeightInverse>,
        scale: f64,
        rng: &mut R,
    ) -> Result<PairAnalysis> {
        let angle_degrees = match self.config.angle_basis {
            AngleBasis::Binary => linalg::cosine_angle(v_first, v_second)?,
            AngleBasis::Signed => {
                let signed = |v: &ImageVector| v.map(|x| 2.0 * x - 1.0);
                linalg::cosine_angle(&signed(v_first), &signed(v_second))?
            }
        };

        let trials = self.run_pair_trials(v_first, v_second, weight, scale, rng);
        let pair = match trials {
            Ok(directions) => {
                let residual = directions.iter().map(|d| d.residual).sum::<f64>()
                    / directions.len() as f64;
                let mut experiments = Vec::new();
                let mut reference = None;
                for direction in directions {
                    reference.get_or_insert(direction.reference);
                    experiments.extend(direction.experiments);
                }
                let errors = experiments.iter().filter(|e| e.error_occurred).count();
                let snrs: Vec<f64> = experiments.iter().filter_map(|e| e.snr_db).collect();
                let error_rate = errors as f64 / experiments.len() as f64;

                tracing::debug!(first, second, angle_degrees, error_rate, "pair complete");
                PairAnalysis {
                    first,
                    second,
                    angle_degrees,
                    reference_solution: reference,
                    residual: Some(residual),
                    error_rate: Some(error_rate),
                    average_snr_db: mean(&snrs),
                    experiments,
                    error: None,
                }
            }
            Err(err) => {
                let err = AnalysisError::Pair {
                    first,
                    second,
                    reason: err.to_string(),
                };
                tracing::warn!(error = %err, "pair failed");
                PairAnalysis {
                    first,
                    second,
                    angle_degrees,
                    reference_solution: None,
                    residual: None,
                    error_rate: None,
                    average_snr_db: None,
                    experiments: Vec::new(),
                    error: Some(err.to_string()),
                }
            }
        };
        Ok(pair)
    }

    fn run_pair_trials<R: Rng>(
        &self,
        v_first: &ImageVector,
        v_second: &ImageVector,
        weight: Option<&WeightInverse>,
        scale: f64,
        rng: &mut R,
    ) -> Result<Vec<DirectionOutcome>> {
        if v_first.iter().chain(v_second.iter()).any(|x| !x.is_finite()) {
            return Err(AnalysisError::Solver("glyph vector has non-finite values".into()));
        }

        let a = DMatrix::from_columns(&[v_first.clone(), v_second.clone()]);
        let system = match weight {
            None => PreparedSystem::ordinary(&a)?,
            Some(w) => PreparedSystem::weighted(&a, w)?,
        };

        let mut directions = vec![self.run_direction(&system, &a, v_first, scale, rng)?];
        if self.config.target_mode == TargetMode::Both {
            directions.push(self.run_direction(&system, &a, v_second, scale, rng)?);
        }
        Ok(directions)
    }

    fn run_direction<R: Rng>(
        &self,
        system: &PreparedSystem,
        a: &DMatrix<f64>,
        target: &ImageVector,
        scale: f64,
        rng: &mut R,
    ) -> Result<DirectionOutcome> {
        let reference = system.solve(target)?;
        let residual = linalg::residual_norm(a, &reference, target)?;

        let mut experiments = Vec::with_capacity(self.config.trials_per_pair);
        for _ in 0..self.config.trials_per_pair {
            let level = noise::jittered_scale(scale, self.config.scale_jitter, rng);
            let perturbation = noise::generate_noise(target.len(), level, rng)?;
            let noisy = noise::add_noise(target, &perturbation)?;
            let solution = system.solve(&noisy)?;

            experiments.push(Experiment {
                noise_level: level,
                snr_db: Some(noise::signal_to_noise_ratio(target, &perturbation))
                    .filter(|snr| snr.is_finite()),
                error_occurred: linalg::error_occurred(
                    &reference,
                    &solution,
                    self.config.error_threshold,
                ),
            });
        }

        Ok(DirectionOutcome {
            reference,
            residual,
            experiments,
        })
    }
}
