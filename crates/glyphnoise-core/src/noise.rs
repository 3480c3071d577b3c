//! Additive uniform noise model.

use crate::error::{AnalysisError, Result};
use nalgebra::DVector;
use rand::Rng;
use rand_distr::{Distribution, Uniform};

/// Added to the noise energy so a zero noise vector gives a finite SNR.
pub const SNR_EPSILON: f64 = 1e-10;

/// Upper bound for the per-trial relative jitter of the noise scale.
pub const MAX_SCALE_JITTER: f64 = 0.2;

/// Reject scales that are not positive and finite.
pub fn validate_scale(scale: f64) -> Result<()> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(AnalysisError::Validation(format!(
            "noise scale must be a positive finite number, got {scale}"
        )));
    }
    Ok(())
}

/// Draw `length` independent components from `U[-0.5, 0.5)`, each multiplied by `scale`.
pub fn generate_noise<R: Rng + ?Sized>(
    length: usize,
    scale: f64,
    rng: &mut R,
) -> Result<DVector<f64>> {
    validate_scale(scale)?;
    let unit = Uniform::new(-0.5, 0.5);
    Ok(DVector::from_iterator(
        length,
        (0..length).map(|_| unit.sample(&mut *rng) * scale),
    ))
}

/// Elementwise `signal + noise`.
pub fn add_noise(signal: &DVector<f64>, noise: &DVector<f64>) -> Result<DVector<f64>> {
    if signal.len() != noise.len() {
        return Err(AnalysisError::DimensionMismatch {
            context: "add noise",
            expected: signal.len(),
            actual: noise.len(),
        });
    }
    Ok(signal + noise)
}

/// `10 * log10(sum(signal^2) / (sum(noise^2) + 1e-10))`, in decibels.
#[must_use]
pub fn signal_to_noise_ratio(signal: &DVector<f64>, noise: &DVector<f64>) -> f64 {
    let signal_power = signal.norm_squared();
    let noise_power = noise.norm_squared();
    10.0 * (signal_power / (noise_power + SNR_EPSILON)).log10()
}

/// Nominal scale perturbed by a relative factor drawn from `U[-jitter, jitter]`.
///
/// `jitter` is clamped to `[0, 0.2]`; zero returns `nominal` unchanged.
pub fn jittered_scale<R: Rng + ?Sized>(nominal: f64, jitter: f64, rng: &mut R) -> f64 {
    let jitter = jitter.clamp(0.0, MAX_SCALE_JITTER);
    if jitter == 0.0 {
        return nominal;
    }
    nominal * (1.0 + rng.gen_range(-jitter..=jitter))
}
