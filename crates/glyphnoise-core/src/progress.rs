//! Progress events emitted by the runner, and the sinks that receive them.
//!
//! The runner never assumes a threading model: it pushes [`ProgressEvent`]s
//! into whatever [`ProgressSink`] the caller supplies. A `Vec` collects them,
//! an `mpsc::Sender` forwards them to another thread, and [`NullSink`] drops
//! them. A sink that can no longer deliver (e.g. a dropped receiver) is
//! silently ignored.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

/// Lifecycle of one analysis run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RunPhase {
    /// Nothing started yet.
    Idle,
    /// Encoding input images.
    Loading,
    /// Angles, reference fits and noisy trials per pair.
    PairwiseAnalysis,
    /// Rolling per-pair results into run statistics.
    Aggregating,
    /// Handing the bundle to a report renderer.
    Reporting,
    /// Finished successfully.
    Done,
    /// Aborted by a fatal error or cancellation.
    Failed,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::PairwiseAnalysis => "pairwise analysis",
            Self::Aggregating => "aggregating",
            Self::Reporting => "reporting",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One incremental notification from a run.
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
    /// The run entered a new phase.
    Phase(RunPhase),
    /// An input image was encoded.
    ImageLoaded {
        /// Position in the input list.
        index: usize,
        /// Image path.
        path: PathBuf,
        /// Number of ink cells in the encoded grid.
        ink_pixels: usize,
    },
    /// An input image failed to load and was skipped.
    ImageSkipped {
        /// Position in the input list.
        index: usize,
        /// Image path.
        path: PathBuf,
        /// Load error text.
        reason: String,
    },
    /// A pair finished its trials.
    PairCompleted {
        /// Index of the first glyph.
        first: usize,
        /// Index of the second glyph.
        second: usize,
        /// Angle between the glyph vectors, in degrees.
        angle_degrees: f64,
        /// Fraction of trials whose solution diverged.
        error_rate: f64,
    },
    /// A pair failed; the run continues.
    PairFailed {
        /// Index of the first glyph.
        first: usize,
        /// Index of the second glyph.
        second: usize,
        /// Pair error text.
        reason: String,
    },
    /// Aggregated figures for the whole run.
    Summary {
        /// Number of analyzed pairs.
        pairs: usize,
        /// Mean SNR over every trial, in decibels.
        mean_snr_db: Option<f64>,
        /// Errors over trials, across all successful pairs.
        overall_error_rate: Option<f64>,
    },
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Phase(phase) => write!(f, "phase: {phase}"),
            Self::ImageLoaded {
                index,
                path,
                ink_pixels,
            } => write!(
                f,
                "{}. {} loaded ({ink_pixels} ink pixels)",
                index + 1,
                path.display()
            ),
            Self::ImageSkipped {
                index,
                path,
                reason,
            } => write!(f, "{}. {} skipped: {reason}", index + 1, path.display()),
            Self::PairCompleted {
                first,
                second,
                angle_degrees,
                error_rate,
            } => write!(
                f,
                "glyphs {} and {}: angle {angle_degrees:.2}°, error rate {:.2}%",
                first + 1,
                second + 1,
                error_rate * 100.0
            ),
            Self::PairFailed {
                first,
                second,
                reason,
            } => write!(f, "glyphs {} and {} failed: {reason}", first + 1, second + 1),
            Self::Summary {
                pairs,
                mean_snr_db,
                overall_error_rate,
            } => {
                write!(f, "{pairs} pairs")?;
                if let Some(snr) = mean_snr_db {
                    write!(f, ", mean SNR {snr:.2} dB")?;
                }
                if let Some(rate) = overall_error_rate {
                    write!(f, ", overall error rate {:.2}%", rate * 100.0)?;
                }
                Ok(())
            }
        }
    }
}

/// Receiver of progress events.
pub trait ProgressSink {
    /// Deliver one event. Must not panic when the consumer has gone away.
    fn emit(&mut self, event: ProgressEvent);
}

/// Drops every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&mut self, _event: ProgressEvent) {}
}

impl ProgressSink for Vec<ProgressEvent> {
    fn emit(&mut self, event: ProgressEvent) {
        self.push(event);
    }
}

impl ProgressSink for mpsc::Sender<ProgressEvent> {
    fn emit(&mut self, event: ProgressEvent) {
        // A dropped receiver only means nobody is listening any more.
        let _ = self.send(event);
    }
}

/// Adapts a closure into a sink, e.g. to append text to a log view.
pub struct FnSink<F>(pub F);

impl<F: FnMut(ProgressEvent)> ProgressSink for FnSink<F> {
    fn emit(&mut self, event: ProgressEvent) {
        (self.0)(event);
    }
}

/// Cooperative cancellation flag, checked by the runner between pairs.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// A fresh, un-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Every clone observes it.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
