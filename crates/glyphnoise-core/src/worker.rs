//! Run an analysis off the calling thread.
//!
//! A front end hands an [`AnalysisJob`] to [`spawn_analysis`] and keeps its own
//! thread free: progress arrives on a channel, cancellation goes through a
//! shared token, and the bundle is collected with [`AnalysisHandle::join`].

use crate::config::{AnalysisConfig, GridSize};
use crate::error::{AnalysisError, Result};
use crate::experiment::{ExperimentRunner, ResultsBundle};
use crate::progress::{CancellationToken, ProgressEvent};
use crate::report::ReportFormat;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, TryIter};
use std::thread::{self, JoinHandle};

/// Everything a background run needs, owned so it can move to the worker.
#[derive(Clone, Debug)]
pub struct AnalysisJob {
    /// Input images.
    pub paths: Vec<PathBuf>,
    /// Target grid.
    pub grid_size: GridSize,
    /// Nominal noise scale; `None` uses the default.
    pub noise_scale: Option<f64>,
    /// Runner configuration.
    pub config: AnalysisConfig,
    /// Optional report artifact to write after the run.
    pub report: Option<(ReportFormat, PathBuf)>,
}

impl AnalysisJob {
    /// Job with default configuration and no report.
    #[must_use]
    pub fn new(paths: Vec<PathBuf>, grid_size: GridSize) -> Self {
        Self {
            paths,
            grid_size,
            noise_scale: None,
            config: AnalysisConfig::default(),
            report: None,
        }
    }
}

/// Handle to a running background analysis.
pub struct AnalysisHandle {
    events: Receiver<ProgressEvent>,
    cancel: CancellationToken,
    thread: JoinHandle<Result<ResultsBundle>>,
}

impl AnalysisHandle {
    /// Progress channel; blocks on `recv`, so UI loops should prefer [`Self::pending_events`].
    #[must_use]
    pub fn events(&self) -> &Receiver<ProgressEvent> {
        &self.events
    }

    /// Events already delivered, without blocking.
    pub fn pending_events(&self) -> TryIter<'_, ProgressEvent> {
        self.events.try_iter()
    }

    /// Ask the worker to stop at the next pair boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the worker has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the worker and take its result.
    pub fn join(self) -> Result<ResultsBundle> {
        self.thread
            .join()
            .map_err(|_| AnalysisError::Worker("analysis thread panicked".into()))?
    }
}

/// Start `job` on a dedicated thread.
pub fn spawn_analysis(job: AnalysisJob) -> Result<AnalysisHandle> {
    let (tx, rx) = mpsc::channel();
    let cancel = CancellationToken::new();
    let runner = ExperimentRunner::with_config(job.config).with_cancellation(cancel.clone());

    let thread = thread::Builder::new()
        .name("glyphnoise-analysis".into())
        .spawn(move || {
            let mut sink = tx;
            match job.report {
                Some((format, output)) => runner.run_and_report(
                    &job.paths,
                    job.grid_size,
                    job.noise_scale,
                    &mut sink,
                    format.renderer().as_ref(),
                    &output,
                ),
                None => runner.run(&job.paths, job.grid_size, job.noise_scale, &mut sink),
            }
        })
        .map_err(|e| AnalysisError::Worker(e.to_string()))?;

    Ok(AnalysisHandle {
        events: rx,
        cancel,
        thread,
    })
}
