//! Reporting collaborators that render a [`ResultsBundle`] into an artifact.
//!
//! Renderers only format; [`write_report`] owns the artifact lifecycle and
//! removes a partially written file when rendering fails.

use crate::error::{AnalysisError, Result};
use crate::experiment::ResultsBundle;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Formats a bundle into a byte stream.
pub trait ReportRenderer {
    /// Short format name, used in diagnostics.
    fn name(&self) -> &'static str;

    /// Write the whole report to `out`.
    fn render(&self, bundle: &ResultsBundle, out: &mut dyn Write) -> io::Result<()>;
}

/// Render `bundle` to the file at `path`.
///
/// On failure the file is deleted, so no partial report is left behind.
pub fn write_report(renderer: &dyn ReportRenderer, bundle: &ResultsBundle, path: &Path) -> Result<()> {
    let reporting_error = |reason: String| AnalysisError::Reporting {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::create(path).map_err(|e| reporting_error(e.to_string()))?;
    let mut writer = BufWriter::new(file);
    let written = renderer
        .render(bundle, &mut writer)
        .and_then(|()| writer.flush());

    if let Err(err) = written {
        drop(writer);
        if let Err(remove_err) = std::fs::remove_file(path) {
            tracing::warn!(path = %path.display(), error = %remove_err, "could not remove partial report");
        }
        return Err(reporting_error(format!("{} renderer: {err}", renderer.name())));
    }
    tracing::info!(path = %path.display(), format = renderer.name(), "report written");
    Ok(())
}

/// Built-in report formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReportFormat {
    /// Full bundle as JSON.
    #[cfg(feature = "serde")]
    Json,
    /// One CSV row per pair.
    Csv,
    /// Human-readable text summary.
    Text,
}

impl ReportFormat {
    /// The renderer for this format.
    #[must_use]
    pub fn renderer(self) -> Box<dyn ReportRenderer + Send + Sync> {
        match self {
            #[cfg(feature = "serde")]
            Self::Json => Box::new(JsonReport::default()),
            Self::Csv => Box::new(CsvReport),
            Self::Text => Box::new(TextReport),
        }
    }
}

/// Serializes the complete bundle (glyph matrices and vectors included).
#[cfg(feature = "serde")]
#[derive(Clone, Copy, Debug)]
pub struct JsonReport {
    /// Indent the output.
    pub pretty: bool,
}

#[cfg(feature = "serde")]
impl Default for JsonReport {
    fn default() -> Self {
        Self { pretty: true }
    }
}

#[cfg(feature = "serde")]
impl ReportRenderer for JsonReport {
    fn name(&self) -> &'static str {
        "json"
    }

    fn render(&self, bundle: &ResultsBundle, out: &mut dyn Write) -> io::Result<()> {
        if self.pretty {
            serde_json::to_writer_pretty(&mut *out, bundle)?;
        } else {
            serde_json::to_writer(&mut *out, bundle)?;
        }
        out.write_all(b"\n")
    }
}

/// Per-pair table.
#[derive(Clone, Copy, Debug, Default)]
pub struct CsvReport;

fn optional(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

impl ReportRenderer for CsvReport {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn render(&self, bundle: &ResultsBundle, out: &mut dyn Write) -> io::Result<()> {
        let mut wtr = csv::Writer::from_writer(out);
        wtr.write_record([
            "first",
            "second",
            "first_path",
            "second_path",
            "angle_degrees",
            "residual",
            "error_rate",
            "average_snr_db",
            "trials",
            "error",
        ])?;

        let path_of = |i: usize| {
            bundle
                .images
                .get(i)
                .map(|g| g.path.display().to_string())
                .unwrap_or_default()
        };

        for pair in &bundle.pairs {
            wtr.write_record([
                pair.first.to_string(),
                pair.second.to_string(),
                path_of(pair.first),
                path_of(pair.second),
                pair.angle_degrees.to_string(),
                optional(pair.residual),
                optional(pair.error_rate),
                optional(pair.average_snr_db),
                pair.experiments.len().to_string(),
                pair.error.clone().unwrap_or_default(),
            ])?;
        }
        wtr.flush()
    }
}

/// Plain-text summary in the spirit of a console log.
#[derive(Clone, Copy, Debug, Default)]
pub struct TextReport;

impl ReportRenderer for TextReport {
    fn name(&self) -> &'static str {
        "text"
    }

    fn render(&self, bundle: &ResultsBundle, out: &mut dyn Write) -> io::Result<()> {
        let p = &bundle.parameters;
        writeln!(out, "Glyph noise robustness report ({})", p.timestamp)?;
        writeln!(out, "Grid size: {} pixels", p.grid_size)?;
        writeln!(out, "Images: {}", p.image_count)?;
        writeln!(out, "Noise scale: {}", p.noise_scale)?;
        writeln!(out, "Trials per pair: {}", p.trials_per_pair)?;
        writeln!(out)?;

        for (i, glyph) in bundle.images.iter().enumerate() {
            writeln!(out, "{}. {}", i + 1, glyph.path.display())?;
            for row in glyph.matrix.rows() {
                let line: String = row.iter().map(|&c| if c == 1 { '#' } else { '.' }).collect();
                writeln!(out, "   {line}")?;
            }
        }
        writeln!(out)?;

        for pair in &bundle.pairs {
            write!(
                out,
                "Glyphs {} and {}: angle {:.2}°",
                pair.first + 1,
                pair.second + 1,
                pair.angle_degrees
            )?;
            match (&pair.error, pair.error_rate, pair.average_snr_db) {
                (Some(reason), _, _) => writeln!(out, ", FAILED: {reason}")?,
                (None, Some(rate), Some(snr)) => writeln!(
                    out,
                    ", error rate {:.2}%, mean SNR {snr:.2} dB",
                    rate * 100.0
                )?,
                _ => writeln!(out)?,
            }
        }
        writeln!(out)?;

        let s = &bundle.statistics;
        if let Some(snr) = s.mean_snr_db {
            writeln!(out, "Mean SNR: {snr:.2} dB")?;
        }
        if let Some(rate) = s.overall_error_rate {
            writeln!(out, "Overall error probability: {:.2}%", rate * 100.0)?;
        }
        if s.failed_pairs > 0 {
            writeln!(out, "Failed pairs: {}", s.failed_pairs)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AnalysisConfig, GridSize};
    use crate::encoder::EncodedGlyph;
    use crate::experiment::ExperimentRunner;
    use crate::image::ImageMatrix;
    use crate::progress::NullSink;

    fn bundle() -> ResultsBundle {
        let glyphs = vec![
            EncodedGlyph::from_matrix(
                "a.png",
                ImageMatrix::from_row_major(3, 3, vec![1, 1, 1, 0, 1, 0, 0, 1, 0]).unwrap(),
            ),
            EncodedGlyph::from_matrix(
                "b.png",
                ImageMatrix::from_row_major(3, 3, vec![1, 0, 1, 1, 0, 1, 1, 1, 1]).unwrap(),
            ),
        ];
        ExperimentRunner::with_config(AnalysisConfig::builder().trials_per_pair(4).seed(3).build())
            .run_encoded(glyphs, GridSize::new(3, 3).unwrap(), Some(1.0), &mut NullSink)
            .unwrap()
    }

    /// Fails after the first write, leaving a partial artifact behind.
    struct FailingReport;

    impl ReportRenderer for FailingReport {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn render(&self, _bundle: &ResultsBundle, out: &mut dyn Write) -> io::Result<()> {
            out.write_all(b"partial")?;
            Err(io::Error::other("disk full"))
        }
    }

    #[test]
    fn test_failed_render_removes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");
        let err = write_report(&FailingReport, &bundle(), &path).unwrap_err();
        assert!(matches!(err, AnalysisError::Reporting { .. }));
        assert!(err.to_string().contains("disk full"));
        assert!(!path.exists());
    }

    #[test]
    fn test_csv_has_one_row_per_pair() {
        let mut buf = Vec::new();
        CsvReport.render(&bundle(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("first,second,first_path"));
        assert!(lines[1].starts_with("0,1,a.png,b.png,"));
    }

    #[test]
    fn test_text_report_draws_glyphs() {
        let mut buf = Vec::new();
        TextReport.render(&bundle(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("Grid size: 3x3 pixels"));
        assert!(text.contains("   ###"));
        assert!(text.contains("Glyphs 1 and 2: angle"));
        assert!(text.contains("Overall error probability"));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_json_round_trips_parameters() {
        let original = bundle();
        let mut buf = Vec::new();
        JsonReport::default().render(&original, &mut buf).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(parsed["parameters"]["image_count"], 2);
        assert_eq!(parsed["parameters"]["trials_per_pair"], 4);
        assert_eq!(parsed["pairs"].as_array().unwrap().len(), 1);
        assert_eq!(parsed["statistics"]["snr_values"].as_array().unwrap().len(), 4);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_json_parses_back_into_bundle_with_blank_target() {
        let glyphs = vec![
            EncodedGlyph::from_matrix("blank.png", ImageMatrix::from_row_major(3, 3, vec![0; 9]).unwrap()),
            EncodedGlyph::from_matrix("ink.png", ImageMatrix::from_row_major(3, 3, vec![1; 9]).unwrap()),
            EncodedGlyph::from_matrix(
                "x.png",
                ImageMatrix::from_row_major(3, 3, vec![1, 0, 1, 0, 1, 0, 1, 0, 1]).unwrap(),
            ),
        ];
        let original =
            ExperimentRunner::with_config(AnalysisConfig::builder().trials_per_pair(6).seed(5).build())
                .run_encoded(glyphs, GridSize::new(3, 3).unwrap(), Some(1.0), &mut NullSink)
                .unwrap();

        let mut buf = Vec::new();
        JsonReport::default().render(&original, &mut buf).unwrap();
        let parsed: ResultsBundle = serde_json::from_slice(&buf).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_write_report_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pairs.csv");
        write_report(&CsvReport, &bundle(), &path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written.lines().count(), 2);
    }
}
