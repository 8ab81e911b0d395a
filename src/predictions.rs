use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::runner::BatchPlan;

/// Output format for the prediction report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
    Csv,
}

/// One line of an evaluator prediction file. Extra fields such as
/// `filename` or `PER` are ignored.
#[derive(Debug, Deserialize)]
struct PredictionLine {
    prediction: Value,
    label: Value,
}

/// Error totals for one dataset of a model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetScore {
    pub label: String,
    /// File the scores were read from, `None` if no prediction file exists
    pub file: Option<String>,
    pub samples: usize,
    pub distance: usize,
    pub length: usize,
}

impl DatasetScore {
    /// Phoneme error rate: total edit distance over total label length.
    pub fn per(&self) -> Option<f64> {
        if self.file.is_none() || self.length == 0 {
            return None;
        }
        Some(self.distance as f64 / self.length as f64)
    }
}

/// Labels and predictions are token lists; plain strings are split on
/// whitespace.
fn tokens(value: &Value) -> Result<Vec<String>> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                other => Ok(other.to_string()),
            })
            .collect(),
        Value::String(s) => {
            Ok(s.split_whitespace().map(str::to_string).collect())
        }
        other => Err(anyhow::anyhow!("Expected a token list, got {}", other)),
    }
}

/// Find the prediction file the evaluator wrote for `output_path`.
///
/// The evaluator appends `_pred.json` (or `_pred-fn.json` when filenames
/// are included) to the path it was given, so those are tried after the
/// path itself.
pub fn locate_predictions(output_path: &str) -> Option<PathBuf> {
    [
        output_path.to_string(),
        format!("{}_pred.json", output_path),
        format!("{}_pred-fn.json", output_path),
    ]
    .into_iter()
    .map(PathBuf::from)
    .find(|p| p.is_file())
}

/// Sum edit distance and label length over every line of a prediction file.
pub fn score_file(path: &Path) -> Result<(usize, usize, usize)> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut samples = 0;
    let mut distance = 0;
    let mut length = 0;
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let parsed: PredictionLine = serde_json::from_str(&line)
            .with_context(|| {
                format!("Malformed prediction at {}:{}", path.display(), i + 1)
            })?;
        let label = tokens(&parsed.label).with_context(|| {
            format!("Bad label at {}:{}", path.display(), i + 1)
        })?;
        let prediction = tokens(&parsed.prediction).with_context(|| {
            format!("Bad prediction at {}:{}", path.display(), i + 1)
        })?;

        samples += 1;
        distance += strsim::generic_levenshtein(&label, &prediction);
        length += label.len();
    }

    debug!(
        "Scored {}: {} samples, distance {}, length {}",
        path.display(),
        samples,
        distance,
        length
    );
    Ok((samples, distance, length))
}

/// Score every dataset of `plan` from the prediction files on disk.
pub fn score_plan(plan: &BatchPlan) -> Result<Vec<DatasetScore>> {
    let mut scores = Vec::with_capacity(plan.invocations.len());
    for invocation in &plan.invocations {
        let score = match locate_predictions(&invocation.output_path) {
            Some(path) => {
                let (samples, distance, length) = score_file(&path)?;
                DatasetScore {
                    label: invocation.label.clone(),
                    file: Some(path.display().to_string()),
                    samples,
                    distance,
                    length,
                }
            }
            None => {
                info!(
                    "No predictions for {} at {}",
                    invocation.label, invocation.output_path
                );
                DatasetScore {
                    label: invocation.label.clone(),
                    file: None,
                    samples: 0,
                    distance: 0,
                    length: 0,
                }
            }
        };
        scores.push(score);
    }
    Ok(scores)
}

#[derive(Serialize)]
struct ReportRow<'a> {
    dataset: &'a str,
    samples: usize,
    distance: usize,
    length: usize,
    per: Option<f64>,
    file: Option<&'a str>,
}

impl<'a> From<&'a DatasetScore> for ReportRow<'a> {
    fn from(score: &'a DatasetScore) -> Self {
        Self {
            dataset: &score.label,
            samples: score.samples,
            distance: score.distance,
            length: score.length,
            per: score.per().map(|p| (p * 1000.0).round() / 1000.0),
            file: score.file.as_deref(),
        }
    }
}

pub fn write_report(
    scores: &[DatasetScore],
    format: ReportFormat,
    out: &mut dyn Write,
) -> Result<()> {
    match format {
        ReportFormat::Text => {
            let width = scores
                .iter()
                .map(|s| s.label.len())
                .max()
                .unwrap_or(0)
                .max("Dataset".len());
            writeln!(
                out,
                "{:<width$}  {:>8}  {:>7}",
                "Dataset", "Samples", "PER"
            )?;
            for score in scores {
                match (score.file.as_ref(), score.per()) {
                    (None, _) => writeln!(
                        out,
                        "{:<width$}  {:>8}  {:>7}",
                        score.label, "-", "missing"
                    )?,
                    (Some(_), Some(per)) => writeln!(
                        out,
                        "{:<width$}  {:>8}  {:>7.3}",
                        score.label, score.samples, per
                    )?,
                    (Some(_), None) => writeln!(
                        out,
                        "{:<width$}  {:>8}  {:>7}",
                        score.label, score.samples, "n/a"
                    )?,
                }
            }
        }
        ReportFormat::Json => {
            let rows: Vec<ReportRow<'_>> =
                scores.iter().map(ReportRow::from).collect();
            serde_json::to_writer_pretty(&mut *out, &rows)?;
            writeln!(out)?;
        }
        ReportFormat::Csv => {
            let mut writer = csv::Writer::from_writer(&mut *out);
            for score in scores {
                writer.serialize(ReportRow::from(score))?;
            }
            writer.flush()?;
        }
    }
    Ok(())
}
