use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

use crate::datasets::{self, DatasetTable};
use crate::evaluator::{EvalInvocation, Evaluator, StageError};
use crate::exit_codes;

/// What to do with the remaining datasets once one evaluation fails.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Stop at the first failing dataset and skip the rest
    #[default]
    FailFast,
    /// Attempt every dataset regardless of earlier failures
    ContinueOnError,
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailurePolicy::FailFast => write!(f, "fail-fast"),
            FailurePolicy::ContinueOnError => write!(f, "continue-on-error"),
        }
    }
}

/// Reject identifiers that would produce a malformed model path. Anything
/// non-empty is substituted verbatim.
pub fn validate_model_id(group: &str, name: &str) -> Result<()> {
    if group.is_empty() {
        anyhow::bail!("Model group must not be empty");
    }
    if name.is_empty() {
        anyhow::bail!("Model name must not be empty");
    }
    Ok(())
}

/// The fully resolved list of evaluator invocations for one model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchPlan {
    pub group: String,
    pub name: String,
    pub model_path: String,
    pub predictions_dir: String,
    pub invocations: Vec<EvalInvocation>,
}

impl BatchPlan {
    pub fn new(
        table: &DatasetTable,
        model_root: &str,
        predictions_dir: &str,
        group: &str,
        name: &str,
    ) -> Result<Self> {
        validate_model_id(group, name)?;
        // An empty root would place everything at the filesystem root.
        if model_root.is_empty() {
            anyhow::bail!("Model root must not be empty");
        }
        if predictions_dir.is_empty() {
            anyhow::bail!("Predictions directory must not be empty");
        }

        let model_path = datasets::model_path(model_root, group, name);
        let invocations = table
            .iter()
            .map(|dataset| EvalInvocation {
                label: dataset.label.clone(),
                model_path: model_path.clone(),
                dataset_path: dataset.dataset_path.clone(),
                output_path: dataset.output_path(predictions_dir, group, name),
            })
            .collect();

        Ok(Self {
            group: group.to_string(),
            name: name.to_string(),
            model_path,
            predictions_dir: predictions_dir.to_string(),
            invocations,
        })
    }

    /// Create the predictions directory and make sure it is writable, so
    /// no stage fails halfway through the batch because of it.
    pub fn prepare_output_dir(&self) -> Result<()> {
        let dir = Path::new(&self.predictions_dir);
        if !dir.is_dir() {
            info!("Creating predictions directory {}", dir.display());
            std::fs::create_dir_all(dir).with_context(|| {
                format!(
                    "Failed to create predictions directory {}",
                    dir.display()
                )
            })?;
        }

        // Removed again on drop
        tempfile::NamedTempFile::new_in(dir).with_context(|| {
            format!("Predictions directory {} is not writable", dir.display())
        })?;
        Ok(())
    }

    /// Log datasets whose files are not where the plan expects them.
    /// The evaluator stays the judge of whether a dataset is usable.
    pub fn warn_missing_inputs(&self) {
        if !Path::new(&self.model_path).exists() {
            warn!("Model path {} does not exist", self.model_path);
        }
        for invocation in &self.invocations {
            let path = datasets::expand_home(&invocation.dataset_path);
            if !path.exists() {
                warn!(
                    "Dataset for {} not found at {}",
                    invocation.label,
                    path.display()
                );
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageStatus {
    Succeeded,
    Failed { code: Option<i32> },
    NotStarted { message: String },
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageOutcome {
    pub label: String,
    pub output_path: String,
    #[serde(flatten)]
    pub status: StageStatus,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub stages: Vec<StageOutcome>,
}

impl BatchOutcome {
    pub fn all_succeeded(&self) -> bool {
        self.stages
            .iter()
            .all(|s| s.status == StageStatus::Succeeded)
    }

    pub fn failed_count(&self) -> usize {
        self.stages
            .iter()
            .filter(|s| {
                matches!(
                    s.status,
                    StageStatus::Failed { .. } | StageStatus::NotStarted { .. }
                )
            })
            .count()
    }

    /// Exit code of the first failing stage, or 0 when every stage passed.
    pub fn exit_code(&self) -> i32 {
        for stage in &self.stages {
            match &stage.status {
                StageStatus::Failed { code: Some(code) } => return *code,
                StageStatus::Failed { code: None } => {
                    return exit_codes::EVALUATOR_KILLED
                }
                StageStatus::NotStarted { .. } => {
                    return exit_codes::EVALUATOR_NOT_STARTED
                }
                StageStatus::Succeeded | StageStatus::Skipped => {}
            }
        }
        exit_codes::SUCCESS
    }
}

/// Run every invocation of `plan` in order.
///
/// A header naming the dataset is written to `out` before each stage. The
/// writer is flushed before the evaluator starts since the child shares the
/// console with us.
#[instrument(skip_all, fields(group = %plan.group, name = %plan.name, %policy))]
pub fn run_batch(
    plan: &BatchPlan,
    evaluator: &dyn Evaluator,
    policy: FailurePolicy,
    out: &mut dyn Write,
) -> BatchOutcome {
    let total = plan.invocations.len();
    let mut outcome = BatchOutcome::default();
    let mut stop = false;

    for (i, invocation) in plan.invocations.iter().enumerate() {
        if stop {
            info!("Skipping {}", invocation.label);
            outcome.stages.push(StageOutcome {
                label: invocation.label.clone(),
                output_path: invocation.output_path.clone(),
                status: StageStatus::Skipped,
                elapsed_ms: 0,
            });
            continue;
        }

        // A closed console must not cut the batch short.
        if let Err(e) = writeln!(
            out,
            "Evaluating {} ({}/{})",
            invocation.label,
            i + 1,
            total
        )
        .and_then(|_| out.flush())
        {
            warn!("Failed to write header for {}: {}", invocation.label, e);
        }

        let started = Instant::now();
        let result = evaluator.evaluate(invocation);
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let status = match result {
            Ok(()) => {
                info!(
                    "{} finished in {} ms, predictions at {}",
                    invocation.label, elapsed_ms, invocation.output_path
                );
                StageStatus::Succeeded
            }
            Err(e) => {
                error!("{}", e);
                if policy == FailurePolicy::FailFast {
                    stop = true;
                }
                match e {
                    StageError::Exit { code, .. } => {
                        StageStatus::Failed { code }
                    }
                    StageError::Spawn { source, .. } => {
                        StageStatus::NotStarted {
                            message: source.to_string(),
                        }
                    }
                }
            }
        };

        outcome.stages.push(StageOutcome {
            label: invocation.label.clone(),
            output_path: invocation.output_path.clone(),
            status,
            elapsed_ms,
        });
    }

    outcome
}

/// Machine-readable record of one batch run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub group: String,
    pub name: String,
    pub model_path: String,
    pub policy: FailurePolicy,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub exit_code: i32,
    pub stages: Vec<StageOutcome>,
}

impl RunSummary {
    pub fn new(
        plan: &BatchPlan,
        policy: FailurePolicy,
        started_at: DateTime<Utc>,
        outcome: &BatchOutcome,
    ) -> Self {
        Self {
            group: plan.group.clone(),
            name: plan.name.clone(),
            model_path: plan.model_path.clone(),
            policy,
            started_at,
            finished_at: Utc::now(),
            exit_code: outcome.exit_code(),
            stages: outcome.stages.clone(),
        }
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| {
            format!("Failed to write run summary {}", path.display())
        })?;
        info!("Run summary written to {}", path.display());
        Ok(())
    }
}
