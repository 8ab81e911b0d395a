use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::CommonArgs;
use crate::datasets::DatasetTable;
use crate::evaluator::real::ProcessEvaluator;
use crate::evaluator::EvaluatorOptions;
use crate::exit_codes;
use crate::predictions::{self, ReportFormat};
use crate::runner::{
    run_batch, validate_model_id, BatchPlan, FailurePolicy, RunSummary,
};

// Build-time information
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Evaluate a speech model on the standard test sets",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    pub common_args: CommonArgs,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate a model on every dataset, one after another
    Run {
        /// Model group, the subdirectory of the model root
        group: String,

        /// Model name within the group
        name: String,

        /// What to do with the remaining datasets after a failure
        #[arg(long, value_enum, default_value_t = FailurePolicy::FailFast)]
        failure_policy: FailurePolicy,

        /// Print the evaluator commands without running them
        #[arg(long)]
        dry_run: bool,

        /// Evaluate the last saved model instead of the best one
        #[arg(long)]
        last: bool,

        /// Include filenames and per-sample PER in the predictions
        #[arg(long)]
        filename: bool,

        /// Save a human-readable comparison instead of JSON lines
        #[arg(long)]
        formatted: bool,

        /// Write a JSON summary of the run to this path
        #[arg(long)]
        summary: Option<PathBuf>,
    },

    /// List the datasets a run evaluates
    List,

    /// Score saved predictions of a model
    Report {
        /// Model group
        group: String,

        /// Model name within the group
        name: String,

        /// Output format
        #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,
    },
}

/// One-line description of this build for the startup log.
pub fn version_banner() -> String {
    let mut parts = vec![format!("eval_batch {}", built_info::PKG_VERSION)];

    if let Some(commit) = built_info::GIT_COMMIT_HASH_SHORT {
        parts.push(format!("commit {}", commit));
    }
    if built_info::GIT_DIRTY == Some(true) {
        parts.push("workspace dirty".to_string());
    }
    parts.push(format!("built {}", built_info::BUILT_TIME_UTC));
    parts.push(format!("profile {}", built_info::PROFILE));
    parts.join(", ")
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Entry point of the `eval_batch` binary. Returns the process exit code.
pub fn main() -> i32 {
    init_tracing();

    // Usage errors exit here, before anything is planned or run.
    let cli = Cli::parse();
    info!("{}", version_banner());

    match run_app(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            exit_codes::SETUP_FAILED
        }
    }
}

pub fn run_app(cli: Cli) -> Result<i32> {
    let common = cli.common_args;

    match cli.command {
        Commands::Run {
            group,
            name,
            failure_policy,
            dry_run,
            last,
            filename,
            formatted,
            summary,
        } => {
            let options = EvaluatorOptions {
                last,
                filename,
                formatted,
            };
            run_command(
                &common,
                &group,
                &name,
                failure_policy,
                dry_run,
                options,
                summary,
            )
        }
        Commands::List => {
            list_datasets(&common)?;
            Ok(exit_codes::SUCCESS)
        }
        Commands::Report {
            group,
            name,
            format,
        } => report_command(&common, &group, &name, format),
    }
}

fn run_command(
    common: &CommonArgs,
    group: &str,
    name: &str,
    policy: FailurePolicy,
    dry_run: bool,
    options: EvaluatorOptions,
    summary: Option<PathBuf>,
) -> Result<i32> {
    if let Err(e) = validate_model_id(group, name) {
        eprintln!("error: {}", e);
        return Ok(exit_codes::USAGE_ERROR);
    }

    let table = DatasetTable::load(common.datasets_config.as_deref())?;
    let plan = BatchPlan::new(
        &table,
        &common.model_root,
        &common.predictions_dir,
        group,
        name,
    )?;
    let evaluator = ProcessEvaluator::new(
        &common.python,
        common.eval_script.clone(),
        options,
    );

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    if dry_run {
        writeln!(out, "Model: {}", plan.model_path)?;
        for invocation in &plan.invocations {
            writeln!(
                out,
                "{}: {:?}",
                invocation.label,
                evaluator.command(invocation)
            )?;
        }
        return Ok(exit_codes::SUCCESS);
    }

    info!(
        "Evaluating {} on {} datasets ({})",
        plan.model_path,
        plan.invocations.len(),
        policy
    );
    plan.prepare_output_dir()?;
    plan.warn_missing_inputs();

    let started_at = Utc::now();
    let outcome = run_batch(&plan, &evaluator, policy, &mut out);

    if outcome.all_succeeded() {
        info!("All {} datasets evaluated", outcome.stages.len());
    } else {
        warn!(
            "{} of {} datasets failed",
            outcome.failed_count(),
            outcome.stages.len()
        );
    }

    if let Some(path) = summary {
        RunSummary::new(&plan, policy, started_at, &outcome)
            .write_to(&path)?;
    }

    Ok(outcome.exit_code())
}

fn list_datasets(common: &CommonArgs) -> Result<()> {
    let table = DatasetTable::load(common.datasets_config.as_deref())?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for dataset in table.iter() {
        writeln!(
            out,
            "{}\t{}\t{}",
            dataset.label,
            dataset.dataset_path,
            dataset.output_path(&common.predictions_dir, "{group}", "{name}")
        )?;
    }
    Ok(())
}

fn report_command(
    common: &CommonArgs,
    group: &str,
    name: &str,
    format: ReportFormat,
) -> Result<i32> {
    if let Err(e) = validate_model_id(group, name) {
        eprintln!("error: {}", e);
        return Ok(exit_codes::USAGE_ERROR);
    }

    let table = DatasetTable::load(common.datasets_config.as_deref())?;
    let plan = BatchPlan::new(
        &table,
        &common.model_root,
        &common.predictions_dir,
        group,
        name,
    )?;
    let scores = predictions::score_plan(&plan)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    predictions::write_report(&scores, format, &mut out)?;
    Ok(exit_codes::SUCCESS)
}
