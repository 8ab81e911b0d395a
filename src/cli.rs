use clap::builder::NonEmptyStringValueParser;
use clap::Parser;
use std::path::PathBuf;

use crate::datasets::{DEFAULT_MODEL_ROOT, DEFAULT_PREDICTIONS_DIR};

/// Command-line arguments shared by every subcommand
#[derive(Parser, Debug, Clone)]
pub struct CommonArgs {
    /// JSON file listing the datasets to evaluate. The built-in table is
    /// used when this is not given.
    #[arg(long, global = true, env = "EVAL_DATASETS_CONFIG")]
    pub datasets_config: Option<PathBuf>,

    /// Directory holding one subdirectory of models per group
    #[arg(
        long,
        global = true,
        value_parser = NonEmptyStringValueParser::new(),
        default_value = DEFAULT_MODEL_ROOT,
        env = "EVAL_MODEL_ROOT"
    )]
    pub model_root: String,

    /// Directory prediction files are written to
    #[arg(
        long,
        global = true,
        value_parser = NonEmptyStringValueParser::new(),
        default_value = DEFAULT_PREDICTIONS_DIR,
        env = "EVAL_PREDICTIONS_DIR"
    )]
    pub predictions_dir: String,

    /// Interpreter used to run the evaluation script
    #[arg(
        long,
        global = true,
        value_parser = NonEmptyStringValueParser::new(),
        default_value = "python",
        env = "EVAL_PYTHON"
    )]
    pub python: String,

    /// Evaluation script
    #[arg(
        long,
        global = true,
        default_value = "eval.py",
        env = "EVAL_SCRIPT"
    )]
    pub eval_script: PathBuf,
}
