pub mod fake;
pub mod real;

use serde::Serialize;

/// Everything the evaluator needs to score one model on one dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvalInvocation {
    pub label: String,
    pub model_path: String,
    pub dataset_path: String,
    pub output_path: String,
}

/// Flags forwarded verbatim to the evaluator on every invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EvaluatorOptions {
    /// Use the last saved model instead of the best one on the dev set
    pub last: bool,
    /// Include the source filename and per-sample PER in the output
    pub filename: bool,
    /// Write a human-readable comparison file instead of JSON lines
    pub formatted: bool,
}

impl EvaluatorOptions {
    pub fn to_args(self) -> Vec<&'static str> {
        let mut args = Vec::new();
        if self.last {
            args.push("--last");
        }
        if self.filename {
            args.push("--filename");
        }
        if self.formatted {
            args.push("--formatted");
        }
        args
    }
}

/// Why a single evaluation stage did not succeed.
#[derive(Debug)]
pub enum StageError {
    /// The evaluator could not be started at all
    Spawn {
        label: String,
        source: std::io::Error,
    },
    /// The evaluator ran and exited unsuccessfully. `code` is `None` when
    /// the process was terminated by a signal.
    Exit { label: String, code: Option<i32> },
}

impl StageError {
    pub fn label(&self) -> &str {
        match self {
            StageError::Spawn { label, .. } => label,
            StageError::Exit { label, .. } => label,
        }
    }
}

impl std::fmt::Display for StageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageError::Spawn { label, source } => {
                write!(f, "Failed to start evaluator for {}: {}", label, source)
            }
            StageError::Exit {
                label,
                code: Some(code),
            } => {
                write!(
                    f,
                    "Evaluator failed on {} with exit code {}",
                    label, code
                )
            }
            StageError::Exit { label, code: None } => {
                write!(f, "Evaluator on {} was terminated by a signal", label)
            }
        }
    }
}

impl std::error::Error for StageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StageError::Spawn { source, .. } => Some(source),
            StageError::Exit { .. } => None,
        }
    }
}

/// Runs the external evaluator for one dataset.
///
/// Implementations block until the evaluation has finished. The process
/// based implementation lives in [`real`]; [`fake`] records invocations
/// for tests.
pub trait Evaluator {
    fn evaluate(&self, invocation: &EvalInvocation) -> Result<(), StageError>;
}
