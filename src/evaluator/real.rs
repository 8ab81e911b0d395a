use crate::datasets::expand_home;
use crate::evaluator::{
    EvalInvocation, Evaluator, EvaluatorOptions, StageError,
};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// Runs `eval.py` (or a compatible program) as a child process.
///
/// The child inherits stdout and stderr so its progress output shows up
/// directly in the runner's console.
#[derive(Debug, Clone)]
pub struct ProcessEvaluator {
    program: String,
    script: PathBuf,
    options: EvaluatorOptions,
}

impl ProcessEvaluator {
    pub fn new(
        program: &str,
        script: PathBuf,
        options: EvaluatorOptions,
    ) -> Self {
        Self {
            program: program.to_string(),
            script,
            options,
        }
    }

    pub fn command(&self, invocation: &EvalInvocation) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg(&self.script)
            .arg(&invocation.model_path)
            .arg(expand_home(&invocation.dataset_path))
            .arg("--save")
            .arg(&invocation.output_path)
            .args(self.options.to_args())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        command
    }
}

impl Evaluator for ProcessEvaluator {
    fn evaluate(&self, invocation: &EvalInvocation) -> Result<(), StageError> {
        let mut command = self.command(invocation);
        debug!("Running evaluator command: {:?}", command);

        let status = command.status().map_err(|e| StageError::Spawn {
            label: invocation.label.clone(),
            source: e,
        })?;

        if !status.success() {
            return Err(StageError::Exit {
                label: invocation.label.clone(),
                code: status.code(),
            });
        }

        info!("Evaluator finished {}", invocation.label);
        Ok(())
    }
}
