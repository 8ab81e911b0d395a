use std::collections::HashMap;
use std::sync::Mutex;

use crate::evaluator::{EvalInvocation, Evaluator, StageError};

/// A fake evaluator for testing
///
/// Records every invocation it receives and fails the datasets it has been
/// told to fail, without starting any process. Optionally writes a small
/// predictions file to each output path so filesystem effects can be
/// checked.
///
/// # Example
///
/// ```
/// use eval_batch::evaluator::fake::FakeEvaluator;
/// use eval_batch::evaluator::{EvalInvocation, Evaluator};
///
/// let evaluator = FakeEvaluator::new().with_failure("Dustin Clean", 1);
/// let invocation = EvalInvocation {
///     label: "Dustin Clean".to_string(),
///     model_path: "models/conv/model5".to_string(),
///     dataset_path: "drz_test.json".to_string(),
///     output_path: "out.json".to_string(),
/// };
/// assert!(evaluator.evaluate(&invocation).is_err());
/// assert_eq!(evaluator.labels(), vec!["Dustin Clean".to_string()]);
/// ```
pub struct FakeEvaluator {
    failures: HashMap<String, Option<i32>>,
    write_outputs: bool,
    // Track invocations for verification in tests
    pub invocations: Mutex<Vec<EvalInvocation>>,
}

impl Default for FakeEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeEvaluator {
    pub fn new() -> Self {
        Self {
            failures: HashMap::new(),
            write_outputs: false,
            invocations: Mutex::new(vec![]),
        }
    }

    /// Make the dataset with this label exit with `code`
    pub fn with_failure(mut self, label: &str, code: i32) -> Self {
        self.failures.insert(label.to_string(), Some(code));
        self
    }

    /// Make the dataset with this label die as if killed by a signal
    pub fn with_signal(mut self, label: &str) -> Self {
        self.failures.insert(label.to_string(), None);
        self
    }

    /// Write a one-line predictions file to the output path of every
    /// successful invocation
    pub fn writing_outputs(mut self) -> Self {
        self.write_outputs = true;
        self
    }

    pub fn labels(&self) -> Vec<String> {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .map(|i| i.label.clone())
            .collect()
    }
}

impl Evaluator for FakeEvaluator {
    fn evaluate(&self, invocation: &EvalInvocation) -> Result<(), StageError> {
        self.invocations.lock().unwrap().push(invocation.clone());

        if let Some(code) = self.failures.get(&invocation.label) {
            return Err(StageError::Exit {
                label: invocation.label.clone(),
                code: *code,
            });
        }

        if self.write_outputs {
            let line = serde_json::json!({
                "prediction": ["ah", "b"],
                "label": ["ah", "b", "k"],
            });
            std::fs::write(&invocation.output_path, format!("{}\n", line))
                .map_err(|e| StageError::Spawn {
                    label: invocation.label.clone(),
                    source: e,
                })?;
        }

        Ok(())
    }
}
