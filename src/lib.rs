//! Batch evaluation of trained speech models.
//!
//! A run takes a model `group` and `name`, resolves the model directory and
//! evaluates it with the external `eval.py` on each configured test set in
//! order, saving one prediction file per dataset.

pub mod cli;
pub mod datasets;
pub mod eval;
pub mod evaluator;
pub mod exit_codes;
pub mod predictions;
pub mod runner;

pub mod test_utils;

pub use datasets::{DatasetDescriptor, DatasetTable};
pub use evaluator::{EvalInvocation, Evaluator, EvaluatorOptions, StageError};
pub use runner::{run_batch, BatchOutcome, BatchPlan, FailurePolicy};
