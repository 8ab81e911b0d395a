//! Process exit codes of the `eval_batch` binary.
//!
//! A failing evaluation stage exits with the evaluator's own code, so the
//! values below only cover cases where the evaluator gave us none.

pub const SUCCESS: i32 = 0;
pub const EVALUATOR_KILLED: i32 = 1; // Evaluator terminated by a signal
pub const USAGE_ERROR: i32 = 2; // Same code clap uses for bad arguments
pub const SETUP_FAILED: i32 = 3; // Config or predictions directory unusable
pub const EVALUATOR_NOT_STARTED: i32 = 127; // Evaluator program not runnable
