#![allow(deprecated)]
#![cfg(unix)]
//! Drives the `eval_batch` binary end to end with a shell script standing in
//! for `eval.py`. The script appends its arguments to `$EVAL_LOG`, fails for
//! any dataset whose path contains "fail", and otherwise writes a
//! predictions file the way the real evaluator does.

use assert_cmd::Command;
use pretty_assertions::assert_eq;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const FAKE_EVAL: &str = r#"
echo "$@" >> "$EVAL_LOG"
case "$2" in
  *fail*) exit 5 ;;
esac
echo '{"prediction": ["a", "x"], "label": ["a", "b"]}' > "$4_pred.json"
"#;

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new(datasets: &[(&str, &str, &str)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("eval.sh"), FAKE_EVAL).unwrap();

        let datasets: Vec<serde_json::Value> = datasets
            .iter()
            .map(|(label, path, suffix)| {
                serde_json::json!({
                    "label": label,
                    "dataset_path": path,
                    "output_suffix": suffix,
                })
            })
            .collect();
        std::fs::write(
            dir.path().join("datasets.json"),
            serde_json::json!({ "datasets": datasets }).to_string(),
        )
        .unwrap();

        Self { dir }
    }

    fn standard() -> Self {
        Self::new(&[
            ("Speak Test", "/data/speak_test.json", "speak_test"),
            ("Dustin Clean", "/data/drz_clean.json", "1202"),
            ("Dustin Noisy", "/data/drz_noisy.json", "1118-simple"),
            ("lib-ted-cv", "/data/test_lib-ted-cv.json", "test-lib-ted-cv"),
        ])
    }

    fn with_failing_second_stage() -> Self {
        Self::new(&[
            ("Speak Test", "/data/speak_test.json", "speak_test"),
            ("Dustin Clean", "/data/fail.json", "1202"),
            ("Dustin Noisy", "/data/drz_noisy.json", "1118-simple"),
            ("lib-ted-cv", "/data/test_lib-ted-cv.json", "test-lib-ted-cv"),
        ])
    }

    fn predictions_dir(&self) -> PathBuf {
        self.dir.path().join("predictions")
    }

    fn log_path(&self) -> PathBuf {
        self.dir.path().join("eval.log")
    }

    fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("eval_batch").unwrap();
        cmd.current_dir(self.dir.path())
            .env("EVAL_LOG", self.log_path())
            .env("EVAL_PYTHON", "sh")
            .env("EVAL_SCRIPT", self.dir.path().join("eval.sh"))
            .env("EVAL_DATASETS_CONFIG", self.dir.path().join("datasets.json"))
            .env("EVAL_PREDICTIONS_DIR", self.predictions_dir())
            .env("EVAL_MODEL_ROOT", "models")
            .env("RUST_LOG", "warn");
        cmd
    }

    fn logged_invocations(&self) -> Vec<String> {
        read_lines(&self.log_path())
    }
}

fn read_lines(path: &Path) -> Vec<String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => contents.lines().map(str::to_string).collect(),
        Err(_) => vec![],
    }
}

#[test]
fn run_evaluates_every_dataset_in_order() {
    let fixture = Fixture::standard();
    let predictions = fixture.predictions_dir();

    fixture
        .command()
        .args(["run", "conv", "model5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Evaluating Speak Test (1/4)"))
        .stdout(predicate::str::contains("Evaluating lib-ted-cv (4/4)"));

    let p = predictions.display();
    assert_eq!(
        fixture.logged_invocations(),
        vec![
            format!("models/conv/model5 /data/speak_test.json --save {p}/conv-model5_speak_test_predictions.json"),
            format!("models/conv/model5 /data/drz_clean.json --save {p}/conv-model5_1202_predictions.json"),
            format!("models/conv/model5 /data/drz_noisy.json --save {p}/conv-model5_1118-simple_predictions.json"),
            format!("models/conv/model5 /data/test_lib-ted-cv.json --save {p}/conv-model5_test-lib-ted-cv_predictions.json"),
        ]
    );
}

#[test]
fn missing_name_is_a_usage_error() {
    let fixture = Fixture::standard();

    fixture
        .command()
        .args(["run", "conv"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Usage"));

    assert!(fixture.logged_invocations().is_empty());
    assert!(!fixture.predictions_dir().exists());
}

#[test]
fn empty_group_is_rejected_before_any_invocation() {
    let fixture = Fixture::standard();

    fixture
        .command()
        .args(["run", "", "model5"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("group must not be empty"));

    assert!(fixture.logged_invocations().is_empty());
}

#[test]
fn empty_predictions_dir_is_a_usage_error() {
    let fixture = Fixture::standard();

    fixture
        .command()
        .args(["run", "conv", "model5", "--predictions-dir", ""])
        .assert()
        .code(2);

    assert!(fixture.logged_invocations().is_empty());
}

#[test]
fn whitespace_ids_are_used_verbatim() {
    let fixture = Fixture::standard();

    fixture
        .command()
        .args(["run", " ", "model 5"])
        .assert()
        .success();

    let p = fixture.predictions_dir();
    let expected = format!(
        "models/ /model 5 /data/speak_test.json --save {}/ -model 5_speak_test_predictions.json",
        p.display()
    );
    assert_eq!(fixture.logged_invocations()[0], expected);
}

#[test]
fn home_relative_dataset_is_expanded_for_evaluator() {
    let fixture = Fixture::new(&[("Home", "~/data/home.json", "home")]);
    let home = fixture.dir.path().join("home");

    fixture
        .command()
        .env("HOME", &home)
        .args(["run", "conv", "model5"])
        .assert()
        .success();

    let logged = fixture.logged_invocations();
    assert_eq!(logged.len(), 1);
    let dataset = logged[0].split(' ').nth(1).unwrap().to_string();
    assert_eq!(dataset, home.join("data/home.json").display().to_string());
}

#[test]
fn fail_fast_stops_after_failing_stage() {
    let fixture = Fixture::with_failing_second_stage();

    fixture
        .command()
        .args(["run", "conv", "model5"])
        .assert()
        .code(5)
        .stdout(predicate::str::contains("Evaluating Dustin Noisy").not());

    assert_eq!(fixture.logged_invocations().len(), 2);
}

#[test]
fn continue_on_error_attempts_every_stage() {
    let fixture = Fixture::with_failing_second_stage();

    fixture
        .command()
        .args([
            "run",
            "conv",
            "model5",
            "--failure-policy",
            "continue-on-error",
        ])
        .assert()
        .code(5);

    assert_eq!(fixture.logged_invocations().len(), 4);
}

#[test]
fn rerun_overwrites_the_same_files() {
    let fixture = Fixture::standard();
    let list = || {
        let mut names: Vec<String> =
            std::fs::read_dir(fixture.predictions_dir())
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect();
        names.sort();
        names
    };

    fixture.command().args(["run", "conv", "model5"]).assert().success();
    let first = list();
    fixture.command().args(["run", "conv", "model5"]).assert().success();

    assert_eq!(first.len(), 4);
    assert_eq!(first, list());
}

#[test]
fn dry_run_touches_nothing() {
    let fixture = Fixture::standard();

    fixture
        .command()
        .args(["run", "conv", "model5", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Model: models/conv/model5"))
        .stdout(predicate::str::contains("conv-model5_1202_predictions.json"));

    assert!(fixture.logged_invocations().is_empty());
    assert!(!fixture.predictions_dir().exists());
}

#[test]
fn unusable_predictions_dir_fails_before_invocation() {
    let fixture = Fixture::standard();
    std::fs::write(fixture.predictions_dir(), "not a directory").unwrap();

    fixture
        .command()
        .args(["run", "conv", "model5"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("predictions directory"));

    assert!(fixture.logged_invocations().is_empty());
}

#[test]
fn setup_error_is_printed_once() {
    let fixture = Fixture::standard();
    std::fs::write(fixture.predictions_dir(), "not a directory").unwrap();

    let output = fixture
        .command()
        .env("RUST_LOG", "debug")
        .args(["run", "conv", "model5"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(
        stderr.matches("Failed to create predictions directory").count(),
        1
    );
    assert!(stderr.contains("error: Failed to create predictions directory"));
}

#[test]
fn missing_evaluator_program_exits_127() {
    let fixture = Fixture::standard();

    fixture
        .command()
        .env("EVAL_PYTHON", "definitely-not-a-real-python")
        .args(["run", "conv", "model5"])
        .assert()
        .code(127);
}

#[test]
fn summary_is_written_on_request() {
    let fixture = Fixture::with_failing_second_stage();
    let summary = fixture.dir.path().join("summary.json");

    fixture
        .command()
        .args(["run", "conv", "model5", "--summary"])
        .arg(&summary)
        .assert()
        .code(5);

    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&summary).unwrap())
            .unwrap();
    assert_eq!(value["exit_code"], 5);
    assert_eq!(value["stages"][1]["status"], "failed");
    assert_eq!(value["stages"][2]["status"], "skipped");
}

#[test]
fn report_scores_saved_predictions() {
    let fixture = Fixture::standard();
    fixture.command().args(["run", "conv", "model5"]).assert().success();

    let output = fixture
        .command()
        .args(["report", "conv", "model5", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let rows: serde_json::Value =
        serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(rows.as_array().unwrap().len(), 4);
    assert_eq!(rows[0]["dataset"], "Speak Test");
    assert_eq!(rows[0]["samples"], 1);
    assert_eq!(rows[0]["per"], 0.5);
}

#[test]
fn list_prints_builtin_table_without_config() {
    let fixture = Fixture::standard();

    fixture
        .command()
        .env_remove("EVAL_DATASETS_CONFIG")
        .env("EVAL_PREDICTIONS_DIR", "./predictions")
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Speak Test\t~/awni_speech/data/speak_test_data/speak_test.json\t./predictions/{group}-{name}_speak_test_predictions.json",
        ))
        .stdout(predicate::str::contains("lib-ted-cv"));
}
