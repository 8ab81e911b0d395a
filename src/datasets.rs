use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Directory holding the trained CTC models, one subdirectory per group.
pub const DEFAULT_MODEL_ROOT: &str = "examples/librispeech/models/ctc_models";

/// Directory the evaluator writes prediction files into.
pub const DEFAULT_PREDICTIONS_DIR: &str = "./predictions";

/// One test set the runner evaluates a model against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    /// Human-readable name printed in the stage header
    pub label: String,
    /// Dataset JSON handed to the evaluator. A leading `~` is expanded.
    pub dataset_path: String,
    /// Distinguishes this dataset's prediction file from the others
    pub output_suffix: String,
}

impl DatasetDescriptor {
    pub fn new(label: &str, dataset_path: &str, output_suffix: &str) -> Self {
        Self {
            label: label.to_string(),
            dataset_path: dataset_path.to_string(),
            output_suffix: output_suffix.to_string(),
        }
    }

    /// Path of the prediction file for this dataset and model.
    pub fn output_path(
        &self,
        predictions_dir: &str,
        group: &str,
        name: &str,
    ) -> String {
        format!(
            "{}/{}-{}_{}_predictions.json",
            predictions_dir.trim_end_matches('/'),
            group,
            name,
            self.output_suffix
        )
    }
}

/// Ordered list of datasets. Evaluation always follows this order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetTable {
    pub datasets: Vec<DatasetDescriptor>,
}

impl Default for DatasetTable {
    fn default() -> Self {
        Self {
            datasets: vec![
                DatasetDescriptor::new(
                    "Speak Test",
                    "~/awni_speech/data/speak_test_data/speak_test.json",
                    "speak_test",
                ),
                DatasetDescriptor::new(
                    "Dustin Clean",
                    "~/awni_speech/data/dustin_test_data/20191202_clean/drz_test.json",
                    "1202",
                ),
                DatasetDescriptor::new(
                    "Dustin Noisy",
                    "~/awni_speech/data/dustin_test_data/20191118_plane/simple/drz_test.json",
                    "1118-simple",
                ),
                DatasetDescriptor::new(
                    "lib-ted-cv",
                    "~/awni_speech/data/lib-ted-cv/test_lib-ted-cv.json",
                    "test-lib-ted-cv",
                ),
            ],
        }
    }
}

impl DatasetTable {
    /// Load a table from a JSON file of the form
    /// `{"datasets": [{"label": .., "dataset_path": .., "output_suffix": ..}]}`.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).with_context(|| {
            format!("Failed to read dataset config {}", path.display())
        })?;
        let table: DatasetTable = serde_json::from_str(&contents)
            .with_context(|| {
                format!("Failed to parse dataset config {}", path.display())
            })?;
        table.validate()?;
        info!(
            "Loaded {} datasets from {}",
            table.datasets.len(),
            path.display()
        );
        Ok(table)
    }

    /// Use the config file when one is given, otherwise the built-in table.
    pub fn load(config: Option<&Path>) -> Result<Self> {
        match config {
            Some(path) => Self::from_json_file(path),
            None => {
                debug!("No dataset config given, using built-in table");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.datasets.is_empty() {
            anyhow::bail!("Dataset table is empty");
        }

        let mut labels = HashSet::new();
        let mut suffixes = HashSet::new();
        for (i, dataset) in self.datasets.iter().enumerate() {
            if dataset.label.trim().is_empty() {
                anyhow::bail!("Dataset #{} has an empty label", i + 1);
            }
            if dataset.dataset_path.trim().is_empty() {
                anyhow::bail!(
                    "Dataset '{}' has an empty dataset_path",
                    dataset.label
                );
            }
            if dataset.output_suffix.trim().is_empty() {
                anyhow::bail!(
                    "Dataset '{}' has an empty output_suffix",
                    dataset.label
                );
            }
            if !labels.insert(dataset.label.as_str()) {
                anyhow::bail!("Duplicate dataset label '{}'", dataset.label);
            }
            // Two rows sharing a suffix would overwrite each other's output.
            if !suffixes.insert(dataset.output_suffix.as_str()) {
                anyhow::bail!(
                    "Duplicate output_suffix '{}'",
                    dataset.output_suffix
                );
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DatasetDescriptor> {
        self.datasets.iter()
    }
}

/// Path of the model directory for `group`/`name` under `model_root`.
pub fn model_path(model_root: &str, group: &str, name: &str) -> String {
    format!("{}/{}/{}", model_root.trim_end_matches('/'), group, name)
}

/// Expand a leading `~` the way a shell would.
///
/// Paths without a leading `~`, or when no home directory can be
/// determined, are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    expand_home_with(path, dirs::home_dir())
}

fn expand_home_with(path: &str, home: Option<PathBuf>) -> PathBuf {
    let Some(home) = home else {
        return PathBuf::from(path);
    };
    if path == "~" {
        home
    } else if let Some(rest) = path.strip_prefix("~/") {
        home.join(rest)
    } else {
        PathBuf::from(path)
    }
}
