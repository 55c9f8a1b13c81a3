//! On-disk layout of an export tree
//!
//! ```text
//! <root>/
//! ├── manifest.json                       (written last)
//! ├── experiments/
//! │   ├── manifest.json
//! │   └── <experiment_id>/
//! │       ├── runs/<run_id>/run.json
//! │       ├── runs/<run_id>/notebooks/notebook.<ext>
//! │       └── experiment.json             (written after its runs)
//! └── models/
//!     ├── manifest.json
//!     └── <model_dir>/model.json
//! ```
//!
//! A unit's top file (`experiment.json`, `model.json`) is written after
//! everything below it, so its presence marks the unit as complete.
//!
//! Model directories come from [`DirNames`], which keeps them distinct even
//! when two model names sanitize to the same string.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::notebook::NotebookFormat;
use crate::report::TransferReport;
use crate::tracking::{EntityKind, ExperimentRecord, ModelVersion, RegisteredModel, Stage};
use crate::{Error, Result};

const MANIFEST_FILE: &str = "manifest.json";
const EXPERIMENT_FILE: &str = "experiment.json";
const RUN_FILE: &str = "run.json";
const MODEL_FILE: &str = "model.json";

/// Contents of `experiment.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedExperiment {
    /// The source experiment
    pub experiment: ExperimentRecord,
    /// Source ids of the runs written under `runs/`
    pub run_ids: Vec<String>,
    /// Runs that could not be exported
    #[serde(default)]
    pub failed_run_ids: Vec<String>,
    /// When the unit was written
    pub exported_at: DateTime<Utc>,
}

/// One version inside `model.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedVersion {
    /// The source version
    pub version: ModelVersion,
    /// Source experiment id of the version's run
    pub experiment_id: String,
    /// Artifact uri of the source run, used to rewrite `version.source`
    pub run_artifact_uri: String,
}

/// Contents of `model.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedModel {
    /// The source model
    pub model: RegisteredModel,
    /// Kept versions in ascending version order
    pub versions: Vec<ExportedVersion>,
    /// When the unit was written
    pub exported_at: DateTime<Utc>,
}

/// One line of `experiments/manifest.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentEntry {
    /// Source experiment id (also the directory name)
    pub experiment_id: String,
    /// Source experiment name
    pub name: String,
    /// Runs written
    pub run_count: usize,
}

/// One line of `models/manifest.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Source model name
    pub name: String,
    /// Directory under `models/`
    pub dir: String,
    /// Versions written
    pub version_count: usize,
}

/// Contents of the root `manifest.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportManifest {
    /// Crate version that wrote the tree
    pub tool_version: String,
    /// Export start time
    pub started_at: DateTime<Utc>,
    /// Export end time
    pub finished_at: DateTime<Utc>,
    /// Stage filter used (empty = all)
    pub stages: Vec<Stage>,
    /// Run policy used
    pub export_all_runs: bool,
    /// Requested notebook formats
    pub notebook_formats: Vec<NotebookFormat>,
    /// Outcome of the export
    pub report: TransferReport,
}

/// Path arithmetic and JSON IO for one export tree.
#[derive(Debug, Clone)]
pub struct ExportTree {
    root: PathBuf,
}

impl ExportTree {
    /// Tree rooted at `root` (nothing is created yet).
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `experiments/`
    #[must_use]
    pub fn experiments_dir(&self) -> PathBuf {
        self.root.join("experiments")
    }

    /// `models/`
    #[must_use]
    pub fn models_dir(&self) -> PathBuf {
        self.root.join("models")
    }

    /// `experiments/<experiment_id>/`
    #[must_use]
    pub fn experiment_dir(&self, experiment_id: &str) -> PathBuf {
        self.experiments_dir().join(dir_name(experiment_id))
    }

    /// `experiments/<experiment_id>/runs/<run_id>/`
    #[must_use]
    pub fn run_dir(&self, experiment_id: &str, run_id: &str) -> PathBuf {
        self.experiment_dir(experiment_id)
            .join("runs")
            .join(dir_name(run_id))
    }

    /// `experiments/<experiment_id>/runs/<run_id>/notebooks/notebook.<ext>`
    #[must_use]
    pub fn notebook_file(&self, experiment_id: &str, run_id: &str, format: NotebookFormat) -> PathBuf {
        self.run_dir(experiment_id, run_id)
            .join("notebooks")
            .join(format!("notebook.{}", format.extension()))
    }

    /// `models/<dir>/`, `dir` as allocated by [`DirNames`]
    #[must_use]
    pub fn model_dir(&self, dir: &str) -> PathBuf {
        self.models_dir().join(dir)
    }

    /// Remove the units and manifests of a previous export.
    ///
    /// Only `experiments/`, `models/` and the root manifest are touched.
    ///
    /// # Errors
    ///
    /// Returns error if an existing entry cannot be removed
    pub fn reset(&self) -> Result<()> {
        for dir in [self.experiments_dir(), self.models_dir()] {
            if dir.exists() {
                fs::remove_dir_all(&dir)?;
            }
        }
        let manifest = self.root.join(MANIFEST_FILE);
        if manifest.exists() {
            fs::remove_file(manifest)?;
        }
        Ok(())
    }

    /// Write the root manifest.
    ///
    /// # Errors
    ///
    /// Returns error on IO/serialization failure
    pub fn write_manifest(&self, manifest: &ExportManifest) -> Result<()> {
        write_json(&self.root.join(MANIFEST_FILE), manifest)
    }

    /// Read the root manifest, if the export got that far.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be parsed
    pub fn read_manifest(&self) -> Result<Option<ExportManifest>> {
        let path = self.root.join(MANIFEST_FILE);
        if path.exists() {
            read_json(&path).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Write `experiments/manifest.json`.
    ///
    /// # Errors
    ///
    /// Returns error on IO/serialization failure
    pub fn write_experiment_manifest(&self, entries: &[ExperimentEntry]) -> Result<()> {
        write_json(&self.experiments_dir().join(MANIFEST_FILE), &entries)
    }

    /// Write `models/manifest.json`.
    ///
    /// # Errors
    ///
    /// Returns error on IO/serialization failure
    pub fn write_model_manifest(&self, entries: &[ModelEntry]) -> Result<()> {
        write_json(&self.models_dir().join(MANIFEST_FILE), &entries)
    }

    /// Write a run's `run.json`.
    ///
    /// # Errors
    ///
    /// Returns error on IO/serialization failure
    pub fn write_run<T: Serialize>(&self, experiment_id: &str, run_id: &str, run: &T) -> Result<()> {
        write_json(&self.run_dir(experiment_id, run_id).join(RUN_FILE), run)
    }

    /// Read a run's `run.json`.
    ///
    /// # Errors
    ///
    /// Returns error if the file is missing or malformed
    pub fn read_run<T: DeserializeOwned>(&self, experiment_id: &str, run_id: &str) -> Result<T> {
        read_json(&self.run_dir(experiment_id, run_id).join(RUN_FILE))
    }

    /// Write `experiment.json`; call after all of its runs.
    ///
    /// # Errors
    ///
    /// Returns error on IO/serialization failure
    pub fn write_experiment(&self, exported: &ExportedExperiment) -> Result<()> {
        let dir = self.experiment_dir(exported.experiment.experiment_id());
        write_json(&dir.join(EXPERIMENT_FILE), exported)
    }

    /// Write `models/<dir>/model.json`.
    ///
    /// # Errors
    ///
    /// Returns error on IO/serialization failure
    pub fn write_model(&self, dir: &str, exported: &ExportedModel) -> Result<()> {
        write_json(&self.model_dir(dir).join(MODEL_FILE), exported)
    }

    /// Every complete experiment unit, ordered by directory name.
    ///
    /// Directories without `experiment.json` are incomplete and ignored.
    ///
    /// # Errors
    ///
    /// Returns error if a present `experiment.json` cannot be parsed
    pub fn experiment_units(&self) -> Result<Vec<ExportedExperiment>> {
        units(&self.experiments_dir(), EXPERIMENT_FILE)
    }

    /// Every complete model unit, ordered by directory name.
    ///
    /// # Errors
    ///
    /// Returns error if a present `model.json` cannot be parsed
    pub fn model_units(&self) -> Result<Vec<ExportedModel>> {
        units(&self.models_dir(), MODEL_FILE)
    }

    /// Read one model unit by source model name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no complete unit holds that model, or
    /// an error if a unit is malformed
    pub fn read_model(&self, model_name: &str) -> Result<ExportedModel> {
        self.model_units()?
            .into_iter()
            .find(|unit| unit.model.name() == model_name)
            .ok_or_else(|| Error::not_found(EntityKind::RegisteredModel, model_name))
    }
}

/// Allocates distinct directory names within one export.
///
/// The first name sanitizing to `base` gets `base`, later ones `base-2`,
/// `base-3`, and so on.
#[derive(Debug, Default)]
pub struct DirNames {
    used: HashSet<String>,
}

impl DirNames {
    /// Empty allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory for `name`, never handed out before by this allocator.
    pub fn allocate(&mut self, name: &str) -> String {
        let base = dir_name(name);
        let mut candidate = base.clone();
        let mut n = 2;
        while self.used.contains(&candidate) {
            candidate = format!("{base}-{n}");
            n += 1;
        }
        self.used.insert(candidate.clone());
        candidate
    }
}

/// Filesystem-safe directory name for an entity name or id.
///
/// Characters outside `[A-Za-z0-9._-]` become `_`; a leading dot is escaped
/// too so names like `..` cannot escape the tree.
#[must_use]
pub fn dir_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if out.is_empty() || out.starts_with('.') {
        out.insert(0, '_');
    }
    out
}

fn units<T: DeserializeOwned>(dir: &Path, file: &str) -> Result<Vec<T>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .map(|p| p.join(file))
        .filter(|p| p.is_file())
        .collect();
    paths.sort();
    paths.iter().map(|p| read_json(p)).collect()
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_vec_pretty(value)?)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::InvalidInput(format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_name_sanitizes() {
        assert_eq!(dir_name("churn-model_v1.2"), "churn-model_v1.2");
        assert_eq!(dir_name("team/churn model"), "team_churn_model");
        assert_eq!(dir_name(".."), "_..");
        assert_eq!(dir_name(""), "_");
    }

    #[test]
    fn test_incomplete_experiment_units_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let tree = ExportTree::new(dir.path());

        let complete = ExportedExperiment {
            experiment: ExperimentRecord::new("1", "a"),
            run_ids: vec![],
            failed_run_ids: vec![],
            exported_at: Utc::now(),
        };
        tree.write_experiment(&complete).unwrap();
        std::fs::create_dir_all(tree.experiment_dir("2").join("runs")).unwrap();

        let units = tree.experiment_units().unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].experiment.name(), "a");
    }

    #[test]
    fn test_dir_names_never_repeat() {
        let mut dirs = DirNames::new();
        assert_eq!(dirs.allocate("team/churn"), "team_churn");
        assert_eq!(dirs.allocate("team_churn"), "team_churn-2");
        assert_eq!(dirs.allocate("team churn"), "team_churn-3");
        assert_eq!(dirs.allocate("team_churn-2"), "team_churn-2-2");
    }

    fn model_unit(name: &str) -> ExportedModel {
        ExportedModel {
            model: RegisteredModel::new(name, None, crate::tracking::Tags::new()),
            versions: vec![],
            exported_at: Utc::now(),
        }
    }

    #[test]
    fn test_read_model_by_source_name() {
        let dir = tempfile::tempdir().unwrap();
        let tree = ExportTree::new(dir.path());
        let mut dirs = DirNames::new();
        for name in ["team/churn", "team_churn"] {
            tree.write_model(&dirs.allocate(name), &model_unit(name)).unwrap();
        }

        assert_eq!(tree.model_units().unwrap().len(), 2);
        assert_eq!(tree.read_model("team/churn").unwrap().model.name(), "team/churn");
        assert_eq!(tree.read_model("team_churn").unwrap().model.name(), "team_churn");
        assert!(tree.read_model("ghost").unwrap_err().is_not_found());
    }

    #[test]
    fn test_reset_removes_previous_units() {
        let dir = tempfile::tempdir().unwrap();
        let tree = ExportTree::new(dir.path());
        tree.write_model("a", &model_unit("a")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "keep").unwrap();

        tree.reset().unwrap();
        assert!(tree.model_units().unwrap().is_empty());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_missing_tree_has_no_units() {
        let dir = tempfile::tempdir().unwrap();
        let tree = ExportTree::new(dir.path().join("nope"));
        assert!(tree.experiment_units().unwrap().is_empty());
        assert!(tree.model_units().unwrap().is_empty());
        assert!(tree.read_manifest().unwrap().is_none());
    }
}
