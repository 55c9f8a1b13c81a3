//! In-memory tracking backend using `DashMap`.
//!
//! Data lives in the process; [`MemoryTracking::save`] and
//! [`MemoryTracking::load`] persist it as a single JSON snapshot.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    EntityKind, ExperimentRecord, MetricRecord, ModelVersion, NewRun, RegisteredModel, RunRecord,
    RunStatus, Stage, Tags, TrackingClient,
};
use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModelEntry {
    model: RegisteredModel,
    versions: Vec<ModelVersion>,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    artifact_root: String,
    next_experiment_id: u64,
    experiments: Vec<ExperimentRecord>,
    runs: Vec<RunRecord>,
    models: Vec<ModelEntry>,
}

/// In-memory tracking backend.
///
/// Thread-safe; every instance has its own artifact root and assigns random
/// run ids, so two instances never hand out the same run id or artifact uri.
///
/// # Example
///
/// ```rust
/// use registry_transfer::tracking::{MemoryTracking, Tags, TrackingClient};
///
/// let client = MemoryTracking::new();
/// let id = client.create_experiment("fraud", &Tags::new())?;
/// assert_eq!(client.get_experiment(&id)?.name(), "fraud");
/// assert!(client.create_experiment("fraud", &Tags::new()).is_err());
/// # Ok::<(), registry_transfer::Error>(())
/// ```
pub struct MemoryTracking {
    artifact_root: String,
    next_experiment_id: AtomicU64,
    experiments: DashMap<String, ExperimentRecord>,
    experiment_names: DashMap<String, String>,
    runs: DashMap<String, RunRecord>,
    models: DashMap<String, ModelEntry>,
}

impl MemoryTracking {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self {
            artifact_root: format!("memory://{}", Uuid::new_v4().simple()),
            next_experiment_id: AtomicU64::new(1),
            experiments: DashMap::new(),
            experiment_names: DashMap::new(),
            runs: DashMap::new(),
            models: DashMap::new(),
        }
    }

    /// Load a backend from a JSON snapshot written by [`MemoryTracking::save`].
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path.as_ref())?;
        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;

        let store = Self {
            artifact_root: snapshot.artifact_root,
            next_experiment_id: AtomicU64::new(snapshot.next_experiment_id),
            ..Self::new()
        };
        for experiment in snapshot.experiments {
            store.experiment_names.insert(
                experiment.name().to_string(),
                experiment.experiment_id().to_string(),
            );
            store
                .experiments
                .insert(experiment.experiment_id().to_string(), experiment);
        }
        for run in snapshot.runs {
            store.runs.insert(run.run_id().to_string(), run);
        }
        for entry in snapshot.models {
            store.models.insert(entry.model.name().to_string(), entry);
        }
        Ok(store)
    }

    /// Load `path` if it exists, otherwise start empty.
    ///
    /// # Errors
    ///
    /// Returns error if an existing file cannot be read or parsed
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::new())
        }
    }

    /// Write the whole backend to a JSON snapshot.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut experiments: Vec<_> = self.experiments.iter().map(|e| e.value().clone()).collect();
        experiments.sort_by_key(experiment_order);
        let mut runs: Vec<_> = self.runs.iter().map(|r| r.value().clone()).collect();
        runs.sort_by(|a, b| a.run_id().cmp(b.run_id()));
        let mut models: Vec<_> = self.models.iter().map(|m| m.value().clone()).collect();
        models.sort_by(|a, b| a.model.name().cmp(b.model.name()));

        let snapshot = Snapshot {
            artifact_root: self.artifact_root.clone(),
            next_experiment_id: self.next_experiment_id.load(Ordering::SeqCst),
            experiments,
            runs,
            models,
        };
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path.as_ref(), serde_json::to_vec_pretty(&snapshot)?)?;
        Ok(())
    }

    /// Root uri under which experiment and run artifacts live.
    #[must_use]
    pub fn artifact_root(&self) -> &str {
        &self.artifact_root
    }

    /// Number of experiments.
    #[must_use]
    pub fn experiment_count(&self) -> usize {
        self.experiments.len()
    }

    /// Number of runs across all experiments.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Number of registered models.
    #[must_use]
    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    /// Check if the backend holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty() && self.runs.is_empty() && self.models.is_empty()
    }
}

impl Default for MemoryTracking {
    fn default() -> Self {
        Self::new()
    }
}

fn experiment_order(experiment: &ExperimentRecord) -> (u64, String) {
    (
        experiment.experiment_id().parse().unwrap_or(u64::MAX),
        experiment.experiment_id().to_string(),
    )
}

impl TrackingClient for MemoryTracking {
    fn create_experiment(&self, name: &str, tags: &Tags) -> Result<String> {
        match self.experiment_names.entry(name.to_string()) {
            Entry::Occupied(_) => Err(Error::already_exists(EntityKind::Experiment, name)),
            Entry::Vacant(slot) => {
                let id = self
                    .next_experiment_id
                    .fetch_add(1, Ordering::SeqCst)
                    .to_string();
                let experiment = ExperimentRecord::builder(id.clone(), name)
                    .artifact_location(format!("{}/{id}", self.artifact_root))
                    .tags(tags.clone())
                    .build();
                self.experiments.insert(id.clone(), experiment);
                slot.insert(id.clone());
                Ok(id)
            }
        }
    }

    fn get_experiment(&self, experiment_id: &str) -> Result<ExperimentRecord> {
        self.experiments
            .get(experiment_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| Error::not_found(EntityKind::Experiment, experiment_id))
    }

    fn get_experiment_by_name(&self, name: &str) -> Result<Option<ExperimentRecord>> {
        let Some(id) = self.experiment_names.get(name).map(|id| id.value().clone()) else {
            return Ok(None);
        };
        Ok(self.experiments.get(&id).map(|e| e.value().clone()))
    }

    fn search_experiments(&self) -> Result<Vec<ExperimentRecord>> {
        let mut experiments: Vec<_> = self.experiments.iter().map(|e| e.value().clone()).collect();
        experiments.sort_by_key(experiment_order);
        Ok(experiments)
    }

    fn create_run(&self, experiment_id: &str, run: NewRun) -> Result<RunRecord> {
        let experiment = self.get_experiment(experiment_id)?;
        let run_id = Uuid::new_v4().simple().to_string();
        let record = RunRecord::builder(run_id.clone(), experiment_id)
            .user_id(run.user_id)
            .started_at(run.started_at.unwrap_or_else(Utc::now))
            .artifact_uri(format!("{}/{run_id}/artifacts", experiment.artifact_location()))
            .tags(run.tags)
            .build();
        self.runs.insert(run_id, record.clone());
        Ok(record)
    }

    fn get_run(&self, run_id: &str) -> Result<RunRecord> {
        self.runs
            .get(run_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| Error::not_found(EntityKind::Run, run_id))
    }

    fn search_runs(&self, experiment_ids: &[String]) -> Result<Vec<RunRecord>> {
        let wanted: HashSet<&str> = experiment_ids.iter().map(String::as_str).collect();
        let mut runs: Vec<RunRecord> = self
            .runs
            .iter()
            .filter(|r| wanted.contains(r.value().experiment_id()))
            .map(|r| r.value().clone())
            .collect();
        runs.sort_by(|a, b| {
            b.started_at()
                .cmp(&a.started_at())
                .then_with(|| a.run_id().cmp(b.run_id()))
        });
        Ok(runs)
    }

    fn log_batch(
        &self,
        run_id: &str,
        params: &BTreeMap<String, String>,
        metrics: &[MetricRecord],
        tags: &Tags,
    ) -> Result<()> {
        let mut run = self
            .runs
            .get_mut(run_id)
            .ok_or_else(|| Error::not_found(EntityKind::Run, run_id))?;
        for (key, value) in params {
            if !run.log_param(key.clone(), value.clone()) {
                return Err(Error::InvalidInput(format!(
                    "param '{key}' of run {run_id} already logged with a different value"
                )));
            }
        }
        for metric in metrics {
            run.log_metric(metric.clone());
        }
        for (key, value) in tags.iter() {
            run.set_tag(key, value);
        }
        Ok(())
    }

    fn set_terminated(
        &self,
        run_id: &str,
        status: RunStatus,
        ended_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut run = self
            .runs
            .get_mut(run_id)
            .ok_or_else(|| Error::not_found(EntityKind::Run, run_id))?;
        run.complete(status, ended_at);
        Ok(())
    }

    fn create_registered_model(
        &self,
        name: &str,
        description: Option<&str>,
        tags: &Tags,
    ) -> Result<RegisteredModel> {
        match self.models.entry(name.to_string()) {
            Entry::Occupied(_) => Err(Error::already_exists(EntityKind::RegisteredModel, name)),
            Entry::Vacant(slot) => {
                let model =
                    RegisteredModel::new(name, description.map(str::to_string), tags.clone());
                slot.insert(ModelEntry {
                    model: model.clone(),
                    versions: Vec::new(),
                });
                Ok(model)
            }
        }
    }

    fn get_registered_model(&self, name: &str) -> Result<RegisteredModel> {
        self.models
            .get(name)
            .map(|m| m.value().model.clone())
            .ok_or_else(|| Error::not_found(EntityKind::RegisteredModel, name))
    }

    fn search_registered_models(&self) -> Result<Vec<RegisteredModel>> {
        let mut models: Vec<_> = self.models.iter().map(|m| m.value().model.clone()).collect();
        models.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(models)
    }

    fn delete_registered_model(&self, name: &str) -> Result<()> {
        self.models
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::not_found(EntityKind::RegisteredModel, name))
    }

    fn create_model_version(
        &self,
        name: &str,
        source: &str,
        run_id: &str,
        description: Option<&str>,
    ) -> Result<ModelVersion> {
        if !self.runs.contains_key(run_id) {
            return Err(Error::not_found(EntityKind::Run, run_id));
        }
        let mut entry = self
            .models
            .get_mut(name)
            .ok_or_else(|| Error::not_found(EntityKind::RegisteredModel, name))?;
        let next = entry.versions.last().map_or(1, |v| v.version() + 1);
        let version =
            ModelVersion::new(name, next, source, run_id, description.map(str::to_string));
        entry.versions.push(version.clone());
        Ok(version)
    }

    fn search_model_versions(&self, name: &str) -> Result<Vec<ModelVersion>> {
        self.models
            .get(name)
            .map(|m| m.value().versions.clone())
            .ok_or_else(|| Error::not_found(EntityKind::RegisteredModel, name))
    }

    fn transition_model_version_stage(
        &self,
        name: &str,
        version: u64,
        stage: Stage,
    ) -> Result<ModelVersion> {
        let mut entry = self
            .models
            .get_mut(name)
            .ok_or_else(|| Error::not_found(EntityKind::RegisteredModel, name))?;
        let target = entry
            .versions
            .iter_mut()
            .find(|v| v.version() == version)
            .ok_or_else(|| Error::not_found(EntityKind::ModelVersion, format!("{name}/{version}")))?;
        target.set_stage(stage);
        Ok(target.clone())
    }
}
