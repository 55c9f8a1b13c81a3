//! Capability surface of a tracking backend.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::{
    ExperimentRecord, MetricRecord, ModelVersion, RegisteredModel, RunRecord, RunStatus, Stage,
    Tags,
};
use crate::Result;

/// Creation parameters of a run.
#[derive(Debug, Clone, Default)]
pub struct NewRun {
    /// Owning user; `None` lets the backend decide.
    pub user_id: Option<String>,
    /// Start timestamp; `None` means now.
    pub started_at: Option<DateTime<Utc>>,
    /// Initial tags.
    pub tags: Tags,
}

/// Tracking backend trait.
///
/// Every call may fail with [`Error::NotFound`](crate::Error::NotFound),
/// [`Error::AlreadyExists`](crate::Error::AlreadyExists),
/// [`Error::PermissionDenied`](crate::Error::PermissionDenied) or
/// [`Error::Unavailable`](crate::Error::Unavailable). Implementations are
/// shared by reference across worker threads.
pub trait TrackingClient: Send + Sync {
    /// Create an experiment and return its id.
    ///
    /// Fails with `AlreadyExists` if the name is taken.
    fn create_experiment(&self, name: &str, tags: &Tags) -> Result<String>;

    /// Get an experiment by id.
    fn get_experiment(&self, experiment_id: &str) -> Result<ExperimentRecord>;

    /// Get an experiment by name; `None` if there is none.
    fn get_experiment_by_name(&self, name: &str) -> Result<Option<ExperimentRecord>>;

    /// List every experiment.
    fn search_experiments(&self) -> Result<Vec<ExperimentRecord>>;

    /// Create a run under an experiment.
    fn create_run(&self, experiment_id: &str, run: NewRun) -> Result<RunRecord>;

    /// Get a run by id.
    fn get_run(&self, run_id: &str) -> Result<RunRecord>;

    /// List the runs of the given experiments, newest first.
    fn search_runs(&self, experiment_ids: &[String]) -> Result<Vec<RunRecord>>;

    /// Log params, metrics and tags on a run in one call.
    fn log_batch(
        &self,
        run_id: &str,
        params: &BTreeMap<String, String>,
        metrics: &[MetricRecord],
        tags: &Tags,
    ) -> Result<()>;

    /// Mark a run terminated with the given status.
    fn set_terminated(
        &self,
        run_id: &str,
        status: RunStatus,
        ended_at: Option<DateTime<Utc>>,
    ) -> Result<()>;

    /// Create a registered model.
    ///
    /// Fails with `AlreadyExists` if the name is taken.
    fn create_registered_model(
        &self,
        name: &str,
        description: Option<&str>,
        tags: &Tags,
    ) -> Result<RegisteredModel>;

    /// Get a registered model by name.
    fn get_registered_model(&self, name: &str) -> Result<RegisteredModel>;

    /// List every registered model.
    fn search_registered_models(&self) -> Result<Vec<RegisteredModel>>;

    /// Delete a registered model together with all its versions.
    fn delete_registered_model(&self, name: &str) -> Result<()>;

    /// Register a new version of `name` built from `source` of run `run_id`.
    ///
    /// The backend assigns the next version number.
    fn create_model_version(
        &self,
        name: &str,
        source: &str,
        run_id: &str,
        description: Option<&str>,
    ) -> Result<ModelVersion>;

    /// List all versions of a model in ascending version order.
    fn search_model_versions(&self, name: &str) -> Result<Vec<ModelVersion>>;

    /// Move a version to another stage.
    fn transition_model_version_stage(
        &self,
        name: &str,
        version: u64,
        stage: Stage,
    ) -> Result<ModelVersion>;

    /// Latest version per stage, for the given stages (empty = every stage).
    ///
    /// Returns at most one version per stage, ordered by stage.
    fn get_latest_versions(&self, name: &str, stages: &[Stage]) -> Result<Vec<ModelVersion>> {
        let mut latest: BTreeMap<Stage, ModelVersion> = BTreeMap::new();
        for version in self.search_model_versions(name)? {
            if !stages.is_empty() && !stages.contains(&version.stage()) {
                continue;
            }
            let newer = latest
                .get(&version.stage())
                .map_or(true, |current| version.version() > current.version());
            if newer {
                latest.insert(version.stage(), version);
            }
        }
        Ok(latest.into_values().collect())
    }
}
