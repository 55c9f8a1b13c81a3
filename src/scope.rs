//! Export scope resolution
//!
//! Turns a model selection into the exact set of experiments, runs, models
//! and versions an export has to write. The result is referentially closed:
//! every kept version's run is in scope, and every run's experiment is too.
//!
//! Two policies decide which runs come along:
//!
//! - `export_all_runs = true`: every run of each referenced experiment
//! - `export_all_runs = false`: only the runs referenced by kept versions

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::names::ModelSelection;
use crate::report::Failure;
use crate::tracking::{
    EntityKind, ExperimentRecord, ModelVersion, RegisteredModel, Stage, TrackingClient,
};
use crate::{Error, Result};

/// One experiment of the scope and the ids of its runs to export.
#[derive(Debug, Clone)]
pub struct ExperimentScope {
    /// The experiment as read from the source
    pub experiment: ExperimentRecord,
    /// Source run ids, deduplicated
    pub run_ids: BTreeSet<String>,
    all_runs_loaded: bool,
}

/// One kept version and the experiment its run belongs to.
#[derive(Debug, Clone)]
pub struct VersionScope {
    /// The version as read from the source
    pub version: ModelVersion,
    /// Source experiment id of the version's run
    pub experiment_id: String,
}

/// One model of the scope with its kept versions (possibly none).
#[derive(Debug, Clone)]
pub struct ModelScope {
    /// The model as read from the source
    pub model: RegisteredModel,
    /// Kept versions in ascending version order
    pub versions: Vec<VersionScope>,
}

/// Everything one export writes.
#[derive(Debug, Clone, Default)]
pub struct ScopeSet {
    experiments: BTreeMap<String, ExperimentScope>,
    models: Vec<ModelScope>,
    failures: Vec<Failure>,
}

impl ScopeSet {
    /// Experiments keyed by source experiment id.
    #[must_use]
    pub const fn experiments(&self) -> &BTreeMap<String, ExperimentScope> {
        &self.experiments
    }

    /// Models in resolution order.
    #[must_use]
    pub fn models(&self) -> &[ModelScope] {
        &self.models
    }

    /// Models and versions that were dropped while resolving.
    #[must_use]
    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }

    /// Number of distinct runs across all experiments.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.experiments.values().map(|e| e.run_ids.len()).sum()
    }

    /// Number of kept versions across all models.
    #[must_use]
    pub fn version_count(&self) -> usize {
        self.models.iter().map(|m| m.versions.len()).sum()
    }

    /// Add one model and everything it pulls in.
    ///
    /// Model-level errors are returned; version-level problems (a run or
    /// experiment that cannot be read) drop just that version and are
    /// recorded in [`ScopeSet::failures`].
    fn add_model(
        &mut self,
        client: &dyn TrackingClient,
        name: &str,
        stages: &[Stage],
        export_all_runs: bool,
    ) -> Result<()> {
        let model = client.get_registered_model(name)?;
        let mut versions = Vec::new();

        for version in client.search_model_versions(name)? {
            if !stages.is_empty() && !stages.contains(&version.stage()) {
                continue;
            }
            let label = format!("{name}/{}", version.version());
            match self.add_version_run(client, &version, export_all_runs) {
                Ok(experiment_id) => versions.push(VersionScope {
                    version,
                    experiment_id,
                }),
                Err(e) => {
                    warn!(version = %label, error = %e, "dropping model version from export scope");
                    self.failures
                        .push(Failure::new(EntityKind::ModelVersion, label, &e));
                }
            }
        }

        debug!(model = name, versions = versions.len(), "resolved model");
        self.models.push(ModelScope { model, versions });
        Ok(())
    }

    fn add_version_run(
        &mut self,
        client: &dyn TrackingClient,
        version: &ModelVersion,
        export_all_runs: bool,
    ) -> Result<String> {
        let run = client.get_run(version.run_id())?;
        let experiment_id = run.experiment_id().to_string();

        if !self.experiments.contains_key(&experiment_id) {
            let experiment = client.get_experiment(&experiment_id)?;
            self.experiments.insert(
                experiment_id.clone(),
                ExperimentScope {
                    experiment,
                    run_ids: BTreeSet::new(),
                    all_runs_loaded: false,
                },
            );
        }

        let scope = self
            .experiments
            .get_mut(&experiment_id)
            .ok_or_else(|| Error::not_found(EntityKind::Experiment, &experiment_id))?;
        if export_all_runs && !scope.all_runs_loaded {
            let runs = client.search_runs(std::slice::from_ref(&experiment_id))?;
            scope
                .run_ids
                .extend(runs.iter().map(|r| r.run_id().to_string()));
            scope.all_runs_loaded = true;
        }
        scope.run_ids.insert(run.run_id().to_string());
        Ok(experiment_id)
    }
}

/// Resolve the export scope of a batch.
///
/// Missing models are skipped and recorded; only a failure to list models for
/// [`ModelSelection::All`] aborts.
///
/// # Arguments
///
/// * `client` - Source backend
/// * `models` - Models to export
/// * `stages` - Stage filter; empty keeps every version
/// * `export_all_runs` - Export every run of referenced experiments
///
/// # Errors
///
/// Returns error if the model list itself cannot be resolved
pub fn resolve(
    client: &dyn TrackingClient,
    models: &ModelSelection,
    stages: &[Stage],
    export_all_runs: bool,
) -> Result<ScopeSet> {
    let mut scope = ScopeSet::default();
    for name in models.resolve(client)? {
        if let Err(e) = scope.add_model(client, &name, stages, export_all_runs) {
            warn!(model = %name, error = %e, "skipping model");
            scope
                .failures
                .push(Failure::new(EntityKind::RegisteredModel, name, &e));
        }
    }
    Ok(scope)
}

/// Resolve the scope of exactly one model.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if the model does not exist, or any backend
/// error raised while reading it
pub fn resolve_model(
    client: &dyn TrackingClient,
    name: &str,
    stages: &[Stage],
    export_all_runs: bool,
) -> Result<ScopeSet> {
    let mut scope = ScopeSet::default();
    scope.add_model(client, name, stages, export_all_runs)?;
    Ok(scope)
}
