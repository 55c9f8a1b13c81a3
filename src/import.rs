//! Importer: export tree -> destination backend
//!
//! Replays units in dependency order. Every experiment unit (experiment, then
//! its runs) finishes before the first model unit (model, then its versions)
//! starts, so a version is never created before its run exists.
//!
//! Names go through the [`NameRemap`](crate::remap::NameRemap) exactly once,
//! when the destination entity is created.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use tracing::{debug, info, warn};

use crate::config::ImportOptions;
use crate::layout::{ExportTree, ExportedExperiment, ExportedModel};
use crate::pool::run_units;
use crate::remap::NameRemap;
use crate::report::{ImportReport, TransferReport};
use crate::tracking::tags::keys;
use crate::tracking::{
    EntityKind, NewRun, RegisteredModel, RunRecord, Stage, Tags, TrackingClient,
};
use crate::{Error, Result};

/// A run as created on the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedRun {
    /// Destination run id
    pub run_id: String,
    /// Destination artifact uri
    pub artifact_uri: String,
}

/// Source run id -> destination run.
#[derive(Debug, Clone, Default)]
pub struct RunMap {
    runs: HashMap<String, ImportedRun>,
    /// Source run ids with more than one destination run
    ambiguous: HashSet<String>,
}

impl RunMap {
    /// Rebuild the map from the traceability tags of every destination run.
    ///
    /// A source run id carried by several destination runs (an earlier
    /// import under another experiment name, say) is marked ambiguous and
    /// never resolves.
    ///
    /// # Errors
    ///
    /// Returns error if the destination cannot be searched
    pub fn from_destination(client: &dyn TrackingClient) -> Result<Self> {
        let ids: Vec<String> = client
            .search_experiments()?
            .iter()
            .map(|e| e.experiment_id().to_string())
            .collect();
        let mut map = Self::default();
        for run in client.search_runs(&ids)? {
            if let Some(source) = run.tags().get(keys::SOURCE_RUN_ID) {
                let previous = map.runs.insert(
                    source.to_string(),
                    ImportedRun {
                        run_id: run.run_id().to_string(),
                        artifact_uri: run.artifact_uri().to_string(),
                    },
                );
                if previous.is_some() && map.ambiguous.insert(source.to_string()) {
                    warn!(source_run_id = source, "several destination runs were imported from one source run");
                }
            }
        }
        Ok(map)
    }

    /// Destination run of a source run id; `None` if unknown or ambiguous.
    #[must_use]
    pub fn get(&self, source_run_id: &str) -> Option<&ImportedRun> {
        if self.ambiguous.contains(source_run_id) {
            return None;
        }
        self.runs.get(source_run_id)
    }

    /// Destination run of a source run id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the run was never imported, or
    /// [`Error::InvalidInput`] if several destination runs claim it
    pub fn resolve(&self, source_run_id: &str) -> Result<&ImportedRun> {
        if self.ambiguous.contains(source_run_id) {
            return Err(Error::InvalidInput(format!(
                "source run {source_run_id} maps to several destination runs"
            )));
        }
        self.runs
            .get(source_run_id)
            .ok_or_else(|| Error::not_found(EntityKind::Run, source_run_id))
    }

    /// Number of mapped source runs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// True if no run is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

/// Rewrite a version source from the source run's artifact root to the
/// destination run's. Sources outside the run's artifacts are kept.
#[must_use]
pub fn rewrite_source(source: &str, src_artifact_uri: &str, dst_artifact_uri: &str) -> String {
    match source.strip_prefix(src_artifact_uri) {
        Some(rest) if !src_artifact_uri.is_empty() && (rest.is_empty() || rest.starts_with('/')) => {
            format!("{dst_artifact_uri}{rest}")
        }
        _ => source.to_string(),
    }
}

/// Replays an export tree against a destination backend.
pub struct Importer<'a> {
    client: &'a dyn TrackingClient,
    options: &'a ImportOptions,
    tree: ExportTree,
}

impl<'a> Importer<'a> {
    /// Importer writing to `client` from the tree at `input_dir`.
    #[must_use]
    pub fn new(client: &'a dyn TrackingClient, input_dir: impl AsRef<Path>, options: &'a ImportOptions) -> Self {
        Self {
            client,
            options,
            tree: ExportTree::new(input_dir.as_ref()),
        }
    }

    fn check_input(&self) -> Result<()> {
        if self.tree.root().is_dir() {
            Ok(())
        } else {
            Err(Error::InvalidInput(format!(
                "input directory {} does not exist",
                self.tree.root().display()
            )))
        }
    }

    /// Import every experiment unit, then every model unit.
    ///
    /// # Errors
    ///
    /// Returns error only if the input tree is missing or unreadable;
    /// per-entity failures are in the report
    pub fn run(&self) -> Result<ImportReport> {
        self.check_input()?;
        let experiments = self.tree.experiment_units()?;
        let models = self.tree.model_units()?;
        info!(
            input_dir = %self.tree.root().display(),
            experiments = experiments.len(),
            models = models.len(),
            "importing models"
        );

        let mut report = TransferReport::default();
        let claims = claim_runs(&experiments);
        let outcomes = run_units(self.options.parallelism, &experiments, |unit| {
            let claimed = claims.get(unit.experiment.experiment_id());
            self.import_experiment(unit, claimed)
        })?;

        let mut run_map = RunMap::default();
        for (runs, unit_report) in outcomes {
            run_map.runs.extend(runs);
            report.merge(unit_report);
        }
        debug!(runs = run_map.len(), "experiments imported");

        let owners = claim_model_names(&models, &self.options.remap);
        let units: Vec<(&ExportedModel, bool)> = models.iter().zip(owners).collect();
        let model_reports = run_units(self.options.parallelism, &units, |&(unit, owner)| {
            if owner {
                self.import_model_unit(unit, &run_map)
            } else {
                self.reject_duplicate_target(unit)
            }
        })?;
        for unit_report in model_reports {
            report.merge(unit_report);
        }

        info!(
            experiments = report.experiments.succeeded,
            runs = report.runs.succeeded,
            models = report.models.succeeded,
            versions = report.versions.succeeded,
            failures = report.failures.len(),
            "import finished"
        );
        Ok(ImportReport {
            input_dir: self.tree.root().to_path_buf(),
            transfer: report,
        })
    }

    /// Import one exported model whose runs were imported earlier.
    ///
    /// Destination runs are located through their source-run-id tag.
    ///
    /// # Errors
    ///
    /// Returns error if the model is not in the tree or the destination model
    /// cannot be (re)created; version failures are in the report
    pub fn import_model(&self, model_name: &str) -> Result<ImportReport> {
        self.check_input()?;
        let unit = self.tree.read_model(model_name)?;
        let run_map = RunMap::from_destination(self.client)?;
        let mut report = TransferReport::default();
        self.replay_model(&unit, &run_map, &mut report)?;
        report.succeeded(EntityKind::RegisteredModel);
        Ok(ImportReport {
            input_dir: self.tree.root().to_path_buf(),
            transfer: report,
        })
    }

    fn import_experiment(
        &self,
        unit: &ExportedExperiment,
        claimed: Option<&HashSet<String>>,
    ) -> (Vec<(String, ImportedRun)>, TransferReport) {
        let mut report = TransferReport::default();
        let mut runs = Vec::new();
        let source_name = unit.experiment.name();
        let name = self.options.remap.remap(EntityKind::Experiment, source_name);

        let experiment_id = match self
            .client
            .create_experiment(name, unit.experiment.tags())
        {
            Ok(id) => id,
            Err(e) => {
                warn!(experiment = name, error = %e, "failed to create experiment");
                report.failed(EntityKind::Experiment, name, &e);
                report.skipped(EntityKind::Run, unit.run_ids.len());
                return (runs, report);
            }
        };
        report.succeeded(EntityKind::Experiment);
        debug!(experiment = name, source = source_name, id = %experiment_id, "created experiment");

        for run_id in &unit.run_ids {
            if !claimed.is_some_and(|c| c.contains(run_id)) {
                debug!(run_id = %run_id, "run already imported from another experiment");
                report.skipped(EntityKind::Run, 1);
                continue;
            }
            match self.import_run(unit, run_id, &experiment_id) {
                Ok(imported) => {
                    report.succeeded(EntityKind::Run);
                    runs.push((run_id.clone(), imported));
                }
                Err(e) => {
                    warn!(run_id = %run_id, error = %e, "failed to import run");
                    report.failed(EntityKind::Run, run_id.clone(), &e);
                }
            }
        }
        (runs, report)
    }

    fn import_run(
        &self,
        unit: &ExportedExperiment,
        source_run_id: &str,
        experiment_id: &str,
    ) -> Result<ImportedRun> {
        let source_experiment_id = unit.experiment.experiment_id();
        let run: RunRecord = self.tree.read_run(source_experiment_id, source_run_id)?;

        let mut tags = run.tags().clone();
        tags.insert(keys::SOURCE_RUN_ID, run.run_id());
        tags.insert(keys::SOURCE_EXPERIMENT_ID, source_experiment_id);
        let user_id = if self.options.use_src_user_id {
            run.user_id().map(str::to_string)
        } else {
            if let Some(user) = run.user_id() {
                tags.insert(keys::SOURCE_USER_ID, user);
            }
            None
        };

        let created = self.client.create_run(
            experiment_id,
            NewRun {
                user_id,
                started_at: Some(run.started_at()),
                tags,
            },
        )?;
        self.client
            .log_batch(created.run_id(), run.params(), run.metrics(), &Tags::new())?;
        if run.status().is_terminal() {
            self.client
                .set_terminated(created.run_id(), run.status(), run.ended_at())?;
        }

        Ok(ImportedRun {
            run_id: created.run_id().to_string(),
            artifact_uri: created.artifact_uri().to_string(),
        })
    }

    fn import_model_unit(&self, unit: &ExportedModel, run_map: &RunMap) -> TransferReport {
        let mut report = TransferReport::default();
        let name = self.options.remap.remap(EntityKind::RegisteredModel, unit.model.name());
        match self.replay_model(unit, run_map, &mut report) {
            Ok(_) => report.succeeded(EntityKind::RegisteredModel),
            Err(e) => {
                warn!(model = name, error = %e, "failed to import model");
                report.failed(EntityKind::RegisteredModel, name, &e);
                report.skipped(EntityKind::ModelVersion, unit.versions.len());
            }
        }
        report
    }

    /// A unit whose target name an earlier unit of this import already owns.
    /// The earlier model is left untouched, even with `delete_model_first`.
    fn reject_duplicate_target(&self, unit: &ExportedModel) -> TransferReport {
        let mut report = TransferReport::default();
        let name = self.options.remap.remap(EntityKind::RegisteredModel, unit.model.name());
        let e = Error::already_exists(EntityKind::RegisteredModel, name);
        warn!(model = name, source = unit.model.name(), error = %e, "model name already used by this import");
        report.failed(EntityKind::RegisteredModel, name, &e);
        report.skipped(EntityKind::ModelVersion, unit.versions.len());
        report
    }

    /// Model-level errors are returned; version-level errors go to `report`.
    fn replay_model(
        &self,
        unit: &ExportedModel,
        run_map: &RunMap,
        report: &mut TransferReport,
    ) -> Result<RegisteredModel> {
        let name = self.options.remap.remap(EntityKind::RegisteredModel, unit.model.name());

        if self.options.delete_model_first {
            match self.client.get_registered_model(name) {
                Ok(_) => {
                    info!(model = name, "deleting existing destination model");
                    self.client.delete_registered_model(name)?;
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }

        let model = self
            .client
            .create_registered_model(name, unit.model.description(), unit.model.tags())?;

        let mut versions: Vec<_> = unit.versions.iter().collect();
        versions.sort_by_key(|v| v.version.version());
        for exported in versions {
            let source = &exported.version;
            let label = format!("{}/{}", unit.model.name(), source.version());
            let created = run_map
                .resolve(source.run_id())
                .and_then(|run| {
                    let path = rewrite_source(source.source(), &exported.run_artifact_uri, &run.artifact_uri);
                    let version = self
                        .client
                        .create_model_version(name, &path, &run.run_id, source.description())?;
                    if source.stage() != Stage::None {
                        self.client
                            .transition_model_version_stage(name, version.version(), source.stage())?;
                    }
                    Ok(version)
                });
            match created {
                Ok(version) => {
                    debug!(model = name, source_version = %label, version = version.version(), "created version");
                    report.succeeded(EntityKind::ModelVersion);
                }
                Err(e) => {
                    warn!(version = %label, error = %e, "failed to import model version");
                    report.failed(EntityKind::ModelVersion, label, &e);
                }
            }
        }
        Ok(model)
    }
}

/// Assign each source run id to the first experiment unit (in tree order)
/// that lists it.
fn claim_runs(units: &[ExportedExperiment]) -> HashMap<String, HashSet<String>> {
    let mut seen = HashSet::new();
    let mut claims: HashMap<String, HashSet<String>> = HashMap::new();
    for unit in units {
        let claimed = claims
            .entry(unit.experiment.experiment_id().to_string())
            .or_default();
        for run_id in &unit.run_ids {
            if seen.insert(run_id.clone()) {
                claimed.insert(run_id.clone());
            }
        }
    }
    claims
}

/// Flag, per model unit in tree order, whether it owns its destination name.
/// The first unit mapping to a name owns it.
fn claim_model_names(units: &[ExportedModel], remap: &NameRemap) -> Vec<bool> {
    let mut seen = HashSet::new();
    units
        .iter()
        .map(|unit| seen.insert(remap.remap(EntityKind::RegisteredModel, unit.model.name())))
        .collect()
}

/// Import a whole export tree into `client`.
///
/// # Errors
///
/// Returns error only if the input tree is missing or unreadable; per-entity
/// failures (including name collisions) are in the report
pub fn import_all(
    client: &dyn TrackingClient,
    input_dir: impl AsRef<Path>,
    options: &ImportOptions,
) -> Result<ImportReport> {
    Importer::new(client, input_dir, options).run()
}

/// Import one model of an export tree whose runs are already on `client`.
///
/// # Errors
///
/// Returns error if the model is not in the tree or cannot be created
pub fn import_model(
    client: &dyn TrackingClient,
    input_dir: impl AsRef<Path>,
    model_name: &str,
    options: &ImportOptions,
) -> Result<ImportReport> {
    Importer::new(client, input_dir, options).import_model(model_name)
}
