//! Exporter: source backend -> export tree
//!
//! Two passes, strictly ordered:
//!
//! 1. experiments with their runs (one unit per experiment, optionally on a
//!    worker pool)
//! 2. models with their versions (serial, only after every experiment unit
//!    has been written)
//!
//! A version is written only if its run made it to disk in pass 1. Units left
//! in the output directory by an earlier export are removed first.

use std::collections::HashMap;
use std::fs;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::ExportOptions;
use crate::layout::{
    DirNames, ExperimentEntry, ExportManifest, ExportTree, ExportedExperiment, ExportedModel,
    ExportedVersion, ModelEntry,
};
use crate::notebook::{NotebookFormat, NotebookSource};
use crate::pool::run_units;
use crate::report::{ExportReport, TransferReport};
use crate::scope::{self, ExperimentScope, ModelScope, ScopeSet};
use crate::tracking::tags::keys;
use crate::tracking::{EntityKind, RunRecord, TrackingClient};
use crate::{Error, Result};

/// Outcome of one experiment unit.
struct ExperimentOutcome {
    entry: Option<ExperimentEntry>,
    /// Source run id -> artifact uri, for runs that are on disk
    runs: Vec<(String, String)>,
    report: TransferReport,
}

/// Writes a resolved scope to an export tree.
pub struct Exporter<'a> {
    client: &'a dyn TrackingClient,
    notebooks: Option<&'a dyn NotebookSource>,
    options: &'a ExportOptions,
    tree: ExportTree,
}

impl<'a> Exporter<'a> {
    /// Exporter reading from `client`.
    #[must_use]
    pub fn new(client: &'a dyn TrackingClient, options: &'a ExportOptions) -> Self {
        Self {
            client,
            notebooks: None,
            options,
            tree: ExportTree::new(&options.output_dir),
        }
    }

    /// Fetch notebook snapshots from `source` for notebook-produced runs.
    #[must_use]
    pub fn with_notebooks(mut self, source: &'a dyn NotebookSource) -> Self {
        self.notebooks = Some(source);
        self
    }

    /// Resolve the scope of `options.models` and export it.
    ///
    /// # Errors
    ///
    /// Returns error only if the model list cannot be resolved or the output
    /// directory cannot be created; per-entity failures are in the report
    pub fn run(&self) -> Result<ExportReport> {
        let scope = scope::resolve(
            self.client,
            &self.options.models,
            &self.options.stages,
            self.options.export_all_runs,
        )?;
        self.export_scope(&scope)
    }

    /// Export an already resolved scope, replacing any previous export tree
    /// under the output directory.
    ///
    /// # Errors
    ///
    /// Returns error if the output directory cannot be created or the
    /// manifests cannot be written
    pub fn export_scope(&self, scope: &ScopeSet) -> Result<ExportReport> {
        let started_at = Utc::now();
        fs::create_dir_all(self.tree.root())?;
        self.tree.reset()?;
        let notebook_formats = self.effective_notebook_formats();
        info!(
            output_dir = %self.tree.root().display(),
            experiments = scope.experiments().len(),
            runs = scope.run_count(),
            models = scope.models().len(),
            versions = scope.version_count(),
            "exporting models"
        );

        let mut report = TransferReport::default();
        for failure in scope.failures() {
            report.record(failure.clone());
        }

        let experiments: Vec<&ExperimentScope> = scope.experiments().values().collect();
        let outcomes = run_units(self.options.parallelism, &experiments, |e| {
            self.export_experiment(e)
        })?;

        let mut entries = Vec::new();
        let mut exported_runs: HashMap<String, String> = HashMap::new();
        for outcome in outcomes {
            entries.extend(outcome.entry);
            exported_runs.extend(outcome.runs);
            report.merge(outcome.report);
        }
        self.tree.write_experiment_manifest(&entries)?;

        let mut dirs = DirNames::new();
        let mut model_entries = Vec::new();
        for model in scope.models() {
            let dir = dirs.allocate(model.model.name());
            match self.export_model(model, &dir, &exported_runs, &mut report) {
                Ok(entry) => {
                    report.succeeded(EntityKind::RegisteredModel);
                    model_entries.push(entry);
                }
                Err(e) => {
                    warn!(model = model.model.name(), error = %e, "failed to export model");
                    report.failed(EntityKind::RegisteredModel, model.model.name(), &e);
                }
            }
        }
        self.tree.write_model_manifest(&model_entries)?;

        self.tree.write_manifest(&ExportManifest {
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            started_at,
            finished_at: Utc::now(),
            stages: self.options.stages.clone(),
            export_all_runs: self.options.export_all_runs,
            notebook_formats,
            report: report.clone(),
        })?;

        info!(
            experiments = report.experiments.succeeded,
            runs = report.runs.succeeded,
            models = report.models.succeeded,
            versions = report.versions.succeeded,
            failures = report.failures.len(),
            "export finished"
        );
        Ok(ExportReport {
            output_dir: self.tree.root().to_path_buf(),
            transfer: report,
        })
    }

    /// Formats that will actually be written; none without a source.
    fn effective_notebook_formats(&self) -> Vec<NotebookFormat> {
        if self.notebooks.is_none() && !self.options.notebook_formats.is_empty() {
            warn!(
                formats = ?self.options.notebook_formats,
                "notebook formats requested but no notebook source is attached; skipping notebooks"
            );
            return Vec::new();
        }
        self.options.notebook_formats.clone()
    }

    fn export_experiment(&self, scope: &ExperimentScope) -> ExperimentOutcome {
        let experiment = &scope.experiment;
        let mut report = TransferReport::default();
        let mut runs = Vec::new();
        let mut failed_run_ids = Vec::new();

        for run_id in &scope.run_ids {
            match self.export_run(experiment.experiment_id(), run_id) {
                Ok(run) => {
                    report.succeeded(EntityKind::Run);
                    runs.push((run_id.clone(), run.artifact_uri().to_string()));
                }
                Err(e) => {
                    warn!(run_id = %run_id, error = %e, "failed to export run");
                    report.failed(EntityKind::Run, run_id.clone(), &e);
                    failed_run_ids.push(run_id.clone());
                }
            }
        }

        let exported = ExportedExperiment {
            experiment: experiment.clone(),
            run_ids: runs.iter().map(|(id, _)| id.clone()).collect(),
            failed_run_ids,
            exported_at: Utc::now(),
        };
        match self.tree.write_experiment(&exported) {
            Ok(()) => {
                debug!(experiment = experiment.name(), runs = runs.len(), "exported experiment");
                report.succeeded(EntityKind::Experiment);
                ExperimentOutcome {
                    entry: Some(ExperimentEntry {
                        experiment_id: experiment.experiment_id().to_string(),
                        name: experiment.name().to_string(),
                        run_count: runs.len(),
                    }),
                    runs,
                    report,
                }
            }
            Err(e) => {
                warn!(experiment = experiment.name(), error = %e, "failed to export experiment");
                report.failed(EntityKind::Experiment, experiment.name(), &e);
                ExperimentOutcome {
                    entry: None,
                    runs: Vec::new(),
                    report,
                }
            }
        }
    }

    fn export_run(&self, experiment_id: &str, run_id: &str) -> Result<RunRecord> {
        let run = self.client.get_run(run_id)?;
        self.tree.write_run(experiment_id, run_id, &run)?;
        self.export_notebooks(experiment_id, &run);
        Ok(run)
    }

    fn export_notebooks(&self, experiment_id: &str, run: &RunRecord) {
        let (Some(source), Some(path)) = (self.notebooks, run.tags().get(keys::NOTEBOOK_PATH)) else {
            return;
        };
        for &format in &self.options.notebook_formats {
            let file = self.tree.notebook_file(experiment_id, run.run_id(), format);
            let written = source
                .export_notebook(path, format)
                .and_then(|bytes| {
                    if let Some(parent) = file.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    fs::write(&file, bytes).map_err(Error::from)
                });
            if let Err(e) = written {
                warn!(notebook = path, %format, error = %e, "failed to export notebook");
            }
        }
    }

    fn export_model(
        &self,
        scope: &ModelScope,
        dir: &str,
        exported_runs: &HashMap<String, String>,
        report: &mut TransferReport,
    ) -> Result<ModelEntry> {
        let name = scope.model.name();
        let mut versions = Vec::new();
        for v in &scope.versions {
            let label = format!("{name}/{}", v.version.version());
            match exported_runs.get(v.version.run_id()) {
                Some(artifact_uri) => versions.push(ExportedVersion {
                    version: v.version.clone(),
                    experiment_id: v.experiment_id.clone(),
                    run_artifact_uri: artifact_uri.clone(),
                }),
                None => {
                    let e = Error::not_found(EntityKind::Run, v.version.run_id());
                    warn!(version = %label, error = %e, "run of version was not exported");
                    report.failed(EntityKind::ModelVersion, label, &e);
                }
            }
        }

        let exported = ExportedModel {
            model: scope.model.clone(),
            versions,
            exported_at: Utc::now(),
        };
        self.tree.write_model(dir, &exported)?;
        for _ in &exported.versions {
            report.succeeded(EntityKind::ModelVersion);
        }
        debug!(model = name, versions = exported.versions.len(), "exported model");

        Ok(ModelEntry {
            name: name.to_string(),
            dir: dir.to_string(),
            version_count: exported.versions.len(),
        })
    }
}

/// Export the models selected by `options` from `client`.
///
/// Missing models and per-entity failures are recorded in the report and do
/// not stop the batch.
///
/// # Errors
///
/// Returns error if the model list cannot be resolved or the tree cannot be
/// created
///
/// # Example
///
/// ```rust
/// use registry_transfer::config::ExportOptions;
/// use registry_transfer::export::export_models;
/// use registry_transfer::names::ModelSelection;
/// use registry_transfer::tracking::MemoryTracking;
///
/// let dir = std::env::temp_dir().join("registry-transfer-doc-export");
/// let client = MemoryTracking::new();
/// let options = ExportOptions::builder(&dir, ModelSelection::All).build();
/// let report = export_models(&client, &options)?;
/// assert!(report.transfer.is_clean());
/// # Ok::<(), registry_transfer::Error>(())
/// ```
pub fn export_models(client: &dyn TrackingClient, options: &ExportOptions) -> Result<ExportReport> {
    Exporter::new(client, options).run()
}

/// Export exactly one model, ignoring `options.models`.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if the model does not exist
pub fn export_model(
    client: &dyn TrackingClient,
    model_name: &str,
    options: &ExportOptions,
) -> Result<ExportReport> {
    let scope = scope::resolve_model(
        client,
        model_name,
        &options.stages,
        options.export_all_runs,
    )?;
    Exporter::new(client, options).export_scope(&scope)
}
