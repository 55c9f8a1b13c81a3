//! Single-model export/import, notebook snapshots and store snapshots.

use std::collections::BTreeMap;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};

use registry_transfer::config::{ExportOptions, ImportOptions};
use registry_transfer::export::Exporter;
use registry_transfer::layout::ExportTree;
use registry_transfer::names::ModelSelection;
use registry_transfer::notebook::{NotebookFormat, NotebookSource};
use registry_transfer::remap::NameMap;
use registry_transfer::tracking::tags::keys;
use registry_transfer::tracking::{
    MemoryTracking, MetricRecord, NewRun, RunStatus, Stage, Tags, TrackingClient,
};
use registry_transfer::{
    export_model, export_models, import_all, import_model, Error, ErrorCategory, Result,
};
use tempfile::TempDir;

/// One experiment, `runs` finished runs, one version per run; the last
/// version is promoted to production.
fn seed(client: &MemoryTracking, model: &str, runs: usize) -> Vec<String> {
    let exp = client
        .create_experiment(&format!("{model}-training"), &Tags::new())
        .unwrap();
    client.create_registered_model(model, None, &Tags::new()).unwrap();
    let mut run_ids = Vec::new();
    for i in 0..runs {
        let run = client
            .create_run(
                &exp,
                NewRun {
                    tags: Tags::new().with(keys::NOTEBOOK_PATH, "/Users/alice/train"),
                    ..NewRun::default()
                },
            )
            .unwrap();
        let mut params = BTreeMap::new();
        params.insert("alpha".to_string(), format!("0.{i}"));
        client
            .log_batch(run.run_id(), &params, &[MetricRecord::new("auc", 0, 0.8)], &Tags::new())
            .unwrap();
        client
            .set_terminated(run.run_id(), RunStatus::Finished, None)
            .unwrap();
        let version = client
            .create_model_version(model, &format!("{}/model", run.artifact_uri()), run.run_id(), None)
            .unwrap();
        if i + 1 == runs {
            client
                .transition_model_version_stage(model, version.version(), Stage::Production)
                .unwrap();
        }
        run_ids.push(run.run_id().to_string());
    }
    run_ids
}

// =============================================================================
// Single mode
// =============================================================================

#[test]
fn test_export_model_single_mode() {
    let source = MemoryTracking::new();
    let dir = TempDir::new().unwrap();
    seed(&source, "churn", 2);
    seed(&source, "fraud", 1);

    let options = ExportOptions::builder(dir.path(), ModelSelection::All).build();
    let report = export_model(&source, "churn", &options).unwrap();
    assert_eq!(report.transfer.models.succeeded, 1);
    assert_eq!(report.transfer.versions.succeeded, 2);

    let tree = ExportTree::new(dir.path());
    let models = tree.model_units().unwrap();
    assert_eq!(models.len(), 1);
    assert_eq!(models[0].model.name(), "churn");
}

#[test]
fn test_export_model_missing_aborts() {
    let source = MemoryTracking::new();
    let dir = TempDir::new().unwrap();
    let options = ExportOptions::builder(dir.path(), ModelSelection::All).build();

    let err = export_model(&source, "ghost", &options).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_import_model_uses_previously_imported_runs() {
    let source = MemoryTracking::new();
    let destination = MemoryTracking::new();
    let dir = TempDir::new().unwrap();
    seed(&source, "churn", 2);

    let options = ExportOptions::builder(dir.path(), ModelSelection::All).build();
    export_models(&source, &options).unwrap();
    import_all(&destination, dir.path(), &ImportOptions::default()).unwrap();
    destination.delete_registered_model("churn").unwrap();

    let report = import_model(&destination, dir.path(), "churn", &ImportOptions::default()).unwrap();
    assert_eq!(report.transfer.versions.succeeded, 2);
    let latest = destination
        .get_latest_versions("churn", &[Stage::Production])
        .unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].version(), 2);
    let run = destination.get_run(latest[0].run_id()).unwrap();
    assert!(run.tags().get(keys::SOURCE_RUN_ID).is_some());
}

#[test]
fn test_import_model_without_runs_records_version_failures() {
    let source = MemoryTracking::new();
    let destination = MemoryTracking::new();
    let dir = TempDir::new().unwrap();
    seed(&source, "churn", 1);
    export_models(&source, &ExportOptions::builder(dir.path(), ModelSelection::All).build()).unwrap();

    let report = import_model(&destination, dir.path(), "churn", &ImportOptions::default()).unwrap();
    assert_eq!(report.transfer.models.succeeded, 1);
    assert_eq!(report.transfer.versions.failed, 1);
    assert!(destination.search_model_versions("churn").unwrap().is_empty());
}

#[test]
fn test_import_model_rejects_ambiguous_source_runs() {
    let source = MemoryTracking::new();
    let destination = MemoryTracking::new();
    let dir = TempDir::new().unwrap();
    seed(&source, "churn", 1);
    export_models(&source, &ExportOptions::builder(dir.path(), ModelSelection::All).build()).unwrap();

    import_all(&destination, dir.path(), &ImportOptions::default()).unwrap();
    let renamed = ImportOptions::builder()
        .experiment_renames(NameMap::new().with("churn-training", "churn-training-copy"))
        .build();
    import_all(&destination, dir.path(), &renamed).unwrap();
    assert_eq!(destination.run_count(), 2);
    destination.delete_registered_model("churn").unwrap();

    let report = import_model(&destination, dir.path(), "churn", &ImportOptions::default()).unwrap();
    assert_eq!(report.transfer.versions.failed, 1);
    assert_eq!(report.transfer.failures[0].category, ErrorCategory::InvalidInput);
    assert!(destination.search_model_versions("churn").unwrap().is_empty());
}

#[test]
fn test_import_model_missing_from_tree() {
    let destination = MemoryTracking::new();
    let dir = TempDir::new().unwrap();
    export_models(
        &MemoryTracking::new(),
        &ExportOptions::builder(dir.path(), ModelSelection::All).build(),
    )
    .unwrap();

    let err = import_model(&destination, dir.path(), "ghost", &ImportOptions::default()).unwrap_err();
    assert!(err.is_not_found());
}

// =============================================================================
// Notebooks
// =============================================================================

#[test]
fn test_notebook_formats_without_source_are_not_recorded() {
    let source = MemoryTracking::new();
    let dir = TempDir::new().unwrap();
    let run_ids = seed(&source, "churn", 1);

    let options = ExportOptions::builder(dir.path(), ModelSelection::All)
        .notebook_formats(vec![NotebookFormat::Source, NotebookFormat::Dbc])
        .build();
    export_models(&source, &options).unwrap();

    let tree = ExportTree::new(dir.path());
    let manifest = tree.read_manifest().unwrap().unwrap();
    assert!(manifest.notebook_formats.is_empty());
    let experiment_id = source.get_run(&run_ids[0]).unwrap().experiment_id().to_string();
    let file = tree.notebook_file(&experiment_id, &run_ids[0], NotebookFormat::Source);
    assert!(!file.exists());
}

struct FakeNotebooks {
    calls: AtomicUsize,
}

impl NotebookSource for FakeNotebooks {
    fn export_notebook(&self, path: &str, format: NotebookFormat) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{path} as {format}").into_bytes())
    }
}

struct BrokenNotebooks;

impl NotebookSource for BrokenNotebooks {
    fn export_notebook(&self, _path: &str, _format: NotebookFormat) -> Result<Vec<u8>> {
        Err(Error::Unavailable("workspace api down".to_string()))
    }
}

#[test]
fn test_notebook_snapshots_written_per_format() {
    let source = MemoryTracking::new();
    let dir = TempDir::new().unwrap();
    let run_ids = seed(&source, "churn", 2);

    let options = ExportOptions::builder(dir.path(), ModelSelection::All)
        .notebook_formats(NotebookFormat::parse_list("SOURCE,DBC").unwrap())
        .build();
    let notebooks = FakeNotebooks {
        calls: AtomicUsize::new(0),
    };
    let report = Exporter::new(&source, &options)
        .with_notebooks(&notebooks)
        .run()
        .unwrap();
    assert!(report.transfer.is_clean());
    assert_eq!(notebooks.calls.load(Ordering::SeqCst), 4);

    let tree = ExportTree::new(dir.path());
    let experiment_id = source.get_run(&run_ids[0]).unwrap().experiment_id().to_string();
    let file = tree.notebook_file(&experiment_id, &run_ids[0], NotebookFormat::Dbc);
    assert_eq!(fs::read_to_string(file).unwrap(), "/Users/alice/train as DBC");
}

#[test]
fn test_notebook_failure_does_not_fail_run() {
    let source = MemoryTracking::new();
    let destination = MemoryTracking::new();
    let dir = TempDir::new().unwrap();
    seed(&source, "churn", 1);

    let options = ExportOptions::builder(dir.path(), ModelSelection::All)
        .notebook_formats(vec![NotebookFormat::Source])
        .build();
    let report = Exporter::new(&source, &options)
        .with_notebooks(&BrokenNotebooks)
        .run()
        .unwrap();
    assert!(report.transfer.is_clean());
    assert_eq!(report.transfer.runs.succeeded, 1);

    let imported = import_all(&destination, dir.path(), &ImportOptions::default()).unwrap();
    assert!(imported.transfer.is_clean());
}

// =============================================================================
// Store snapshots
// =============================================================================

#[test]
fn test_snapshot_stores_round_trip() {
    let work = TempDir::new().unwrap();
    let source_file = work.path().join("source.json");
    let destination_file = work.path().join("destination.json");
    let tree = work.path().join("export");

    let source = MemoryTracking::new();
    seed(&source, "churn", 2);
    source.save(&source_file).unwrap();

    let source = MemoryTracking::load(&source_file).unwrap();
    let options = ExportOptions::builder(&tree, ModelSelection::All).build();
    export_models(&source, &options).unwrap();

    let destination = MemoryTracking::open(&destination_file).unwrap();
    assert!(destination.is_empty());
    import_all(&destination, &tree, &ImportOptions::default()).unwrap();
    destination.save(&destination_file).unwrap();

    let reloaded = MemoryTracking::load(&destination_file).unwrap();
    assert_eq!(reloaded.experiment_count(), 1);
    assert_eq!(reloaded.run_count(), 2);
    assert_eq!(reloaded.search_model_versions("churn").unwrap().len(), 2);
    assert_ne!(reloaded.artifact_root(), source.artifact_root());
}

#[test]
fn test_export_manifest_written_last() {
    let source = MemoryTracking::new();
    let dir = TempDir::new().unwrap();
    seed(&source, "churn", 1);

    let options = ExportOptions::builder(dir.path(), ModelSelection::All)
        .export_all_runs(true)
        .build();
    export_models(&source, &options).unwrap();

    let manifest = ExportTree::new(dir.path()).read_manifest().unwrap().unwrap();
    assert!(manifest.export_all_runs);
    assert_eq!(manifest.report.models.succeeded, 1);
    assert!(manifest.finished_at >= manifest.started_at);
}
