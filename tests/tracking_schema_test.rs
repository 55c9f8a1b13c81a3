//! Tracking schema tests: records, serialization and the in-memory backend.

use chrono::{TimeZone, Utc};
use registry_transfer::tracking::{
    ExperimentRecord, MemoryTracking, MetricRecord, ModelVersion, NewRun, RegisteredModel,
    RunRecord, RunStatus, Stage, Tags, TrackingClient,
};

// =============================================================================
// ExperimentRecord Tests
// =============================================================================

#[test]
fn test_experiment_record_creation() {
    let record = ExperimentRecord::new("1", "My Experiment");

    assert_eq!(record.experiment_id(), "1");
    assert_eq!(record.name(), "My Experiment");
    assert!(record.created_at().timestamp() > 0);
    assert!(record.tags().is_empty());
}

#[test]
fn test_experiment_record_serialization() {
    let created = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let record = ExperimentRecord::builder("7", "churn")
        .artifact_location("memory://x/7")
        .tags(Tags::new().with("team", "risk"))
        .created_at(created)
        .build();

    let json = serde_json::to_string(&record).unwrap();
    let back: ExperimentRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(back, record);
    assert_eq!(back.tags().get("team"), Some("risk"));
}

// =============================================================================
// RunRecord Tests
// =============================================================================

#[test]
fn test_run_record_lifecycle() {
    let mut run = RunRecord::new("r1", "1");
    assert_eq!(run.status(), RunStatus::Running);
    assert!(run.ended_at().is_none());

    assert!(run.log_param("lr", "0.1"));
    assert!(run.log_param("lr", "0.1"));
    assert!(!run.log_param("lr", "0.2"));
    assert_eq!(run.params().get("lr").map(String::as_str), Some("0.1"));

    run.log_metric(MetricRecord::new("loss", 0, 1.0));
    run.log_metric(MetricRecord::new("loss", 1, 0.5));
    assert_eq!(run.metrics().len(), 2);

    run.complete(RunStatus::Killed, None);
    assert_eq!(run.status(), RunStatus::Killed);
    assert!(run.status().is_terminal());
    assert!(run.ended_at().is_some());
}

#[test]
fn test_run_status_serialization() {
    let json = serde_json::to_string(&RunStatus::Finished).unwrap();
    let back: RunStatus = serde_json::from_str(&json).unwrap();
    assert_eq!(back, RunStatus::Finished);
    assert!(!RunStatus::Scheduled.is_terminal());
}

// =============================================================================
// Model Tests
// =============================================================================

#[test]
fn test_model_version_stage() {
    let mut version = ModelVersion::new("m", 3, "memory://x/model", "r1", None);
    assert_eq!(version.stage(), Stage::None);
    version.set_stage(Stage::Production);
    assert_eq!(version.stage(), Stage::Production);
    assert_eq!(version.version(), 3);
}

#[test]
fn test_registered_model_fields() {
    let model = RegisteredModel::new("m", Some("desc".to_string()), Tags::new().with("k", "v"));
    assert_eq!(model.name(), "m");
    assert_eq!(model.description(), Some("desc"));
    assert_eq!(model.tags().len(), 1);
}

// =============================================================================
// MemoryTracking Tests
// =============================================================================

#[test]
fn test_latest_versions_one_per_stage() {
    let client = MemoryTracking::new();
    let exp = client.create_experiment("e", &Tags::new()).unwrap();
    let run = client.create_run(&exp, NewRun::default()).unwrap();
    client.create_registered_model("m", None, &Tags::new()).unwrap();
    for stage in [Stage::Production, Stage::Production, Stage::Staging, Stage::None] {
        let v = client.create_model_version("m", "src", run.run_id(), None).unwrap();
        client
            .transition_model_version_stage("m", v.version(), stage)
            .unwrap();
    }

    let latest = client.get_latest_versions("m", &[]).unwrap();
    let pairs: Vec<(Stage, u64)> = latest.iter().map(|v| (v.stage(), v.version())).collect();
    assert_eq!(
        pairs,
        vec![(Stage::None, 4), (Stage::Staging, 3), (Stage::Production, 2)]
    );

    let production = client.get_latest_versions("m", &[Stage::Production]).unwrap();
    assert_eq!(production.len(), 1);
    assert_eq!(production[0].version(), 2);
}

#[test]
fn test_two_backends_never_share_run_ids() {
    let a = MemoryTracking::new();
    let b = MemoryTracking::new();
    let ea = a.create_experiment("e", &Tags::new()).unwrap();
    let eb = b.create_experiment("e", &Tags::new()).unwrap();
    assert_eq!(ea, eb);

    let ra = a.create_run(&ea, NewRun::default()).unwrap();
    let rb = b.create_run(&eb, NewRun::default()).unwrap();
    assert_ne!(ra.run_id(), rb.run_id());
    assert_ne!(ra.artifact_uri(), rb.artifact_uri());
}
