//! Tracking backend schema and client capability surface
//!
//! ## Schema Overview
//!
//! ```text
//! ExperimentRecord (1) ──< RunRecord (N) ──< MetricRecord (N)
//!                              ^
//!                              │ run_id
//! RegisteredModel (1) ──< ModelVersion (N)
//! ```
//!
//! A backend is always injected through [`TrackingClient`]; migrations hold
//! two independent instances (source and destination).
//!
//! ## Usage
//!
//! ```rust
//! use registry_transfer::tracking::{MemoryTracking, NewRun, Tags, TrackingClient};
//!
//! let client = MemoryTracking::new();
//! let experiment_id = client.create_experiment("churn", &Tags::new())?;
//! let run = client.create_run(&experiment_id, NewRun::default())?;
//!
//! client.create_registered_model("churn-model", None, &Tags::new())?;
//! let source = format!("{}/model", run.artifact_uri());
//! let version = client.create_model_version("churn-model", &source, run.run_id(), None)?;
//! assert_eq!(version.version(), 1);
//! # Ok::<(), registry_transfer::Error>(())
//! ```

mod client;
mod experiment_record;
mod memory;
mod metric_record;
mod model_record;
mod run_record;
pub mod tags;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use client::{NewRun, TrackingClient};
pub use experiment_record::{ExperimentRecord, ExperimentRecordBuilder};
pub use memory::MemoryTracking;
pub use metric_record::{MetricRecord, MetricRecordBuilder};
pub use model_record::{ModelVersion, RegisteredModel, Stage};
pub use run_record::{RunRecord, RunRecordBuilder, RunStatus};
pub use tags::Tags;

/// The four entity kinds a tracking backend manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Named container of runs
    Experiment,
    /// Single recorded execution
    Run,
    /// Named, versioned model
    RegisteredModel,
    /// Numbered snapshot of a registered model
    ModelVersion,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Experiment => "Experiment",
            Self::Run => "Run",
            Self::RegisteredModel => "Registered model",
            Self::ModelVersion => "Model version",
        };
        f.write_str(s)
    }
}
