//! # registry-transfer: Model Registry Export/Import
//!
//! Copies registered models, their versions, and the runs and experiments
//! those versions point at from one tracking backend to another, through a
//! JSON directory tree.
//!
//! ## Pipeline
//!
//! ```text
//! source ─> scope::resolve ─> export ─> <tree> ─> import (+ remap) ─> destination
//! ```
//!
//! - **Scope**: which experiments/runs a set of models pulls in
//!   (`export_all_runs` picks whole experiments or just version runs)
//! - **Export**: experiments and runs first, models second
//! - **Import**: experiment -> run -> model -> version, with optional renames
//!
//! ## Example
//!
//! ```rust
//! use registry_transfer::config::{ExportOptions, ImportOptions};
//! use registry_transfer::names::ModelSelection;
//! use registry_transfer::tracking::{MemoryTracking, NewRun, Tags, TrackingClient};
//! use registry_transfer::{export_models, import_all};
//!
//! let source = MemoryTracking::new();
//! let exp = source.create_experiment("churn", &Tags::new())?;
//! let run = source.create_run(&exp, NewRun::default())?;
//! source.create_registered_model("churn-model", None, &Tags::new())?;
//! source.create_model_version("churn-model", &format!("{}/model", run.artifact_uri()), run.run_id(), None)?;
//!
//! let dir = std::env::temp_dir().join("registry-transfer-doc-lib");
//! # let _ = std::fs::remove_dir_all(&dir);
//! export_models(&source, &ExportOptions::builder(&dir, ModelSelection::All).build())?;
//!
//! let destination = MemoryTracking::new();
//! let report = import_all(&destination, &dir, &ImportOptions::default())?;
//! assert_eq!(report.transfer.versions.succeeded, 1);
//! # Ok::<(), registry_transfer::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod compare;
pub mod config;
pub mod error;
pub mod export;
pub mod import;
pub mod layout;
pub mod names;
pub mod notebook;
mod pool;
pub mod remap;
pub mod report;
pub mod scope;
pub mod tracking;

pub use error::{Error, ErrorCategory, Result};
pub use export::{export_model, export_models};
pub use import::{import_all, import_model};
