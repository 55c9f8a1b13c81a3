//! Outcome reports of export and import batches.
//!
//! Per-entity failures never abort a batch; they land here instead.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorCategory};
use crate::tracking::EntityKind;

/// One entity that could not be exported or imported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Kind of the failed entity
    pub kind: EntityKind,
    /// Name or id of the failed entity
    pub name: String,
    /// Error category
    pub category: ErrorCategory,
    /// Full error message
    pub message: String,
}

impl Failure {
    /// Record `error` against an entity.
    pub fn new(kind: EntityKind, name: impl Into<String>, error: &Error) -> Self {
        Self {
            kind,
            name: name.into(),
            category: error.category(),
            message: error.to_string(),
        }
    }
}

/// Created/skipped/failed counters of one entity kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCounts {
    /// Successfully written (export) or created (import)
    pub succeeded: usize,
    /// Intentionally not processed (duplicate, parent failed)
    pub skipped: usize,
    /// Attempted and failed
    pub failed: usize,
}

impl EntityCounts {
    fn merge(&mut self, other: Self) {
        self.succeeded += other.succeeded;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }

    /// Total processed entities.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }
}

/// Counters for all four entity kinds plus every failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReport {
    /// Experiment counters
    pub experiments: EntityCounts,
    /// Run counters
    pub runs: EntityCounts,
    /// Registered model counters
    pub models: EntityCounts,
    /// Model version counters
    pub versions: EntityCounts,
    /// Every recorded failure, in the order it happened within its unit
    pub failures: Vec<Failure>,
}

impl TransferReport {
    /// Counters for `kind`.
    #[must_use]
    pub const fn counts(&self, kind: EntityKind) -> &EntityCounts {
        match kind {
            EntityKind::Experiment => &self.experiments,
            EntityKind::Run => &self.runs,
            EntityKind::RegisteredModel => &self.models,
            EntityKind::ModelVersion => &self.versions,
        }
    }

    fn counts_mut(&mut self, kind: EntityKind) -> &mut EntityCounts {
        match kind {
            EntityKind::Experiment => &mut self.experiments,
            EntityKind::Run => &mut self.runs,
            EntityKind::RegisteredModel => &mut self.models,
            EntityKind::ModelVersion => &mut self.versions,
        }
    }

    /// Count a success.
    pub fn succeeded(&mut self, kind: EntityKind) {
        self.counts_mut(kind).succeeded += 1;
    }

    /// Count `n` skipped entities.
    pub fn skipped(&mut self, kind: EntityKind, n: usize) {
        self.counts_mut(kind).skipped += n;
    }

    /// Count a failure and keep its details.
    pub fn failed(&mut self, kind: EntityKind, name: impl Into<String>, error: &Error) {
        self.counts_mut(kind).failed += 1;
        self.failures.push(Failure::new(kind, name, error));
    }

    /// Count an already built failure.
    pub fn record(&mut self, failure: Failure) {
        self.counts_mut(failure.kind).failed += 1;
        self.failures.push(failure);
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: Self) {
        self.experiments.merge(other.experiments);
        self.runs.merge(other.runs);
        self.models.merge(other.models);
        self.versions.merge(other.versions);
        self.failures.extend(other.failures);
    }

    /// True if nothing failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Failures of one category.
    pub fn failures_of(&self, category: ErrorCategory) -> impl Iterator<Item = &Failure> {
        self.failures.iter().filter(move |f| f.category == category)
    }
}

/// Result of an export batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportReport {
    /// Root of the written tree
    pub output_dir: PathBuf,
    /// Per-kind counters and failures
    #[serde(flatten)]
    pub transfer: TransferReport,
}

/// Result of an import batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    /// Root of the consumed tree
    pub input_dir: PathBuf,
    /// Per-kind counters and failures
    #[serde(flatten)]
    pub transfer: TransferReport,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_records_category() {
        let mut report = TransferReport::default();
        report.failed(
            EntityKind::RegisteredModel,
            "m",
            &Error::already_exists(EntityKind::RegisteredModel, "m"),
        );
        assert_eq!(report.models.failed, 1);
        assert_eq!(report.failures_of(ErrorCategory::AlreadyExists).count(), 1);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_merge_adds_counts() {
        let mut a = TransferReport::default();
        a.succeeded(EntityKind::Run);
        let mut b = TransferReport::default();
        b.succeeded(EntityKind::Run);
        b.skipped(EntityKind::Run, 2);
        a.merge(b);
        assert_eq!(a.runs.succeeded, 2);
        assert_eq!(a.runs.skipped, 2);
        assert_eq!(a.counts(EntityKind::Run).total(), 4);
    }
}
