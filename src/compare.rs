//! Field-by-field comparison of a source run and its imported copy.
//!
//! Identity (run id, experiment id, artifact uri) is expected to differ and is
//! not compared; reserved tags are ignored.

use std::collections::BTreeSet;
use std::fmt;

use crate::tracking::{RunRecord, TrackingClient};
use crate::Result;

/// One mismatch between two runs.
#[derive(Debug, Clone, PartialEq)]
pub enum RunDifference {
    /// Final status differs
    Status {
        /// Source status
        source: String,
        /// Destination status
        destination: String,
    },
    /// Param missing on one side or with different values
    Param {
        /// Param key
        key: String,
        /// Source value
        source: Option<String>,
        /// Destination value
        destination: Option<String>,
    },
    /// Metric history of a key differs
    Metric {
        /// Metric key
        key: String,
    },
    /// User tag missing on one side or with different values
    Tag {
        /// Tag key
        key: String,
        /// Source value
        source: Option<String>,
        /// Destination value
        destination: Option<String>,
    },
}

impl fmt::Display for RunDifference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status { source, destination } => {
                write!(f, "status: {source} != {destination}")
            }
            Self::Param { key, source, destination } => {
                write!(f, "param {key}: {source:?} != {destination:?}")
            }
            Self::Metric { key } => write!(f, "metric {key}: history differs"),
            Self::Tag { key, source, destination } => {
                write!(f, "tag {key}: {source:?} != {destination:?}")
            }
        }
    }
}

/// Compare two runs; empty means equal.
#[must_use]
pub fn compare_runs(source: &RunRecord, destination: &RunRecord) -> Vec<RunDifference> {
    let mut diffs = Vec::new();

    if source.status() != destination.status() {
        diffs.push(RunDifference::Status {
            source: format!("{:?}", source.status()),
            destination: format!("{:?}", destination.status()),
        });
    }

    let keys: BTreeSet<&String> = source.params().keys().chain(destination.params().keys()).collect();
    for key in keys {
        let (a, b) = (source.params().get(key), destination.params().get(key));
        if a != b {
            diffs.push(RunDifference::Param {
                key: key.clone(),
                source: a.cloned(),
                destination: b.cloned(),
            });
        }
    }

    let metric_keys: BTreeSet<&str> = source
        .metrics()
        .iter()
        .chain(destination.metrics())
        .map(|m| m.key())
        .collect();
    for key in metric_keys {
        if metric_history(source, key) != metric_history(destination, key) {
            diffs.push(RunDifference::Metric { key: key.to_string() });
        }
    }

    let (src_tags, dst_tags) = (source.tags().user_tags(), destination.tags().user_tags());
    let tag_keys: BTreeSet<&str> = src_tags.iter().chain(dst_tags.iter()).map(|(k, _)| k).collect();
    for key in tag_keys {
        let (a, b) = (src_tags.get(key), dst_tags.get(key));
        if a != b {
            diffs.push(RunDifference::Tag {
                key: key.to_string(),
                source: a.map(str::to_string),
                destination: b.map(str::to_string),
            });
        }
    }

    diffs
}

/// Compare runs by id across two backends.
///
/// # Errors
///
/// Returns error if either run cannot be read
pub fn compare_run_ids(
    source: &dyn TrackingClient,
    source_run_id: &str,
    destination: &dyn TrackingClient,
    destination_run_id: &str,
) -> Result<Vec<RunDifference>> {
    let a = source.get_run(source_run_id)?;
    let b = destination.get_run(destination_run_id)?;
    Ok(compare_runs(&a, &b))
}

fn metric_history(run: &RunRecord, key: &str) -> Vec<(u64, u64)> {
    let mut history: Vec<(u64, u64)> = run
        .metrics()
        .iter()
        .filter(|m| m.key() == key)
        .map(|m| (m.step(), m.value().to_bits()))
        .collect();
    history.sort_unstable();
    history
}
