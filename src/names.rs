//! Parsing of the comma-delimited option strings the bulk commands accept.

use std::collections::HashSet;
use std::str::FromStr;

use crate::tracking::{Stage, TrackingClient};
use crate::{Error, Result};

/// Which registered models a bulk export covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSelection {
    /// Every model visible to the caller (`*`).
    All,
    /// Exactly these names, in the given order. Duplicates are dropped when
    /// resolving.
    Names(Vec<String>),
}

impl ModelSelection {
    /// Expand into concrete names. `Names` keeps its order minus repeats;
    /// existence is not checked.
    ///
    /// # Errors
    ///
    /// Returns error if `All` is used and the backend cannot list models
    pub fn resolve(&self, client: &dyn TrackingClient) -> Result<Vec<String>> {
        match self {
            Self::All => Ok(client
                .search_registered_models()?
                .into_iter()
                .map(|m| m.name().to_string())
                .collect()),
            Self::Names(names) => {
                let mut seen = HashSet::new();
                Ok(names
                    .iter()
                    .filter(|name| seen.insert(name.as_str()))
                    .cloned()
                    .collect())
            }
        }
    }
}

impl FromStr for ModelSelection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim() == "*" {
            return Ok(Self::All);
        }
        let names = split_list(s);
        if names.is_empty() {
            return Err(Error::InvalidInput("no model names given".to_string()));
        }
        Ok(Self::Names(names))
    }
}

/// Resolve a model option string: `*` for every model, otherwise a
/// comma-delimited list of names.
///
/// # Errors
///
/// Returns error if the string is empty or the backend cannot list models
///
/// # Example
///
/// ```rust
/// use registry_transfer::names::get_model_names;
/// use registry_transfer::tracking::MemoryTracking;
///
/// let client = MemoryTracking::new();
/// let names = get_model_names(&client, "model1,model2,model3")?;
/// assert_eq!(names, vec!["model1", "model2", "model3"]);
/// # Ok::<(), registry_transfer::Error>(())
/// ```
pub fn get_model_names(client: &dyn TrackingClient, models: &str) -> Result<Vec<String>> {
    models.parse::<ModelSelection>()?.resolve(client)
}

/// Parse a comma-delimited stage list (`"production,staging"`).
///
/// An empty string means no filter and yields an empty list.
///
/// # Errors
///
/// Returns error on an unknown stage name
pub fn parse_stages(stages: &str) -> Result<Vec<Stage>> {
    let mut parsed: Vec<Stage> = split_list(stages)
        .iter()
        .map(|s| s.parse())
        .collect::<Result<_>>()?;
    parsed.sort();
    parsed.dedup();
    Ok(parsed)
}

/// Split on commas, trim, drop empty items and duplicates, keep first-seen order.
pub(crate) fn split_list(s: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in s.split(',').map(str::trim).filter(|i| !i.is_empty()) {
        if !out.iter().any(|seen| seen == item) {
            out.push(item.to_string());
        }
    }
    out
}
