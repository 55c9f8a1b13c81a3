//! Rename tables applied while importing.
//!
//! Lookup is exact-match; a name missing from its table is kept as-is.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::tracking::EntityKind;
use crate::{Error, Result};

/// One rename table: original name -> replacement name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NameMap(BTreeMap<String, String>);

impl NameMap {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rename.
    #[must_use]
    pub fn with(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.0.insert(from.into(), to.into());
        self
    }

    /// Parse `old=new,old2=new2`.
    ///
    /// # Errors
    ///
    /// Returns error if an entry lacks `=` or either side is empty
    pub fn parse(s: &str) -> Result<Self> {
        let mut map = BTreeMap::new();
        for pair in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (from, to) = pair
                .split_once('=')
                .map(|(f, t)| (f.trim(), t.trim()))
                .filter(|(f, t)| !f.is_empty() && !t.is_empty())
                .ok_or_else(|| Error::InvalidInput(format!("bad rename entry '{pair}', expected old=new")))?;
            map.insert(from.to_string(), to.to_string());
        }
        Ok(Self(map))
    }

    /// Load a table from a JSON object file (`{"old": "new"}`).
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is not a string map
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(serde_json::from_slice(&fs::read(path)?)?)
    }

    /// Replacement for `name`, or `name` itself on a miss.
    #[must_use]
    pub fn apply<'a>(&'a self, name: &'a str) -> &'a str {
        self.0.get(name).map_or(name, String::as_str)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Experiment and model rename tables used by one import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRemap {
    /// Experiment renames
    #[serde(default)]
    pub experiments: NameMap,
    /// Registered model renames
    #[serde(default)]
    pub models: NameMap,
}

impl NameRemap {
    /// Effective destination name of an entity.
    ///
    /// Only experiments and registered models are renamed; runs and versions
    /// keep whatever identifier the destination assigns.
    #[must_use]
    pub fn remap<'a>(&'a self, kind: EntityKind, original: &'a str) -> &'a str {
        match kind {
            EntityKind::Experiment => self.experiments.apply(original),
            EntityKind::RegisteredModel => self.models.apply(original),
            EntityKind::Run | EntityKind::ModelVersion => original,
        }
    }
}
