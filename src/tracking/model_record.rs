//! Registered models and their versions

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Tags;
use crate::{Error, Result};

/// Lifecycle stage of a model version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    /// Not staged
    #[default]
    None,
    /// Under validation
    Staging,
    /// Serving
    Production,
    /// Retired
    Archived,
}

impl Stage {
    /// All stages in lifecycle order.
    pub const ALL: [Self; 4] = [Self::None, Self::Staging, Self::Production, Self::Archived];

    /// Canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Staging => "Staging",
            Self::Production => "Production",
            Self::Archived => "Archived",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = Error;

    /// Case-insensitive parse of a stage name.
    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidInput(format!("unknown model stage '{s}'")))
    }
}

/// A named, versioned model. The name is its identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegisteredModel {
    name: String,
    description: Option<String>,
    #[serde(default)]
    tags: Tags,
    created_at: DateTime<Utc>,
}

impl RegisteredModel {
    /// Create a registered model stamped with the current time.
    #[must_use]
    pub fn new(name: impl Into<String>, description: Option<String>, tags: Tags) -> Self {
        Self {
            name: name.into(),
            description,
            tags,
            created_at: Utc::now(),
        }
    }

    /// Get the model name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Get the model tags.
    #[must_use]
    pub const fn tags(&self) -> &Tags {
        &self.tags
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Numbered snapshot of a registered model pointing at one run's artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelVersion {
    name: String,
    version: u64,
    source: String,
    run_id: String,
    stage: Stage,
    description: Option<String>,
    created_at: DateTime<Utc>,
}

impl ModelVersion {
    /// Create a version in [`Stage::None`].
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        version: u64,
        source: impl Into<String>,
        run_id: impl Into<String>,
        description: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version,
            source: source.into(),
            run_id: run_id.into(),
            stage: Stage::None,
            description,
            created_at: Utc::now(),
        }
    }

    /// Get the owning model name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the version number (1-based, unique per model).
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Get the artifact path the version was registered from.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Get the run that produced the artifact.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the lifecycle stage.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        self.stage
    }

    /// Get the description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Move the version to another stage.
    pub fn set_stage(&mut self, stage: Stage) {
        self.stage = stage;
    }
}
