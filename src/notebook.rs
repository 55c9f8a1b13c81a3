//! Notebook snapshots of runs produced from notebooks.
//!
//! The snapshot bytes come from a [`NotebookSource`]; this crate only decides
//! which runs get one and where the files go.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::names::split_list;
use crate::{Error, Result};

/// Snapshot format of an exported notebook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotebookFormat {
    /// Plain source code
    Source,
    /// Rendered HTML
    Html,
    /// Jupyter `.ipynb`
    Jupyter,
    /// Packaged notebook archive
    Dbc,
}

impl NotebookFormat {
    /// File extension of the snapshot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Html => "html",
            Self::Jupyter => "ipynb",
            Self::Dbc => "dbc",
        }
    }

    /// Parse a comma-delimited list (`"SOURCE,DBC"`), case-insensitive.
    ///
    /// # Errors
    ///
    /// Returns error on an unknown format
    pub fn parse_list(s: &str) -> Result<Vec<Self>> {
        let mut formats: Vec<Self> = split_list(s)
            .iter()
            .map(|f| f.parse())
            .collect::<Result<_>>()?;
        formats.sort();
        formats.dedup();
        Ok(formats)
    }
}

impl fmt::Display for NotebookFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Source => "SOURCE",
            Self::Html => "HTML",
            Self::Jupyter => "JUPYTER",
            Self::Dbc => "DBC",
        };
        f.write_str(s)
    }
}

impl FromStr for NotebookFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SOURCE" => Ok(Self::Source),
            "HTML" => Ok(Self::Html),
            "JUPYTER" => Ok(Self::Jupyter),
            "DBC" => Ok(Self::Dbc),
            other => Err(Error::InvalidInput(format!("unknown notebook format '{other}'"))),
        }
    }
}

/// Provider of notebook snapshot bytes.
pub trait NotebookSource: Send + Sync {
    /// Render the notebook at workspace `path` in `format`.
    fn export_notebook(&self, path: &str, format: NotebookFormat) -> Result<Vec<u8>>;
}
