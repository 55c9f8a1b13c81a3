//! Error types for registry-transfer
//!
//! Every tracking-backend failure is classified into one of a handful of
//! categories so bulk operations can record it per entity and keep going.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tracking::EntityKind;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// registry-transfer error types
#[derive(Error, Debug)]
pub enum Error {
    /// Referenced entity is absent on the backend
    #[error("{kind} '{name}' does not exist")]
    NotFound {
        /// Kind of the missing entity
        kind: EntityKind,
        /// Name or identifier that was looked up
        name: String,
    },

    /// Creation collided with an existing entity of the same name
    #[error("{kind} '{name}' already exists")]
    AlreadyExists {
        /// Kind of the colliding entity
        kind: EntityKind,
        /// Name that collided
        name: String,
    },

    /// Backend refused the operation
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Backend or network is (temporarily) unavailable
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Malformed caller input (option strings, rename tables, export tree)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for [`Error::NotFound`].
    pub fn not_found(kind: EntityKind, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Shorthand for [`Error::AlreadyExists`].
    pub fn already_exists(kind: EntityKind, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind,
            name: name.into(),
        }
    }

    /// Category of this error, as recorded in reports.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::AlreadyExists { .. } => ErrorCategory::AlreadyExists,
            Self::PermissionDenied(_) => ErrorCategory::PermissionDenied,
            Self::Unavailable(_) => ErrorCategory::Unavailable,
            Self::InvalidInput(_) | Self::Json(_) => ErrorCategory::InvalidInput,
            Self::Io(_) | Self::Other(_) => ErrorCategory::Other,
        }
    }

    /// True if this is a [`Error::NotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Coarse error classification stored in export/import reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// Entity absent
    NotFound,
    /// Name collision on creation
    AlreadyExists,
    /// Refused by the backend
    PermissionDenied,
    /// Network/backend failure
    Unavailable,
    /// Bad input or unreadable export tree
    InvalidInput,
    /// Anything else (local IO, ...)
    Other,
}
