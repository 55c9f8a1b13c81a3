//! Tag maps and the reserved keys this crate writes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Reserved tag keys.
///
/// Keys under [`keys::RESERVED_PREFIX`] are written by the importer or read by
/// the exporter; user tags never start with it.
pub mod keys {
    /// Prefix shared by every reserved key.
    pub const RESERVED_PREFIX: &str = "registry_transfer.";

    /// Source run id, attached to every imported run.
    pub const SOURCE_RUN_ID: &str = "registry_transfer.source.run_id";

    /// Source experiment id, attached to every imported run.
    pub const SOURCE_EXPERIMENT_ID: &str = "registry_transfer.source.experiment_id";

    /// Source user id, attached when the destination does not keep it.
    pub const SOURCE_USER_ID: &str = "registry_transfer.source.user_id";

    /// Workspace path of the notebook that produced a run.
    pub const NOTEBOOK_PATH: &str = "registry_transfer.notebook_path";

    /// True if `key` is reserved.
    #[must_use]
    pub fn is_reserved(key: &str) -> bool {
        key.starts_with(RESERVED_PREFIX)
    }
}

/// Ordered string-to-string tag map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tags(BTreeMap<String, String>);

impl Tags {
    /// Create an empty tag map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a tag value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Set a tag, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    /// Builder-style [`Tags::insert`].
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Copy every entry of `other` into `self`, overwriting on conflict.
    pub fn extend(&mut self, other: &Self) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    /// Iterate over all entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Tags with every reserved key removed.
    #[must_use]
    pub fn user_tags(&self) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(k, _)| !keys::is_reserved(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Number of tags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if there are no tags.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Tags {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_tags_strip_reserved() {
        let tags = Tags::new()
            .with("team", "fraud")
            .with(keys::SOURCE_RUN_ID, "abc");

        let user = tags.user_tags();
        assert_eq!(user.len(), 1);
        assert_eq!(user.get("team"), Some("fraud"));
        assert!(user.get(keys::SOURCE_RUN_ID).is_none());
    }

    #[test]
    fn test_tags_serialize_as_plain_object() {
        let tags = Tags::new().with("a", "1");
        let json = serde_json::to_string(&tags).unwrap();
        assert_eq!(json, r#"{"a":"1"}"#);
    }
}
