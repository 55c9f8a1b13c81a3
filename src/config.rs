//! Options of the bulk export and import entry points.
//!
//! Both option sets default every optional field; use the builders to
//! override.

use std::path::PathBuf;

use crate::names::ModelSelection;
use crate::notebook::NotebookFormat;
use crate::remap::{NameMap, NameRemap};
use crate::tracking::Stage;

/// Worker pool settings shared by export and import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Parallelism {
    /// Run independent units on a thread pool
    pub use_threads: bool,
    /// Pool size; `None` uses the number of available cores
    pub num_threads: Option<usize>,
}

/// Options of [`export_models`](crate::export::export_models).
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Root of the tree to write
    pub output_dir: PathBuf,
    /// Models to export
    pub models: ModelSelection,
    /// Stage filter; empty keeps every version
    pub stages: Vec<Stage>,
    /// Export every run of referenced experiments instead of just version runs
    pub export_all_runs: bool,
    /// Notebook snapshot formats
    pub notebook_formats: Vec<NotebookFormat>,
    /// Worker pool for the experiment pass
    pub parallelism: Parallelism,
}

impl ExportOptions {
    /// Create a builder with the required fields.
    #[must_use]
    pub fn builder(output_dir: impl Into<PathBuf>, models: ModelSelection) -> ExportOptionsBuilder {
        ExportOptionsBuilder::new(output_dir, models)
    }
}

/// Builder for `ExportOptions`.
#[derive(Debug)]
pub struct ExportOptionsBuilder {
    options: ExportOptions,
}

impl ExportOptionsBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>, models: ModelSelection) -> Self {
        Self {
            options: ExportOptions {
                output_dir: output_dir.into(),
                models,
                stages: Vec::new(),
                export_all_runs: false,
                notebook_formats: Vec::new(),
                parallelism: Parallelism::default(),
            },
        }
    }

    /// Restrict versions to these stages.
    #[must_use]
    pub fn stages(mut self, stages: Vec<Stage>) -> Self {
        self.options.stages = stages;
        self
    }

    /// Choose the run policy.
    #[must_use]
    pub const fn export_all_runs(mut self, export_all_runs: bool) -> Self {
        self.options.export_all_runs = export_all_runs;
        self
    }

    /// Request notebook snapshots in these formats.
    #[must_use]
    pub fn notebook_formats(mut self, formats: Vec<NotebookFormat>) -> Self {
        self.options.notebook_formats = formats;
        self
    }

    /// Export experiments on a worker pool.
    #[must_use]
    pub const fn use_threads(mut self, use_threads: bool) -> Self {
        self.options.parallelism.use_threads = use_threads;
        self
    }

    /// Size of the worker pool.
    #[must_use]
    pub const fn num_threads(mut self, num_threads: Option<usize>) -> Self {
        self.options.parallelism.num_threads = num_threads;
        self
    }

    /// Build the `ExportOptions`.
    #[must_use]
    pub fn build(self) -> ExportOptions {
        self.options
    }
}

/// Options of [`import_all`](crate::import::import_all).
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Delete an existing destination model (and its versions) before
    /// recreating it
    pub delete_model_first: bool,
    /// Experiment and model rename tables
    pub remap: NameRemap,
    /// Keep the source run's user id on the destination
    pub use_src_user_id: bool,
    /// Worker pool for the experiment and model passes
    pub parallelism: Parallelism,
}

impl ImportOptions {
    /// Create a builder with every option at its default.
    #[must_use]
    pub fn builder() -> ImportOptionsBuilder {
        ImportOptionsBuilder::default()
    }
}

/// Builder for `ImportOptions`.
#[derive(Debug, Default)]
pub struct ImportOptionsBuilder {
    options: ImportOptions,
}

impl ImportOptionsBuilder {
    /// Delete existing destination models first.
    #[must_use]
    pub const fn delete_model_first(mut self, delete: bool) -> Self {
        self.options.delete_model_first = delete;
        self
    }

    /// Experiment rename table.
    #[must_use]
    pub fn experiment_renames(mut self, renames: NameMap) -> Self {
        self.options.remap.experiments = renames;
        self
    }

    /// Model rename table.
    #[must_use]
    pub fn model_renames(mut self, renames: NameMap) -> Self {
        self.options.remap.models = renames;
        self
    }

    /// Keep source user ids.
    #[must_use]
    pub const fn use_src_user_id(mut self, keep: bool) -> Self {
        self.options.use_src_user_id = keep;
        self
    }

    /// Import units on a worker pool.
    #[must_use]
    pub const fn use_threads(mut self, use_threads: bool) -> Self {
        self.options.parallelism.use_threads = use_threads;
        self
    }

    /// Size of the worker pool.
    #[must_use]
    pub const fn num_threads(mut self, num_threads: Option<usize>) -> Self {
        self.options.parallelism.num_threads = num_threads;
        self
    }

    /// Build the `ImportOptions`.
    #[must_use]
    pub fn build(self) -> ImportOptions {
        self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_defaults() {
        let options = ExportOptions::builder("/tmp/out", ModelSelection::All).build();
        assert!(options.stages.is_empty());
        assert!(!options.export_all_runs);
        assert!(!options.parallelism.use_threads);
        assert!(options.notebook_formats.is_empty());
    }

    #[test]
    fn test_import_builder() {
        let options = ImportOptions::builder()
            .delete_model_first(true)
            .model_renames(NameMap::new().with("a", "b"))
            .use_threads(true)
            .num_threads(Some(2))
            .build();
        assert!(options.delete_model_first);
        assert_eq!(options.remap.models.apply("a"), "b");
        assert!(options.remap.experiments.is_empty());
        assert_eq!(options.parallelism.num_threads, Some(2));
    }
}
