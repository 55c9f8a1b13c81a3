//! registry-transfer CLI
//!
//! Exports models from a tracking store snapshot into a directory tree and
//! imports such a tree into another store snapshot.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use registry_transfer::config::{ExportOptions, ImportOptions};
use registry_transfer::names::{parse_stages, ModelSelection};
use registry_transfer::notebook::NotebookFormat;
use registry_transfer::remap::NameMap;
use registry_transfer::tracking::MemoryTracking;
use registry_transfer::{export_models, import_all};

#[derive(Parser)]
#[command(name = "registry-transfer")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Export and import registered models with their runs and experiments", long_about = None)]
struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ThreadArgs {
    /// Process independent experiments/models on a worker pool
    #[arg(long)]
    use_threads: bool,

    /// Worker pool size (default: number of cores)
    #[arg(long)]
    num_threads: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Export registered models, their versions, runs and experiments
    ExportModels {
        /// Source tracking store snapshot (JSON)
        #[arg(long)]
        store: PathBuf,

        /// Models to export: `*` or a comma-delimited list
        #[arg(short, long)]
        models: String,

        /// Output directory
        #[arg(short, long)]
        output_dir: PathBuf,

        /// Comma-delimited stages to keep (default: all)
        #[arg(long, default_value = "")]
        stages: String,

        /// Export every run of referenced experiments, not just version runs
        #[arg(long)]
        export_all_runs: bool,

        /// Comma-delimited notebook formats (SOURCE, HTML, JUPYTER, DBC)
        #[arg(long, default_value = "")]
        notebook_formats: String,

        #[command(flatten)]
        threads: ThreadArgs,
    },

    /// Import an export tree into a tracking store
    ImportModels {
        /// Destination tracking store snapshot (JSON, created if missing)
        #[arg(long)]
        store: PathBuf,

        /// Export tree to import
        #[arg(short, long)]
        input_dir: PathBuf,

        /// Delete existing destination models before recreating them
        #[arg(long)]
        delete_model: bool,

        /// Experiment renames: `old=new,old2=new2`
        #[arg(long, default_value = "")]
        experiment_renames: String,

        /// Experiment renames as a JSON object file
        #[arg(long, conflicts_with = "experiment_renames")]
        experiment_renames_file: Option<PathBuf>,

        /// Model renames: `old=new,old2=new2`
        #[arg(long, default_value = "")]
        model_renames: String,

        /// Model renames as a JSON object file
        #[arg(long, conflicts_with = "model_renames")]
        model_renames_file: Option<PathBuf>,

        /// Keep the source user id of runs
        #[arg(long)]
        use_src_user_id: bool,

        #[command(flatten)]
        threads: ThreadArgs,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "registry_transfer=debug"
    } else {
        "registry_transfer=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::ExportModels {
            store,
            models,
            output_dir,
            stages,
            export_all_runs,
            notebook_formats,
            threads,
        } => {
            let client = MemoryTracking::load(&store)
                .with_context(|| format!("failed to load store {}", store.display()))?;
            let options = ExportOptions::builder(output_dir, models.parse::<ModelSelection>()?)
                .stages(parse_stages(&stages)?)
                .export_all_runs(export_all_runs)
                .notebook_formats(NotebookFormat::parse_list(&notebook_formats)?)
                .use_threads(threads.use_threads)
                .num_threads(threads.num_threads)
                .build();
            let report = export_models(&client, &options).context("export failed")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::ImportModels {
            store,
            input_dir,
            delete_model,
            experiment_renames,
            experiment_renames_file,
            model_renames,
            model_renames_file,
            use_src_user_id,
            threads,
        } => {
            let client = MemoryTracking::open(&store)
                .with_context(|| format!("failed to open store {}", store.display()))?;
            let experiment_renames =
                rename_table(&experiment_renames, experiment_renames_file.as_deref())?;
            let model_renames = rename_table(&model_renames, model_renames_file.as_deref())?;
            let options = ImportOptions::builder()
                .delete_model_first(delete_model)
                .experiment_renames(experiment_renames)
                .model_renames(model_renames)
                .use_src_user_id(use_src_user_id)
                .use_threads(threads.use_threads)
                .num_threads(threads.num_threads)
                .build();
            let report = import_all(&client, &input_dir, &options).context("import failed")?;
            client
                .save(&store)
                .with_context(|| format!("failed to save store {}", store.display()))?;
            info!(store = %store.display(), "destination store saved");
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn rename_table(inline: &str, file: Option<&Path>) -> Result<NameMap> {
    match file {
        Some(path) => NameMap::load(path)
            .with_context(|| format!("failed to read rename table {}", path.display())),
        None => Ok(NameMap::parse(inline)?),
    }
}
