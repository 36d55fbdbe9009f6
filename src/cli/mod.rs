pub mod backup;
pub mod ingest;
pub mod init;
pub mod list;
pub mod report;
pub mod review;
pub mod status;
pub mod tags;
pub mod train;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};

use crate::dedup::Keep;
use crate::error::Result;
use crate::settings::{load_settings, settings_path, shellexpand_path, Settings};

/// Settings for this invocation, with command-line overrides applied.
pub struct Context {
    pub config_path: PathBuf,
    pub settings: Settings,
}

impl Context {
    pub fn load(config: Option<&Path>, data_dir: Option<&str>) -> Result<Self> {
        let config_path = config.map(Path::to_path_buf).unwrap_or_else(settings_path);
        let mut settings = load_settings(&config_path)?;
        if let Some(dir) = data_dir {
            settings.data_dir = shellexpand_path(dir);
        }
        tracing::debug!(config = %config_path.display(), data_dir = %settings.data_dir, "settings loaded");
        Ok(Self {
            config_path,
            settings,
        })
    }
}

#[derive(Parser)]
#[command(name = "finbot", version, about = "Personal ledger with learned transaction tagging.")]
pub struct Cli {
    /// Settings file (default: ~/.config/finbot/settings.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Data directory holding the ledger, model, inputs and reports
    #[arg(long = "data-dir", global = true)]
    pub data_dir: Option<String>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the data directory layout and a settings file.
    Init,
    /// Normalize exports in the input directory, tag them and merge into the ledger.
    Ingest {
        /// Review low-confidence predictions before merging
        #[arg(long, short)]
        interactive: bool,
        /// Confidence threshold in [0, 1] (default from settings)
        #[arg(long)]
        threshold: Option<f64>,
        /// Skip refreshing the summary reports
        #[arg(long = "no-reports")]
        no_reports: bool,
    },
    /// Resume a paused interactive review.
    Review,
    /// Train the tag model from the ledger.
    Train {
        /// Label recorded in the model backup name
        #[arg(long, default_value = "manual")]
        event: String,
    },
    /// Show ledger rows with a per-tag summary.
    List {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        month: Option<u32>,
        /// Only rows carrying this tag (repeatable; "" for untagged)
        #[arg(long)]
        tag: Vec<String>,
    },
    /// Set the tag of rows picked by index, current tag or description.
    Tag {
        /// Retag every row whose tag equals this value
        #[arg(long = "where-tag", conflicts_with = "where_desc")]
        where_tag: Option<String>,
        /// Retag every row whose description matches this regex
        #[arg(long = "where-desc")]
        where_desc: Option<String>,
        /// `<INDEX>... <TAG>`, or just `<TAG>` with a --where option
        #[arg(num_args = 1.., required = true)]
        args: Vec<String>,
    },
    /// Rename a tag everywhere in the ledger.
    ReplaceTag {
        old: String,
        new: String,
        /// Retrain the model afterwards
        #[arg(long)]
        retrain: bool,
    },
    /// Split part of a row's amount into a separately tagged offset row.
    Offset {
        index: usize,
        #[arg(allow_hyphen_values = true)]
        amount: String,
        tag: String,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// Drop duplicate rows already in the ledger.
    Dedupe {
        /// Which occurrence of a duplicate survives
        #[arg(long, value_enum, default_value_t = Keep::First)]
        keep: Keep,
    },
    /// Back up the ledger.
    Backup {
        /// Label recorded in the backup name
        #[arg(long, default_value = "manual")]
        event: String,
        /// List existing backups instead
        #[arg(long)]
        list: bool,
    },
    /// Print summary reports.
    Report {
        #[arg(value_enum, default_value_t = ReportKind::Monthly)]
        kind: ReportKind,
        /// Also write the CSV summaries into the reports directory
        #[arg(long)]
        write: bool,
    },
    /// Show paths, counts and model state.
    Status,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportKind {
    Monthly,
    Yearly,
    Balance,
}
