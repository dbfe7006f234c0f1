//! Command-line surface for the `focus-validate` binary.

use std::path::PathBuf;

use clap::Parser;

/// Validates a tabular cost-and-usage dataset against a FOCUS rule
/// catalog.
#[derive(Debug, Parser)]
#[command(name = "focus-validate", version, about)]
pub struct Cli {
    /// Path to a rule catalog JSON document, or a directory of one JSON
    /// file per rule.
    #[arg(long, env = "FOCUS_VALIDATOR_CATALOG")]
    pub catalog: PathBuf,

    /// Catalog version label, carried through for diagnostics only.
    #[arg(long, default_value = "2024", env = "FOCUS_VALIDATOR_CATALOG_VERSION")]
    pub catalog_version: String,

    /// Path to the dataset (Parquet or CSV) to validate.
    #[arg(long, env = "FOCUS_VALIDATOR_DATA")]
    pub data: PathBuf,

    /// Restrict resolution to rules whose `rule_id` starts with this
    /// prefix; omit to resolve the entire catalog.
    #[arg(long)]
    pub target_prefix: Option<String>,

    /// Dataset-global applicability tokens the dataset satisfies, e.g.
    /// `AVAILABILITY_ZONE_SUPPORTED` (repeatable).
    #[arg(long = "applicable")]
    pub applicability: Vec<String>,

    /// Worker threads used to execute checks within one layer.
    #[arg(long, default_value_t = 1)]
    pub parallelism: usize,

    /// Run-level deadline in milliseconds; rules not yet scheduled when it
    /// elapses are reported `ABORTED`.
    #[arg(long)]
    pub deadline_ms: Option<u64>,

    /// Print the compiled plan instead of running it against the dataset.
    #[arg(long)]
    pub explain: bool,

    /// Exit 0 even if the report contains a `FAIL` or `ABORTED` outcome.
    /// By default the process exits non-zero on any violation.
    #[arg(long)]
    pub no_fail_on_violation: bool
}
