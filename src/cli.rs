use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::policy::MissingMediaSeverity;

#[derive(Parser, Debug)]
#[command(
    name = "vidgate",
    version,
    about = "Validation, confidence propagation, and readiness gating for the content pipeline"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate stage reports against the structural contract
    CheckReports(CheckReportsArgs),
    /// Compare two sequential stages' outputs for drift
    CrossStage(CrossStageArgs),
    /// Verify upstream dependency coverage before invoking a stage
    Preflight(PreflightArgs),
    /// Aggregate all signals into per-item readiness decisions
    Gate(GateArgs),
    /// Build a batch scorecard and flag drift against prior batches
    Drift(DriftArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CheckReportsArgs {
    #[arg(long)]
    pub manifest: PathBuf,

    #[arg(long)]
    pub source: Option<String>,

    #[arg(long, default_value = "reports")]
    pub reports_root: PathBuf,

    /// Write the structural report to this path in addition to stdout
    #[arg(long)]
    pub emit_report: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Treat warnings as failing for the exit code
    #[arg(long, default_value_t = false)]
    pub strict: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CrossStageArgs {
    #[arg(long)]
    pub manifest: PathBuf,

    #[arg(long)]
    pub source: Option<String>,

    #[arg(long, default_value = ".cache/vidgate")]
    pub pipeline_root: PathBuf,

    #[arg(long, default_value = "stage06_segment")]
    pub upstream_stage: String,

    #[arg(long, default_value = "stage07_semantic")]
    pub downstream_stage: String,

    /// Restrict the comparison to one id instead of the whole scope
    #[arg(long)]
    pub video_id: Option<String>,

    #[arg(long)]
    pub emit_report: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub json: bool,

    #[arg(long, default_value_t = false)]
    pub strict: bool,
}

#[derive(Args, Debug, Clone)]
pub struct PreflightArgs {
    #[arg(long)]
    pub manifest: PathBuf,

    #[arg(long)]
    pub source: Option<String>,

    #[arg(long, default_value = ".cache/vidgate")]
    pub pipeline_root: PathBuf,

    /// Stage about to be invoked; its declared upstream dependencies are
    /// checked for artifact coverage
    #[arg(long)]
    pub target_stage: String,

    #[arg(long, default_value = "gate/quarantine.json")]
    pub quarantine_file: PathBuf,

    #[arg(long)]
    pub emit_report: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct GateArgs {
    #[arg(long)]
    pub manifest: PathBuf,

    #[arg(long)]
    pub source: Option<String>,

    #[arg(long, default_value = "reports")]
    pub reports_root: PathBuf,

    #[arg(long, default_value = "gate/quarantine.json")]
    pub quarantine_file: PathBuf,

    #[arg(long)]
    pub waiver_file: Option<PathBuf>,

    /// Additional validator output files (any known shape) normalized into
    /// canonical signals and fed into gating (repeatable)
    #[arg(long = "extra-signals")]
    pub extra_signals: Vec<PathBuf>,

    #[arg(long, default_value = "gate/readiness_summary.json")]
    pub summary_path: PathBuf,

    /// Also write the full canonical signal list next to the summary
    #[arg(long, default_value_t = false)]
    pub emit_signals: bool,

    /// Skip merging newly blocked ids into the quarantine file
    #[arg(long, default_value_t = false)]
    pub no_quarantine_write: bool,

    /// Check names whose warnings block outright (repeatable)
    #[arg(long = "block-warning-check")]
    pub block_warning_checks: Vec<String>,

    /// Signal classes whose warnings block outright (repeatable)
    #[arg(long = "block-warning-class")]
    pub block_warning_classes: Vec<String>,

    /// Content-type-scoped class block-list entries, `content_type:class`
    #[arg(long = "block-warning-class-by-content-type")]
    pub block_warning_classes_by_content_type: Vec<String>,

    /// Global total-warning budget per item
    #[arg(long)]
    pub max_warning_checks: Option<usize>,

    /// Per-check warning budgets, `check=count` (repeatable)
    #[arg(long = "max-warning-checks-by-check")]
    pub max_warning_checks_by_check: Vec<String>,

    /// Per-class warning budgets, `class=count` (repeatable)
    #[arg(long = "max-warning-checks-by-class")]
    pub max_warning_checks_by_class: Vec<String>,

    /// Default review budget per signal class
    #[arg(long, default_value_t = crate::policy::DEFAULT_REVIEW_CLASS_BUDGET)]
    pub review_warning_class_budget: usize,

    /// Review budgets per content type, `content_type:class=count`
    #[arg(long = "review-warning-class-budget-by-content-type")]
    pub review_warning_class_budgets_by_content_type: Vec<String>,

    #[arg(long, value_enum, default_value_t = MissingMediaSeverity::Error)]
    pub missing_media_severity: MissingMediaSeverity,

    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Non-zero exit on REVIEW as well as BLOCKED
    #[arg(long, default_value_t = false)]
    pub strict: bool,
}

#[derive(Args, Debug, Clone)]
pub struct DriftArgs {
    #[arg(long)]
    pub manifest: PathBuf,

    #[arg(long)]
    pub source: Option<String>,

    #[arg(long, default_value = ".cache/vidgate")]
    pub pipeline_root: PathBuf,

    /// Readiness summary produced by the gate subcommand
    #[arg(long, default_value = "gate/readiness_summary.json")]
    pub summary_path: PathBuf,

    /// Directory holding prior batch scorecards; the current batch's
    /// scorecard is written here
    #[arg(long, default_value = "scorecards")]
    pub scorecard_dir: PathBuf,

    #[arg(long)]
    pub batch_id: String,

    /// Most recent prior scorecards to pool for the drift comparison
    #[arg(long, default_value_t = 8)]
    pub max_prior_batches: usize,

    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Non-zero exit when drift is flagged
    #[arg(long, default_value_t = false)]
    pub strict: bool,
}
