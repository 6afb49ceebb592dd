use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::confidence::{ConfidenceBand, PenaltyStep};
use crate::policy::{GatePolicy, Waiver};
use crate::signal::{GateDecision, IssueSeverity};

/// Item-level rollup of every signal. Maps 1:1 onto a gate decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReadinessStatus {
    #[serde(rename = "READY")]
    Ready,
    #[serde(rename = "REVIEW")]
    Review,
    #[serde(rename = "BLOCKED")]
    Blocked,
}

impl ReadinessStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "READY",
            Self::Review => "REVIEW",
            Self::Blocked => "BLOCKED",
        }
    }

    pub fn gate_decision(self) -> GateDecision {
        match self {
            Self::Ready => GateDecision::Pass,
            Self::Review => GateDecision::Review,
            Self::Blocked => GateDecision::Block,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckCounters {
    pub errors: usize,
    pub warnings: usize,
    pub info: usize,
    #[serde(default)]
    pub warnings_by_check: BTreeMap<String, usize>,
    #[serde(default)]
    pub warnings_by_class: BTreeMap<String, usize>,
}

/// A signal suppressed by a waiver: relabeled info for gating, but the
/// original severity and the matched rule stay visible for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaivedSignal {
    pub video_id: String,
    pub issue_code: String,
    pub original_severity: IssueSeverity,
    pub waiver: Waiver,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessRecord {
    pub video_id: String,
    pub source: String,
    pub status: ReadinessStatus,
    pub gate_decision: GateDecision,
    pub reason_code: String,
    pub counters: CheckCounters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub ready_for_ingest: bool,
    pub confidence: f64,
    pub confidence_band: ConfidenceBand,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub penalty_trail: Vec<PenaltyStep>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistogram {
    pub ready: usize,
    pub review: usize,
    pub blocked: usize,
}

impl StatusHistogram {
    pub fn record(&mut self, status: ReadinessStatus) {
        match status {
            ReadinessStatus::Ready => self.ready += 1,
            ReadinessStatus::Review => self.review += 1,
            ReadinessStatus::Blocked => self.blocked += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.ready + self.review + self.blocked
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WaiverAudit {
    pub active: Vec<Waiver>,
    pub expired: Vec<Waiver>,
    pub waived_signals: Vec<WaivedSignal>,
}

/// Canonical gate artifact: per-item readiness records plus the exact policy
/// that produced them. Fully reproducible from inputs; `generated_at` is the
/// only field excluded from the body digest.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessSummary {
    pub manifest_version: u32,
    pub generated_at: String,
    pub manifest_path: String,
    pub reports_root: String,
    pub policy: GatePolicy,
    pub totals: StatusHistogram,
    pub records: Vec<ReadinessRecord>,
    pub waivers: WaiverAudit,
    #[serde(default)]
    pub malformed_manifest_lines: Vec<String>,
    pub newly_quarantined: Vec<String>,
    pub summary_digest: String,
}

// GatePolicy is Serialize-only; summaries read back for drift only need the
// fields below, so deserialization goes through this reduced view.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadinessSummaryView {
    pub totals: StatusHistogram,
    pub records: Vec<ReadinessRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchScorecard {
    pub batch_id: String,
    pub generated_at: String,
    /// Per-stage count of scope items with a readable report.
    pub stage_coverage: BTreeMap<String, usize>,
    pub readiness: StatusHistogram,
    /// Categorical frequency tables, e.g. technique/topic usage.
    pub category_tables: BTreeMap<String, BTreeMap<String, u64>>,
    /// Scalar summaries, e.g. mean segments per video.
    pub scalar_summaries: BTreeMap<String, f64>,
}
