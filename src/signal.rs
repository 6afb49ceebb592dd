use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::scope::is_video_id;

/// Canonical four-level severity every producer's output is mapped onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Info,
    Minor,
    Major,
    Critical,
}

impl IssueSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Major => "major",
            Self::Minor => "minor",
            Self::Info => "info",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "critical" => Some(Self::Critical),
            "major" => Some(Self::Major),
            "minor" => Some(Self::Minor),
            "info" => Some(Self::Info),
            _ => None,
        }
    }

    /// Mapping for stage-report check severities: error -> major,
    /// warning -> minor, info -> info.
    pub fn from_check_severity(raw: &str) -> Option<Self> {
        match raw {
            "error" => Some(Self::Major),
            "warning" => Some(Self::Minor),
            "info" => Some(Self::Info),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    Pass,
    Review,
    Block,
}

impl GateDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Review => "review",
            Self::Block => "block",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pass" => Some(Self::Pass),
            "review" => Some(Self::Review),
            "block" => Some(Self::Block),
            _ => None,
        }
    }

    fn from_severity(severity: IssueSeverity) -> Self {
        match severity {
            IssueSeverity::Critical | IssueSeverity::Major => Self::Block,
            IssueSeverity::Minor => Self::Review,
            IssueSeverity::Info => Self::Pass,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeType {
    Segment,
    Conversation,
    Video,
    Batch,
}

impl ScopeType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Segment => "segment",
            Self::Conversation => "conversation",
            Self::Video => "video",
            Self::Batch => "batch",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "segment" => Some(Self::Segment),
            "conversation" => Some(Self::Conversation),
            "video" => Some(Self::Video),
            "batch" => Some(Self::Batch),
            _ => None,
        }
    }
}

/// Normalized projection of one validator finding or synthesized gate
/// decision. Every producer shape funnels into this schema before gating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalSignal {
    pub issue_code: String,
    pub issue_severity: IssueSeverity,
    pub gate_decision: GateDecision,
    pub scope_type: ScopeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    pub origin_stage: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_class: Option<String>,
}

impl CanonicalSignal {
    pub fn synthesized(
        issue_code: &str,
        severity: IssueSeverity,
        video_id: Option<&str>,
        origin_stage: &str,
        message: String,
    ) -> Self {
        CanonicalSignal {
            issue_code: issue_code.to_string(),
            issue_severity: severity,
            gate_decision: GateDecision::from_severity(severity),
            scope_type: if video_id.is_some() {
                ScopeType::Video
            } else {
                ScopeType::Batch
            },
            scope_id: None,
            video_id: video_id.map(str::to_string),
            origin_stage: origin_stage.to_string(),
            message,
            signal_class: None,
        }
    }
}

fn string_field(row: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(value) = row.get(*key).and_then(Value::as_str) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

fn severity_of_row(row: &Value) -> IssueSeverity {
    // Prefer an already-canonical severity; fall back to the stage-report
    // error/warning/info vocabulary; default to info.
    if let Some(raw) = string_field(row, &["issue_severity", "severity"]) {
        if let Some(severity) = IssueSeverity::parse(&raw) {
            return severity;
        }
        if let Some(severity) = IssueSeverity::from_check_severity(&raw) {
            return severity;
        }
    }
    IssueSeverity::Info
}

fn video_id_of_row(row: &Value) -> Option<String> {
    string_field(row, &["video_id", "id"]).filter(|candidate| is_video_id(candidate))
}

fn normalize_row(row: &Value, origin_stage: &str) -> Option<CanonicalSignal> {
    // Canonical-only mode: a row without a non-empty issue code is discarded.
    let issue_code = string_field(row, &["issue_code", "check", "code"])?;

    let severity = severity_of_row(row);
    let gate_decision = string_field(row, &["gate_decision"])
        .and_then(|raw| GateDecision::parse(&raw))
        .unwrap_or_else(|| GateDecision::from_severity(severity));

    let video_id = video_id_of_row(row);
    let scope_type = string_field(row, &["scope_type"])
        .and_then(|raw| ScopeType::parse(&raw))
        .unwrap_or(if video_id.is_some() {
            ScopeType::Video
        } else {
            ScopeType::Batch
        });

    Some(CanonicalSignal {
        issue_code,
        issue_severity: severity,
        gate_decision,
        scope_type,
        scope_id: string_field(row, &["scope_id"]),
        video_id,
        origin_stage: string_field(row, &["origin_stage", "stage"])
            .unwrap_or_else(|| origin_stage.to_string()),
        message: string_field(row, &["message", "detail", "reason"]).unwrap_or_default(),
        signal_class: string_field(row, &["signal_class"]),
    })
}

/// Map an arbitrary validator payload into canonical signals. Known shapes:
/// `results[]`, `issues[]`, `checks[]`, a bare array, or per-item `videos[]`
/// where each video row carries its own `gate_decision` and nested checks.
pub fn normalize_payload(payload: &Value, origin_stage: &str) -> Vec<CanonicalSignal> {
    let mut signals = Vec::new();

    if let Some(rows) = payload.as_array() {
        signals.extend(rows.iter().filter_map(|row| normalize_row(row, origin_stage)));
        return signals;
    }

    for key in ["results", "issues", "checks"] {
        if let Some(rows) = payload.get(key).and_then(Value::as_array) {
            signals.extend(rows.iter().filter_map(|row| normalize_row(row, origin_stage)));
        }
    }

    if let Some(videos) = payload.get("videos").and_then(Value::as_array) {
        for video_row in videos {
            let video_id = video_id_of_row(video_row);
            if let Some(decision) = string_field(video_row, &["gate_decision"])
                .and_then(|raw| GateDecision::parse(&raw))
            {
                let severity = match decision {
                    GateDecision::Block => IssueSeverity::Major,
                    GateDecision::Review => IssueSeverity::Minor,
                    GateDecision::Pass => IssueSeverity::Info,
                };
                signals.push(CanonicalSignal {
                    issue_code: string_field(video_row, &["issue_code", "reason_code"])
                        .unwrap_or_else(|| "gate_decision".to_string()),
                    issue_severity: severity,
                    gate_decision: decision,
                    scope_type: ScopeType::Video,
                    scope_id: None,
                    video_id: video_id.clone(),
                    origin_stage: origin_stage.to_string(),
                    message: string_field(video_row, &["message", "reason"]).unwrap_or_default(),
                    signal_class: string_field(video_row, &["signal_class"]),
                });
            }
            if let Some(rows) = video_row.get("checks").and_then(Value::as_array) {
                for row in rows {
                    if let Some(mut signal) = normalize_row(row, origin_stage) {
                        if signal.video_id.is_none() {
                            signal.video_id = video_id.clone();
                            signal.scope_type = ScopeType::Video;
                        }
                        signals.push(signal);
                    }
                }
            }
        }
    }

    signals
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn maps_check_severities_onto_canonical_levels() {
        assert_eq!(
            IssueSeverity::from_check_severity("error"),
            Some(IssueSeverity::Major)
        );
        assert_eq!(
            IssueSeverity::from_check_severity("warning"),
            Some(IssueSeverity::Minor)
        );
        assert_eq!(
            IssueSeverity::from_check_severity("info"),
            Some(IssueSeverity::Info)
        );
        assert_eq!(IssueSeverity::from_check_severity("fatal"), None);
    }

    #[test]
    fn normalizes_results_array_and_drops_codeless_rows() {
        let payload = json!({
            "results": [
                {"issue_code": "missing_audio", "severity": "error", "video_id": "abcdefghijk"},
                {"severity": "error", "message": "no code, dropped"},
                {"check": "short_transcript", "severity": "warning"}
            ]
        });
        let signals = normalize_payload(&payload, "stage03_transcribe");
        assert_eq!(signals.len(), 2);
        assert_eq!(signals[0].issue_code, "missing_audio");
        assert_eq!(signals[0].issue_severity, IssueSeverity::Major);
        assert_eq!(signals[0].gate_decision, GateDecision::Block);
        assert_eq!(signals[0].scope_type, ScopeType::Video);
        assert_eq!(signals[0].video_id.as_deref(), Some("abcdefghijk"));
        assert_eq!(signals[1].issue_code, "short_transcript");
        assert_eq!(signals[1].scope_type, ScopeType::Batch);
    }

    #[test]
    fn canonical_severity_wins_over_mapping() {
        let payload = json!([{"issue_code": "x", "issue_severity": "critical"}]);
        let signals = normalize_payload(&payload, "stage");
        assert_eq!(signals[0].issue_severity, IssueSeverity::Critical);
    }

    #[test]
    fn videos_shape_synthesizes_gate_decision_signals() {
        let payload = json!({
            "videos": [
                {
                    "video_id": "abcdefghijk",
                    "gate_decision": "block",
                    "reason_code": "fail_hard",
                    "checks": [
                        {"check": "nested_warning", "severity": "warning"}
                    ]
                }
            ]
        });
        let signals = normalize_payload(&payload, "gate");
        assert_eq!(signals.len(), 2);
        assert_eq!(signals[0].issue_code, "fail_hard");
        assert_eq!(signals[0].gate_decision, GateDecision::Block);
        assert_eq!(signals[1].issue_code, "nested_warning");
        assert_eq!(signals[1].video_id.as_deref(), Some("abcdefghijk"));
    }

    #[test]
    fn invalid_video_id_degrades_to_batch_scope() {
        let payload = json!([{"issue_code": "x", "video_id": "tooshort"}]);
        let signals = normalize_payload(&payload, "stage");
        assert_eq!(signals[0].scope_type, ScopeType::Batch);
        assert!(signals[0].video_id.is_none());
    }
}
