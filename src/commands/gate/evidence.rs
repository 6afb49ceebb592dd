use serde_json::Value;

use crate::index::{ReportIndex, ReportPayload};
use crate::policy::{GatePolicy, MissingMediaSeverity};
use crate::quarantine::QuarantineSet;
use crate::report::{ReportCheck, parse_report, validate_report_value};
use crate::scope::Scope;
use crate::signal::{CanonicalSignal, GateDecision, IssueSeverity, ScopeType};
use crate::stages::{CONTENT_TYPE_STAGE, MEDIA_STAGE, STAGES};

/// Everything the decision ladder needs to know about one item, collected in
/// a single pass over the report index. Per-item collection is independent
/// across items.
#[derive(Debug, Default)]
pub struct ItemEvidence {
    pub video_id: String,
    pub source: String,
    pub quarantined: bool,
    /// Stages expected in scope with no report at all.
    pub missing_stages: Vec<&'static str>,
    /// Stages whose report failed the structural contract.
    pub invalid_report_stages: Vec<String>,
    /// (stage, reason_code) for reports with status FAIL.
    pub report_failures: Vec<(String, String)>,
    /// Check-derived plus synthesized signals, in stage order.
    pub signals: Vec<CanonicalSignal>,
    pub content_type: Option<String>,
}

fn signal_from_check(check: &ReportCheck, stage: &str, video_id: &str) -> CanonicalSignal {
    let severity =
        IssueSeverity::from_check_severity(&check.severity).unwrap_or(IssueSeverity::Info);
    CanonicalSignal {
        issue_code: check.check.clone(),
        issue_severity: severity,
        gate_decision: match severity {
            IssueSeverity::Critical | IssueSeverity::Major => GateDecision::Block,
            IssueSeverity::Minor => GateDecision::Review,
            IssueSeverity::Info => GateDecision::Pass,
        },
        scope_type: ScopeType::Video,
        scope_id: None,
        video_id: Some(video_id.to_string()),
        origin_stage: stage.to_string(),
        message: check.message.clone(),
        signal_class: check.signal_class.clone(),
    }
}

fn content_type_from_metrics(payload: &Value) -> Option<String> {
    payload
        .get("metrics")
        .and_then(|metrics| metrics.get("content_type"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Build per-item evidence for the whole scope. Structural validation runs
/// here so an invalid report is excluded from PASS/WARN/FAIL aggregation but
/// still contributes its blocking signal.
pub fn collect_evidence(
    scope: &Scope,
    index: &ReportIndex,
    quarantine: &QuarantineSet,
    policy: &GatePolicy,
) -> Vec<ItemEvidence> {
    scope
        .entries
        .iter()
        .map(|entry| {
            let mut evidence = ItemEvidence {
                video_id: entry.video_id.clone(),
                source: entry.source.clone(),
                quarantined: quarantine.contains(&entry.video_id),
                ..ItemEvidence::default()
            };

            for stage in STAGES {
                let Some(report) = index.get(stage.key, &entry.video_id) else {
                    if stage.key == MEDIA_STAGE
                        && policy.missing_media_severity == MissingMediaSeverity::Warning
                    {
                        evidence.signals.push(CanonicalSignal::synthesized(
                            "missing_stage01_media",
                            IssueSeverity::Minor,
                            Some(&entry.video_id),
                            stage.key,
                            "media stage has no report for this id".to_string(),
                        ));
                    } else {
                        evidence.missing_stages.push(stage.key);
                    }
                    continue;
                };

                let payload = match &report.payload {
                    ReportPayload::Parsed(value) => value,
                    ReportPayload::Unreadable(message) => {
                        evidence.invalid_report_stages.push(stage.key.to_string());
                        evidence.signals.push(CanonicalSignal::synthesized(
                            "invalid_stage_report",
                            IssueSeverity::Major,
                            Some(&entry.video_id),
                            stage.key,
                            format!("unreadable report {}: {message}", report.path.display()),
                        ));
                        continue;
                    }
                };

                let issues = validate_report_value(payload);
                if !issues.is_empty() {
                    evidence.invalid_report_stages.push(stage.key.to_string());
                    evidence.signals.push(CanonicalSignal::synthesized(
                        "invalid_stage_report",
                        IssueSeverity::Major,
                        Some(&entry.video_id),
                        stage.key,
                        format!(
                            "{} structural violation(s) in {}",
                            issues.len(),
                            report.path.display()
                        ),
                    ));
                    continue;
                }

                let Some(parsed) = parse_report(payload) else {
                    evidence.invalid_report_stages.push(stage.key.to_string());
                    evidence.signals.push(CanonicalSignal::synthesized(
                        "invalid_stage_report",
                        IssueSeverity::Major,
                        Some(&entry.video_id),
                        stage.key,
                        format!("report could not be parsed: {}", report.path.display()),
                    ));
                    continue;
                };

                if parsed.status == "FAIL" {
                    evidence
                        .report_failures
                        .push((stage.key.to_string(), parsed.reason_code.clone()));
                }
                if stage.key == CONTENT_TYPE_STAGE {
                    evidence.content_type = content_type_from_metrics(payload);
                }

                for check in &parsed.checks {
                    evidence
                        .signals
                        .push(signal_from_check(check, stage.key, &entry.video_id));
                }
            }

            evidence
        })
        .collect()
}
