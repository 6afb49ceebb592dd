use std::collections::BTreeMap;

use crate::confidence::{ConfidenceBand, Penalty, PenaltyStep, apply_penalties, band, severity_multiplier};
use crate::model::{CheckCounters, ReadinessStatus, WaivedSignal};
use crate::policy::{GatePolicy, WaiverSet};
use crate::signal::{CanonicalSignal, GateDecision, IssueSeverity, ScopeType};
use crate::stages::is_informational_check;

use super::{ItemEvidence, effective_class};

#[derive(Debug)]
pub struct Decision {
    pub status: ReadinessStatus,
    pub reason_code: String,
    pub counters: CheckCounters,
    pub waived: Vec<WaivedSignal>,
    /// Synthesized policy-violation signals, distinguishable from raw
    /// upstream checks by their `policy_*` issue codes.
    pub policy_signals: Vec<CanonicalSignal>,
    pub signals: Vec<CanonicalSignal>,
    pub confidence: f64,
    pub confidence_band: ConfidenceBand,
    pub penalty_trail: Vec<PenaltyStep>,
}

fn apply_waivers(
    evidence: &ItemEvidence,
    waivers: &WaiverSet,
) -> (Vec<CanonicalSignal>, Vec<WaivedSignal>) {
    let mut signals = evidence.signals.clone();
    let mut waived = Vec::new();

    for signal in &mut signals {
        if signal.issue_severity == IssueSeverity::Info {
            continue;
        }
        if let Some(rule) = waivers.match_for(&evidence.video_id, &signal.issue_code) {
            waived.push(WaivedSignal {
                video_id: evidence.video_id.clone(),
                issue_code: signal.issue_code.clone(),
                original_severity: signal.issue_severity,
                waiver: rule.clone(),
            });
            signal.issue_severity = IssueSeverity::Info;
            signal.gate_decision = GateDecision::Pass;
        }
    }

    (signals, waived)
}

fn count_signals(signals: &[CanonicalSignal]) -> CheckCounters {
    let mut counters = CheckCounters::default();
    for signal in signals {
        match signal.issue_severity {
            IssueSeverity::Critical | IssueSeverity::Major => counters.errors += 1,
            IssueSeverity::Minor => {
                counters.warnings += 1;
                *counters
                    .warnings_by_check
                    .entry(signal.issue_code.clone())
                    .or_default() += 1;
                *counters
                    .warnings_by_class
                    .entry(effective_class(signal))
                    .or_default() += 1;
            }
            IssueSeverity::Info => counters.info += 1,
        }
    }
    counters
}

fn policy_signal(evidence: &ItemEvidence, reason_code: &str, message: String) -> CanonicalSignal {
    CanonicalSignal::synthesized(
        reason_code,
        IssueSeverity::Major,
        Some(&evidence.video_id),
        "gate",
        message,
    )
}

/// Warnings that participate in budget and block-list accounting: minor
/// severity after waivers, excluding the fixed informational-only check set.
fn budgetable<'a>(signals: &'a [CanonicalSignal]) -> Vec<&'a CanonicalSignal> {
    signals
        .iter()
        .filter(|signal| signal.issue_severity == IssueSeverity::Minor)
        .filter(|signal| !is_informational_check(&signal.issue_code))
        .collect()
}

fn confidence_penalties(
    evidence: &ItemEvidence,
    signals: &[CanonicalSignal],
) -> Vec<Penalty> {
    let mut penalties = Vec::new();

    if evidence.quarantined {
        penalties.push(Penalty {
            issue_code: "preexisting_quarantine".to_string(),
            scope_type: ScopeType::Video,
            severity: IssueSeverity::Critical,
            multiplier: severity_multiplier(IssueSeverity::Critical),
        });
    }
    for stage in &evidence.missing_stages {
        penalties.push(Penalty {
            issue_code: format!("missing_{stage}"),
            scope_type: ScopeType::Video,
            severity: IssueSeverity::Major,
            multiplier: severity_multiplier(IssueSeverity::Major),
        });
    }
    for (_stage, reason_code) in &evidence.report_failures {
        penalties.push(Penalty {
            issue_code: reason_code.clone(),
            scope_type: ScopeType::Video,
            severity: IssueSeverity::Critical,
            multiplier: severity_multiplier(IssueSeverity::Critical),
        });
    }
    for signal in signals {
        if signal.issue_severity == IssueSeverity::Info {
            continue;
        }
        penalties.push(Penalty {
            issue_code: signal.issue_code.clone(),
            scope_type: signal.scope_type,
            severity: signal.issue_severity,
            multiplier: severity_multiplier(signal.issue_severity),
        });
    }

    penalties
}

/// The readiness state machine. Strict priority order, first match wins;
/// waivers have already demoted their signals before any step runs.
pub fn decide(evidence: &ItemEvidence, policy: &GatePolicy, waivers: &WaiverSet) -> Decision {
    let (signals, waived) = apply_waivers(evidence, waivers);
    let counters = count_signals(&signals);
    let penalties = confidence_penalties(evidence, &signals);
    let (confidence, penalty_trail) = apply_penalties(1.0, &penalties);
    let confidence_band = band(confidence);

    let mut policy_signals = Vec::new();
    let (status, reason_code) =
        evaluate_ladder(evidence, policy, &signals, &mut policy_signals);

    Decision {
        status,
        reason_code,
        counters,
        waived,
        policy_signals,
        signals,
        confidence,
        confidence_band,
        penalty_trail,
    }
}

fn evaluate_ladder(
    evidence: &ItemEvidence,
    policy: &GatePolicy,
    signals: &[CanonicalSignal],
    policy_signals: &mut Vec<CanonicalSignal>,
) -> (ReadinessStatus, String) {
    // 1. Already quarantined.
    if evidence.quarantined {
        return (ReadinessStatus::Blocked, "preexisting_quarantine".to_string());
    }

    // 2. Missing report coverage.
    if let Some(stage) = evidence.missing_stages.first() {
        return (ReadinessStatus::Blocked, format!("missing_{stage}"));
    }

    // 3. Structurally invalid report(s).
    if !evidence.invalid_report_stages.is_empty() {
        return (ReadinessStatus::Blocked, "invalid_stage_report".to_string());
    }

    // 4. Hard failures: a FAIL report blocks with that report's own reason
    // code; an error-severity check blocks with the check name.
    if let Some((_stage, reason_code)) = evidence.report_failures.first() {
        return (ReadinessStatus::Blocked, reason_code.clone());
    }
    if let Some(signal) = signals
        .iter()
        .find(|signal| signal.issue_severity >= IssueSeverity::Major)
    {
        return (ReadinessStatus::Blocked, signal.issue_code.clone());
    }

    // 5. Policy escalation, in fixed precedence order.
    let warnings = budgetable(signals);
    let content_type = evidence.content_type.as_deref();

    if let Some(signal) = warnings
        .iter()
        .find(|signal| policy.block_warning_checks.contains(&signal.issue_code))
    {
        policy_signals.push(policy_signal(
            evidence,
            "policy_block_check",
            format!("check '{}' is block-listed", signal.issue_code),
        ));
        return (ReadinessStatus::Blocked, "policy_block_check".to_string());
    }

    if let Some(signal) = warnings
        .iter()
        .find(|signal| policy.block_warning_classes.contains(&effective_class(signal)))
    {
        policy_signals.push(policy_signal(
            evidence,
            "policy_block_class",
            format!("signal class '{}' is block-listed", effective_class(signal)),
        ));
        return (ReadinessStatus::Blocked, "policy_block_class".to_string());
    }

    if let Some(signal) = warnings.iter().find(|signal| {
        let class = effective_class(signal);
        content_type
            .map(|content_type| {
                policy
                    .block_warning_classes_by_content_type
                    .get(content_type)
                    .map(|classes| classes.contains(&class))
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }) {
        policy_signals.push(policy_signal(
            evidence,
            "policy_block_class_content_type",
            format!(
                "signal class '{}' is block-listed for content type '{}'",
                effective_class(signal),
                content_type.unwrap_or_default()
            ),
        ));
        return (
            ReadinessStatus::Blocked,
            "policy_block_class_content_type".to_string(),
        );
    }

    let mut by_class: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_check: BTreeMap<String, usize> = BTreeMap::new();
    for signal in &warnings {
        *by_class.entry(effective_class(signal)).or_default() += 1;
        *by_check.entry(signal.issue_code.clone()).or_default() += 1;
    }

    for (class, count) in &by_class {
        if let Some(max) = policy.max_warnings_by_class.get(class) {
            if count > max {
                policy_signals.push(policy_signal(
                    evidence,
                    "policy_class_budget_exceeded",
                    format!("class '{class}' has {count} warnings, budget {max}"),
                ));
                return (
                    ReadinessStatus::Blocked,
                    "policy_class_budget_exceeded".to_string(),
                );
            }
        }
    }

    for (check, count) in &by_check {
        if let Some(max) = policy.max_warnings_by_check.get(check) {
            if count > max {
                policy_signals.push(policy_signal(
                    evidence,
                    "policy_check_budget_exceeded",
                    format!("check '{check}' has {count} warnings, budget {max}"),
                ));
                return (
                    ReadinessStatus::Blocked,
                    "policy_check_budget_exceeded".to_string(),
                );
            }
        }
    }

    if let Some(max) = policy.max_warning_checks {
        let total = warnings.len();
        if total > max {
            policy_signals.push(policy_signal(
                evidence,
                "policy_total_budget_exceeded",
                format!("{total} total warnings exceed the global budget of {max}"),
            ));
            return (
                ReadinessStatus::Blocked,
                "policy_total_budget_exceeded".to_string(),
            );
        }
    }

    // 6. Residual warnings against per-content-type review budgets. The
    // class with the largest excess becomes the reason code.
    let mut worst_class: Option<(&str, usize)> = None;
    for (class, count) in &by_class {
        let budget = policy.review_budget(content_type, class);
        let excess = count.saturating_sub(budget);
        if excess == 0 {
            continue;
        }
        let replace = match worst_class {
            None => true,
            Some((_, best)) => excess > best,
        };
        if replace {
            worst_class = Some((class.as_str(), excess));
        }
    }
    if let Some((class, _excess)) = worst_class {
        return (ReadinessStatus::Review, class.to_string());
    }

    // 7. Nothing left to hold against it.
    (ReadinessStatus::Ready, "ok".to_string())
}
