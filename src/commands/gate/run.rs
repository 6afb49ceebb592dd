use std::collections::BTreeSet;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use crate::cli::GateArgs;
use crate::index::scan_reports;
use crate::model::{
    ReadinessRecord, ReadinessSummary, StatusHistogram, WaiverAudit,
};
use crate::policy::{
    GatePolicy, WaiverSet, load_waivers, parse_budget_entry, parse_scoped_budget_entry,
    parse_scoped_class_entry,
};
use crate::quarantine::{self, QuarantineReason, QuarantinedVideo};
use crate::scope::parse_manifest;
use crate::signal::{CanonicalSignal, normalize_payload};
use crate::util::{now_utc_string, read_json_value, sha256_hex, write_json_pretty};

use super::{collect_evidence, decide};

pub fn build_policy(args: &GateArgs) -> Result<GatePolicy> {
    let mut policy = GatePolicy {
        block_warning_checks: args.block_warning_checks.iter().cloned().collect(),
        block_warning_classes: args.block_warning_classes.iter().cloned().collect(),
        max_warning_checks: args.max_warning_checks,
        review_class_budget_default: args.review_warning_class_budget,
        missing_media_severity: args.missing_media_severity,
        strict: args.strict,
        ..GatePolicy::default()
    };

    for raw in &args.block_warning_classes_by_content_type {
        let (content_type, class) = parse_scoped_class_entry(raw)?;
        policy
            .block_warning_classes_by_content_type
            .entry(content_type)
            .or_default()
            .insert(class);
    }
    for raw in &args.max_warning_checks_by_check {
        let (check, count) = parse_budget_entry(raw)?;
        policy.max_warnings_by_check.insert(check, count);
    }
    for raw in &args.max_warning_checks_by_class {
        let (class, count) = parse_budget_entry(raw)?;
        policy.max_warnings_by_class.insert(class, count);
    }
    for raw in &args.review_warning_class_budgets_by_content_type {
        let (content_type, class, budget) = parse_scoped_budget_entry(raw)?;
        policy
            .review_class_budget_by_content_type
            .entry(content_type)
            .or_default()
            .insert(class, budget);
    }

    Ok(policy)
}

/// Deterministic digest of the summary body, excluding `generated_at`. Two
/// runs over identical inputs must agree on this value.
fn summary_digest<T: Serialize>(body: &T) -> Result<String> {
    let data = serde_json::to_vec(body).context("failed to serialize summary body for digest")?;
    Ok(sha256_hex(&data))
}

pub fn run(args: GateArgs) -> Result<i32> {
    let mut scope = parse_manifest(&args.manifest)
        .with_context(|| format!("failed to load manifest: {}", args.manifest.display()))?;
    if let Some(source) = &args.source {
        scope = scope.filter_source(source);
    }

    let policy = build_policy(&args)?;

    let waiver_rules = match &args.waiver_file {
        Some(path) => load_waivers(path)?,
        None => Vec::new(),
    };
    let waivers = WaiverSet::partition(waiver_rules, Utc::now());

    let index = scan_reports(&args.reports_root, &scope);
    let quarantine_before = quarantine::load(&args.quarantine_file)?;

    let mut evidence = collect_evidence(&scope, &index, &quarantine_before, &policy);

    // Foreign validator outputs, normalized onto the canonical schema.
    // Batch-scope rows carry no id and cannot be pinned to an item.
    for path in &args.extra_signals {
        let payload = read_json_value(path)?;
        let extra = normalize_payload(&payload, "external");
        let mut unattached = 0_usize;
        for signal in extra {
            match signal
                .video_id
                .as_deref()
                .and_then(|video_id| evidence.iter_mut().find(|item| item.video_id == video_id))
            {
                Some(item) => item.signals.push(signal),
                None => unattached += 1,
            }
        }
        if unattached > 0 {
            debug!(
                path = %path.display(),
                count = unattached,
                "extra signals without an in-scope video id were ignored"
            );
        }
    }

    let mut records = Vec::with_capacity(evidence.len());
    let mut totals = StatusHistogram::default();
    let mut waiver_audit = WaiverAudit {
        active: waivers.active.clone(),
        expired: waivers.expired.clone(),
        waived_signals: Vec::new(),
    };
    let mut all_signals: Vec<CanonicalSignal> = Vec::new();
    let mut additions: Vec<QuarantinedVideo> = Vec::new();

    for item in &evidence {
        let decision = decide(item, &policy, &waivers);
        totals.record(decision.status);
        waiver_audit
            .waived_signals
            .extend(decision.waived.iter().cloned());
        all_signals.extend(decision.signals.iter().cloned());
        all_signals.extend(decision.policy_signals.iter().cloned());

        if decision.status == crate::model::ReadinessStatus::Blocked
            && !quarantine_before.contains(&item.video_id)
        {
            additions.push(QuarantinedVideo {
                video_id: item.video_id.clone(),
                checks: BTreeSet::from([decision.reason_code.clone()]),
                reasons: vec![QuarantineReason {
                    severity: "error".to_string(),
                    check: decision.reason_code.clone(),
                    message: format!(
                        "blocked by readiness gate (confidence {:.2})",
                        decision.confidence
                    ),
                }],
            });
        }

        records.push(ReadinessRecord {
            video_id: item.video_id.clone(),
            source: item.source.clone(),
            status: decision.status,
            gate_decision: decision.status.gate_decision(),
            reason_code: decision.reason_code,
            counters: decision.counters,
            content_type: item.content_type.clone(),
            ready_for_ingest: decision.status == crate::model::ReadinessStatus::Ready,
            confidence: decision.confidence,
            confidence_band: decision.confidence_band,
            penalty_trail: decision.penalty_trail,
        });
    }

    let newly_quarantined: Vec<String> = additions
        .iter()
        .map(|addition| addition.video_id.clone())
        .collect();

    if !args.no_quarantine_write && !additions.is_empty() {
        // Single-writer read-merge-write: reload right before writing so a
        // concurrent run's additions are never dropped.
        let mut latest = quarantine::load(&args.quarantine_file)?;
        latest.merge(&additions);
        quarantine::store(&args.quarantine_file, &latest)?;
        info!(
            path = %args.quarantine_file.display(),
            added = additions.len(),
            "quarantine file updated"
        );
    }

    let digest = summary_digest(&(&policy, &totals, &records, &waiver_audit))?;
    let summary = ReadinessSummary {
        manifest_version: 1,
        generated_at: now_utc_string(),
        manifest_path: args.manifest.display().to_string(),
        reports_root: args.reports_root.display().to_string(),
        policy,
        totals,
        records,
        waivers: waiver_audit,
        malformed_manifest_lines: scope.malformed_lines.clone(),
        newly_quarantined,
        summary_digest: digest,
    };

    write_json_pretty(&args.summary_path, &summary)?;
    info!(path = %args.summary_path.display(), "readiness summary written");

    if args.emit_signals {
        let signals_path = args.summary_path.with_file_name("canonical_signals.json");
        write_json_pretty(&signals_path, &all_signals)?;
        info!(path = %signals_path.display(), "canonical signals written");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "gate: {} ready, {} review, {} blocked of {}",
            summary.totals.ready,
            summary.totals.review,
            summary.totals.blocked,
            summary.totals.total()
        );
        for record in &summary.records {
            println!(
                "  {} {} [{}] reason={} confidence={:.2} ({})",
                record.video_id,
                record.status.as_str(),
                record.content_type.as_deref().unwrap_or("-"),
                record.reason_code,
                record.confidence,
                record.confidence_band.as_str()
            );
        }
    }

    let failing =
        summary.totals.blocked > 0 || (args.strict && summary.totals.review > 0);
    Ok(if failing { 1 } else { 0 })
}
