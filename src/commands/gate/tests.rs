use std::fs;
use std::path::Path;

use chrono::Utc;
use serde_json::{Value, json};

use crate::cli::GateArgs;
use crate::index::scan_reports;
use crate::model::ReadinessStatus;
use crate::policy::{GatePolicy, MissingMediaSeverity, Waiver, WaiverSet};
use crate::quarantine::QuarantineSet;
use crate::scope::parse_manifest_text;
use crate::signal::{CanonicalSignal, IssueSeverity};
use crate::stages::STAGES;

use super::{ItemEvidence, collect_evidence, decide};

fn no_waivers() -> WaiverSet {
    WaiverSet::default()
}

fn warning_signal(video_id: &str, check: &str) -> CanonicalSignal {
    CanonicalSignal::synthesized(
        check,
        IssueSeverity::Minor,
        Some(video_id),
        "stage03_transcribe",
        format!("{check} fired"),
    )
}

fn error_signal(video_id: &str, check: &str) -> CanonicalSignal {
    CanonicalSignal::synthesized(
        check,
        IssueSeverity::Major,
        Some(video_id),
        "stage03_transcribe",
        format!("{check} fired"),
    )
}

fn evidence_with_signals(signals: Vec<CanonicalSignal>) -> ItemEvidence {
    ItemEvidence {
        video_id: "abcdefghijk".to_string(),
        source: "coach_x".to_string(),
        signals,
        ..ItemEvidence::default()
    }
}

#[test]
fn quarantine_outranks_every_other_condition() {
    let mut evidence = evidence_with_signals(vec![error_signal("abcdefghijk", "hard_error")]);
    evidence.quarantined = true;
    evidence
        .report_failures
        .push(("stage03_transcribe".to_string(), "asr_failed".to_string()));

    let decision = decide(&evidence, &GatePolicy::default(), &no_waivers());
    assert_eq!(decision.status, ReadinessStatus::Blocked);
    assert_eq!(decision.reason_code, "preexisting_quarantine");
}

#[test]
fn block_condition_beats_review_condition() {
    // One blocking error plus enough warnings to exceed any review budget:
    // the ladder must resolve to BLOCKED, never REVIEW.
    let mut signals = vec![error_signal("abcdefghijk", "hard_error")];
    for index in 0..10 {
        signals.push(warning_signal("abcdefghijk", &format!("stage08_warn_{index}")));
    }
    let evidence = evidence_with_signals(signals);

    let decision = decide(&evidence, &GatePolicy::default(), &no_waivers());
    assert_eq!(decision.status, ReadinessStatus::Blocked);
    assert_eq!(decision.reason_code, "hard_error");
}

#[test]
fn missing_coverage_blocks_with_stage_reason() {
    let mut evidence = evidence_with_signals(Vec::new());
    evidence.missing_stages.push("stage03_transcribe");

    let decision = decide(&evidence, &GatePolicy::default(), &no_waivers());
    assert_eq!(decision.status, ReadinessStatus::Blocked);
    assert_eq!(decision.reason_code, "missing_stage03_transcribe");
}

#[test]
fn structurally_invalid_report_is_never_ready() {
    let mut evidence = evidence_with_signals(Vec::new());
    evidence
        .invalid_report_stages
        .push("stage05_features".to_string());

    let decision = decide(&evidence, &GatePolicy::default(), &no_waivers());
    assert_eq!(decision.status, ReadinessStatus::Blocked);
    assert_eq!(decision.reason_code, "invalid_stage_report");
}

#[test]
fn fail_report_blocks_with_its_own_reason_code() {
    let mut evidence = evidence_with_signals(Vec::new());
    evidence
        .report_failures
        .push(("stage03_transcribe".to_string(), "asr_failed".to_string()));

    let decision = decide(&evidence, &GatePolicy::default(), &no_waivers());
    assert_eq!(decision.status, ReadinessStatus::Blocked);
    assert_eq!(decision.reason_code, "asr_failed");
}

#[test]
fn block_list_precedence_over_budgets() {
    let mut policy = GatePolicy::default();
    policy
        .block_warning_checks
        .insert("transcript_gap_run".to_string());
    policy
        .max_warnings_by_class
        .insert("transcript_quality".to_string(), 0);

    let evidence =
        evidence_with_signals(vec![warning_signal("abcdefghijk", "transcript_gap_run")]);
    let decision = decide(&evidence, &policy, &no_waivers());
    assert_eq!(decision.status, ReadinessStatus::Blocked);
    assert_eq!(decision.reason_code, "policy_block_check");
    assert_eq!(decision.policy_signals.len(), 1);
    assert!(decision.policy_signals[0].message.contains("transcript_gap_run"));
}

#[test]
fn class_budget_blocks_when_exceeded() {
    let mut policy = GatePolicy::default();
    policy
        .max_warnings_by_class
        .insert("taxonomy_coverage".to_string(), 1);

    let evidence = evidence_with_signals(vec![
        warning_signal("abcdefghijk", "stage08_missing_label"),
        warning_signal("abcdefghijk", "stage08_sparse_tags"),
    ]);
    let decision = decide(&evidence, &policy, &no_waivers());
    assert_eq!(decision.status, ReadinessStatus::Blocked);
    assert_eq!(decision.reason_code, "policy_class_budget_exceeded");
}

#[test]
fn global_budget_blocks_total_warnings() {
    let mut policy = GatePolicy::default();
    policy.max_warning_checks = Some(2);
    // Keep review budgets out of the way so only the global budget fires.
    policy.review_class_budget_default = 100;

    let evidence = evidence_with_signals(vec![
        warning_signal("abcdefghijk", "stage08_a"),
        warning_signal("abcdefghijk", "transcript_b"),
        warning_signal("abcdefghijk", "speaker_c"),
    ]);
    let decision = decide(&evidence, &policy, &no_waivers());
    assert_eq!(decision.status, ReadinessStatus::Blocked);
    assert_eq!(decision.reason_code, "policy_total_budget_exceeded");
}

#[test]
fn review_budget_excess_reviews_with_worst_class() {
    let mut policy = GatePolicy::default();
    policy.review_class_budget_default = 1;

    let evidence = evidence_with_signals(vec![
        warning_signal("abcdefghijk", "stage08_a"),
        warning_signal("abcdefghijk", "stage08_b"),
        warning_signal("abcdefghijk", "stage08_c"),
        warning_signal("abcdefghijk", "transcript_a"),
        warning_signal("abcdefghijk", "transcript_b"),
    ]);
    let decision = decide(&evidence, &policy, &no_waivers());
    assert_eq!(decision.status, ReadinessStatus::Review);
    // taxonomy_coverage has excess 2, transcript_quality excess 1.
    assert_eq!(decision.reason_code, "taxonomy_coverage");
}

#[test]
fn warnings_under_budget_stay_ready() {
    let evidence = evidence_with_signals(vec![warning_signal("abcdefghijk", "stage08_a")]);
    let decision = decide(&evidence, &GatePolicy::default(), &no_waivers());
    assert_eq!(decision.status, ReadinessStatus::Ready);
    assert_eq!(decision.reason_code, "ok");
    assert_eq!(decision.counters.warnings, 1);
    assert!(decision.confidence < 1.0);
}

#[test]
fn informational_checks_never_escalate() {
    let mut policy = GatePolicy::default();
    policy.review_class_budget_default = 0;
    policy.max_warning_checks = Some(0);

    let evidence = evidence_with_signals(vec![
        warning_signal("abcdefghijk", "normalization_repair_applied"),
        warning_signal("abcdefghijk", "unicode_nfc_applied"),
    ]);
    let decision = decide(&evidence, &policy, &no_waivers());
    assert_eq!(decision.status, ReadinessStatus::Ready);
}

#[test]
fn waiver_demotes_error_and_is_recorded() {
    let waivers = WaiverSet::partition(
        vec![Waiver {
            video_id: "*".to_string(),
            check: "hard_error".to_string(),
            note: Some("known tooling bug".to_string()),
            expires_at: None,
        }],
        Utc::now(),
    );

    let evidence = evidence_with_signals(vec![error_signal("abcdefghijk", "hard_error")]);
    let decision = decide(&evidence, &GatePolicy::default(), &waivers);
    assert_eq!(decision.status, ReadinessStatus::Ready);
    assert_eq!(decision.waived.len(), 1);
    assert_eq!(decision.waived[0].original_severity, IssueSeverity::Major);
    assert_eq!(decision.counters.errors, 0);
    assert_eq!(decision.counters.info, 1);
}

#[test]
fn content_type_scoped_block_requires_matching_type() {
    let mut policy = GatePolicy::default();
    policy
        .block_warning_classes_by_content_type
        .entry("drill".to_string())
        .or_default()
        .insert("taxonomy_coverage".to_string());

    let mut evidence = evidence_with_signals(vec![warning_signal("abcdefghijk", "stage08_a")]);
    evidence.content_type = Some("lesson".to_string());
    let decision = decide(&evidence, &policy, &no_waivers());
    assert_eq!(decision.status, ReadinessStatus::Ready);

    evidence.content_type = Some("drill".to_string());
    let decision = decide(&evidence, &policy, &no_waivers());
    assert_eq!(decision.status, ReadinessStatus::Blocked);
    assert_eq!(decision.reason_code, "policy_block_class_content_type");
}

#[test]
fn policy_flags_parse_into_structured_policy() {
    let mut args = gate_args(Path::new("."), Path::new("manifest.txt"));
    args.block_warning_checks = vec!["transcript_gap_run".to_string()];
    args.block_warning_classes = vec!["artifact_contract".to_string()];
    args.block_warning_classes_by_content_type = vec!["drill:taxonomy_coverage".to_string()];
    args.max_warning_checks = Some(12);
    args.max_warning_checks_by_check = vec!["stage08_sparse_tags=2".to_string()];
    args.max_warning_checks_by_class = vec!["taxonomy_coverage=4".to_string()];
    args.review_warning_class_budgets_by_content_type =
        vec!["lesson:transcript_quality=1".to_string()];

    let policy = super::run::build_policy(&args).expect("policy");
    assert!(policy.block_warning_checks.contains("transcript_gap_run"));
    assert!(policy.block_warning_classes.contains("artifact_contract"));
    assert!(policy.block_warning_classes_by_content_type["drill"].contains("taxonomy_coverage"));
    assert_eq!(policy.max_warning_checks, Some(12));
    assert_eq!(policy.max_warnings_by_check["stage08_sparse_tags"], 2);
    assert_eq!(policy.max_warnings_by_class["taxonomy_coverage"], 4);
    assert_eq!(policy.review_budget(Some("lesson"), "transcript_quality"), 1);
    assert_eq!(
        policy.review_budget(Some("lesson"), "taxonomy_coverage"),
        crate::policy::DEFAULT_REVIEW_CLASS_BUDGET
    );

    args.max_warning_checks_by_check = vec!["no_equals_sign".to_string()];
    assert!(super::run::build_policy(&args).is_err());
}

// ---------------------------------------------------------------------------
// Filesystem fixtures
// ---------------------------------------------------------------------------

fn stage_report(stage: &str, video_id: &str, status: &str, reason: &str, checks: Value) -> Value {
    let mut report = json!({
        "stage": stage,
        "status": status,
        "reason_code": reason,
        "video_id": video_id,
        "source": "coach_x",
        "stem": format!("Title [{video_id}]"),
        "inputs": [],
        "outputs": [{"path": format!("{stage}/{video_id}.out.json")}],
        "checks": checks,
        "metrics": {},
        "timestamps": {
            "started_at": "2026-01-01T00:00:00Z",
            "finished_at": "2026-01-01T00:01:00Z",
            "elapsed_sec": 60.0
        },
        "versions": {"pipeline_version": "1.0.0"}
    });
    if stage == "stage06_segment" {
        report["metrics"] = json!({"content_type": "lesson"});
    }
    report
}

fn write_all_stage_reports(root: &Path, video_id: &str) {
    for stage in STAGES {
        let dir = root.join(stage.key);
        fs::create_dir_all(&dir).expect("mkdir");
        let report = stage_report(stage.key, video_id, "PASS", "ok", json!([]));
        fs::write(
            dir.join(format!("{video_id}.report.json")),
            serde_json::to_string_pretty(&report).expect("json"),
        )
        .expect("write");
    }
}

fn overwrite_report(root: &Path, stage: &str, video_id: &str, report: &Value) {
    fs::write(
        root.join(stage).join(format!("{video_id}.report.json")),
        serde_json::to_string_pretty(report).expect("json"),
    )
    .expect("write");
}

#[test]
fn evidence_collection_reads_status_checks_and_content_type() {
    let dir = tempfile::tempdir().expect("tempdir");
    let scope = parse_manifest_text("coach_x | A [abcdefghijk]\n");
    write_all_stage_reports(dir.path(), "abcdefghijk");

    let warn_report = stage_report(
        "stage03_transcribe",
        "abcdefghijk",
        "WARN",
        "low_confidence",
        json!([{"severity": "warning", "check": "transcript_gap_run", "message": "3 gaps"}]),
    );
    overwrite_report(dir.path(), "stage03_transcribe", "abcdefghijk", &warn_report);

    let index = scan_reports(dir.path(), &scope);
    let evidence = collect_evidence(
        &scope,
        &index,
        &QuarantineSet::empty(),
        &GatePolicy::default(),
    );

    assert_eq!(evidence.len(), 1);
    let item = &evidence[0];
    assert!(item.missing_stages.is_empty());
    assert!(item.invalid_report_stages.is_empty());
    assert!(item.report_failures.is_empty());
    assert_eq!(item.content_type.as_deref(), Some("lesson"));
    assert_eq!(item.signals.len(), 1);
    assert_eq!(item.signals[0].issue_code, "transcript_gap_run");
    assert_eq!(item.signals[0].issue_severity, IssueSeverity::Minor);
}

#[test]
fn missing_media_knob_downgrades_to_warning_signal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let scope = parse_manifest_text("coach_x | A [abcdefghijk]\n");
    write_all_stage_reports(dir.path(), "abcdefghijk");
    fs::remove_file(
        dir.path()
            .join("stage01_media")
            .join("abcdefghijk.report.json"),
    )
    .expect("remove");

    let index = scan_reports(dir.path(), &scope);

    let strict_policy = GatePolicy::default();
    let evidence = collect_evidence(&scope, &index, &QuarantineSet::empty(), &strict_policy);
    assert_eq!(evidence[0].missing_stages, vec!["stage01_media"]);

    let lenient_policy = GatePolicy {
        missing_media_severity: MissingMediaSeverity::Warning,
        ..GatePolicy::default()
    };
    let evidence = collect_evidence(&scope, &index, &QuarantineSet::empty(), &lenient_policy);
    assert!(evidence[0].missing_stages.is_empty());
    assert_eq!(evidence[0].signals.len(), 1);
    assert_eq!(evidence[0].signals[0].issue_code, "missing_stage01_media");
}

fn gate_args(root: &Path, manifest: &Path) -> GateArgs {
    GateArgs {
        manifest: manifest.to_path_buf(),
        source: None,
        reports_root: root.to_path_buf(),
        quarantine_file: root.join("gate/quarantine.json"),
        waiver_file: None,
        extra_signals: Vec::new(),
        summary_path: root.join("gate/readiness_summary.json"),
        emit_signals: false,
        no_quarantine_write: false,
        block_warning_checks: Vec::new(),
        block_warning_classes: Vec::new(),
        block_warning_classes_by_content_type: Vec::new(),
        max_warning_checks: None,
        max_warning_checks_by_check: Vec::new(),
        max_warning_checks_by_class: Vec::new(),
        review_warning_class_budget: crate::policy::DEFAULT_REVIEW_CLASS_BUDGET,
        review_warning_class_budgets_by_content_type: Vec::new(),
        missing_media_severity: MissingMediaSeverity::Error,
        json: false,
        strict: false,
    }
}

fn write_three_item_fixture(root: &Path) -> std::path::PathBuf {
    let manifest = root.join("manifest.txt");
    fs::write(
        &manifest,
        "coach_x | A [AAAAAAAAAAa]\ncoach_x | B [BBBBBBBBBBb]\ncoach_x | C [CCCCCCCCCCc]\n",
    )
    .expect("write manifest");

    for video_id in ["AAAAAAAAAAa", "BBBBBBBBBBb", "CCCCCCCCCCc"] {
        write_all_stage_reports(root, video_id);
    }

    // B: one warning, absorbed by the default review budget.
    let warn = stage_report(
        "stage03_transcribe",
        "BBBBBBBBBBb",
        "WARN",
        "low_confidence",
        json!([{"severity": "warning", "check": "transcript_gap_run", "message": "1 gap"}]),
    );
    overwrite_report(root, "stage03_transcribe", "BBBBBBBBBBb", &warn);

    // C: hard failure with its own reason code.
    let fail = stage_report(
        "stage03_transcribe",
        "CCCCCCCCCCc",
        "FAIL",
        "asr_failed",
        json!([]),
    );
    overwrite_report(root, "stage03_transcribe", "CCCCCCCCCCc", &fail);

    manifest
}

fn read_summary(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).expect("read summary")).expect("parse summary")
}

#[test]
fn end_to_end_three_item_scenario() {
    let dir = tempfile::tempdir().expect("tempdir");
    let manifest = write_three_item_fixture(dir.path());

    let mut args = gate_args(dir.path(), &manifest);
    args.no_quarantine_write = true;
    let exit = super::run(args.clone()).expect("gate run");
    assert_eq!(exit, 1, "blocked item must produce a non-zero exit");

    let summary = read_summary(&dir.path().join("gate/readiness_summary.json"));
    let records = summary["records"].as_array().expect("records");
    assert_eq!(records.len(), 3);

    let by_id = |video_id: &str| -> &Value {
        records
            .iter()
            .find(|record| record["video_id"] == video_id)
            .expect("record")
    };
    assert_eq!(by_id("AAAAAAAAAAa")["status"], "READY");
    assert_eq!(by_id("AAAAAAAAAAa")["reason_code"], "ok");
    assert_eq!(by_id("BBBBBBBBBBb")["status"], "READY");
    assert_eq!(by_id("CCCCCCCCCCc")["status"], "BLOCKED");
    assert_eq!(by_id("CCCCCCCCCCc")["reason_code"], "asr_failed");
    assert_eq!(by_id("CCCCCCCCCCc")["ready_for_ingest"], false);

    let first_digest = summary["summary_digest"].as_str().expect("digest").to_string();

    // Re-running over identical inputs must reproduce the summary body.
    let exit = super::run(args).expect("gate rerun");
    assert_eq!(exit, 1);
    let second = read_summary(&dir.path().join("gate/readiness_summary.json"));
    assert_eq!(second["summary_digest"].as_str().expect("digest"), first_digest);
    assert_eq!(summary["records"], second["records"]);
    assert_eq!(summary["totals"], second["totals"]);
}

#[test]
fn extra_signals_attach_only_to_in_scope_items() {
    let dir = tempfile::tempdir().expect("tempdir");
    let manifest = write_three_item_fixture(dir.path());

    let extra_path = dir.path().join("external_checks.json");
    fs::write(
        &extra_path,
        serde_json::to_string_pretty(&json!({
            "results": [
                {"check": "external_review_flag", "severity": "error", "video_id": "AAAAAAAAAAa"},
                {"check": "unattached", "severity": "error", "video_id": "zzzzzzzzzzz"}
            ]
        }))
        .expect("json"),
    )
    .expect("write extra signals");

    let mut args = gate_args(dir.path(), &manifest);
    args.no_quarantine_write = true;
    args.extra_signals = vec![extra_path];
    args.emit_signals = true;
    super::run(args).expect("gate run");

    let summary = read_summary(&dir.path().join("gate/readiness_summary.json"));
    let record = summary["records"]
        .as_array()
        .expect("records")
        .iter()
        .find(|record| record["video_id"] == "AAAAAAAAAAa")
        .expect("record")
        .clone();
    assert_eq!(record["status"], "BLOCKED");
    assert_eq!(record["reason_code"], "external_review_flag");

    let signals: Value = serde_json::from_str(
        &fs::read_to_string(dir.path().join("gate/canonical_signals.json"))
            .expect("read signals"),
    )
    .expect("parse signals");
    let codes: Vec<&str> = signals
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|signal| signal["issue_code"].as_str())
        .collect();
    assert!(codes.contains(&"external_review_flag"));
    assert!(!codes.contains(&"unattached"));
}

#[test]
fn second_run_sees_quarantine_from_first() {
    let dir = tempfile::tempdir().expect("tempdir");
    let manifest = write_three_item_fixture(dir.path());

    let args = gate_args(dir.path(), &manifest);
    super::run(args.clone()).expect("first run");

    let quarantine = quarantine_ids(&dir.path().join("gate/quarantine.json"));
    assert_eq!(quarantine, vec!["CCCCCCCCCCc".to_string()]);

    let summary_path = dir.path().join("gate/readiness_summary.json");
    super::run(args).expect("second run");
    let summary = read_summary(&summary_path);
    let record = summary["records"]
        .as_array()
        .expect("records")
        .iter()
        .find(|record| record["video_id"] == "CCCCCCCCCCc")
        .expect("record")
        .clone();
    assert_eq!(record["reason_code"], "preexisting_quarantine");
}

fn quarantine_ids(path: &Path) -> Vec<String> {
    let file: Value =
        serde_json::from_str(&fs::read_to_string(path).expect("read quarantine")).expect("parse");
    file["quarantined_video_ids"]
        .as_array()
        .expect("ids")
        .iter()
        .map(|id| id.as_str().expect("string").to_string())
        .collect()
}

#[test]
fn rerun_does_not_grow_quarantine_reasons() {
    let dir = tempfile::tempdir().expect("tempdir");
    let manifest = write_three_item_fixture(dir.path());
    let args = gate_args(dir.path(), &manifest);

    super::run(args.clone()).expect("first run");
    let first = fs::read_to_string(dir.path().join("gate/quarantine.json")).expect("read");
    super::run(args).expect("second run");
    let second = fs::read_to_string(dir.path().join("gate/quarantine.json")).expect("read");

    let first: Value = serde_json::from_str(&first).expect("parse");
    let second: Value = serde_json::from_str(&second).expect("parse");
    assert_eq!(first["quarantined_video_ids"], second["quarantined_video_ids"]);
    assert_eq!(first["videos"], second["videos"]);
}
