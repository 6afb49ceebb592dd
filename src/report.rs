use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Top-level keys every stage report must carry, exactly.
pub const REQUIRED_KEYS: &[&str] = &[
    "stage",
    "status",
    "reason_code",
    "video_id",
    "source",
    "stem",
    "inputs",
    "outputs",
    "checks",
    "metrics",
    "timestamps",
    "versions",
];

/// Keys a report may carry in addition to the required set. Anything else is
/// a contract violation.
pub const OPTIONAL_KEYS: &[&str] = &["batch_id", "notes"];

pub const REPORT_STATUSES: &[&str] = &["PASS", "WARN", "FAIL"];
pub const CHECK_SEVERITIES: &[&str] = &["error", "warning", "info"];

pub const SIGNAL_CLASSES: &[&str] = &[
    "artifact_contract",
    "taxonomy_coverage",
    "transcript_quality",
    "speaker_attribution",
    "segmentation_integrity",
    "semantic_tagging",
    "content_quality",
];

pub const REMEDIATION_PATHS: &[&str] = &[
    "rerun_stage",
    "fix_upstream",
    "manual_review",
    "waive",
    "quarantine",
];

/// Check as emitted by a stage. Immutable once written; the gate layer only
/// ever projects it into a canonical signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportCheck {
    pub severity: String,
    pub check: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportTimestamps {
    pub started_at: String,
    pub finished_at: String,
    pub elapsed_sec: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportVersions {
    pub pipeline_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
}

/// One record per (stage, video_id). Parsed leniently after the structural
/// contract has been checked on the raw value; a report that fails the
/// contract never reaches this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: String,
    pub status: String,
    pub reason_code: String,
    pub video_id: String,
    pub source: String,
    pub stem: String,
    pub inputs: Vec<ArtifactDescriptor>,
    pub outputs: Vec<ArtifactDescriptor>,
    pub checks: Vec<ReportCheck>,
    #[serde(default)]
    pub metrics: BTreeMap<String, Value>,
    pub timestamps: ReportTimestamps,
    pub versions: ReportVersions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// One structural contract violation. Always error severity; a report with
/// any of these is invalid and must not feed PASS/WARN/FAIL aggregation.
#[derive(Debug, Clone, Serialize)]
pub struct ContractIssue {
    pub check: String,
    pub message: String,
}

fn issue(check: &str, message: String) -> ContractIssue {
    ContractIssue {
        check: check.to_string(),
        message,
    }
}

fn non_empty_string(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
}

fn check_artifact_list(field: &str, value: Option<&Value>, issues: &mut Vec<ContractIssue>) {
    let Some(list) = value else {
        return; // missing key already reported by the key-set check
    };
    let Some(entries) = list.as_array() else {
        issues.push(issue(
            "malformed_artifact_list",
            format!("'{field}' must be an array of artifact descriptors"),
        ));
        return;
    };
    for (index, entry) in entries.iter().enumerate() {
        let Some(object) = entry.as_object() else {
            issues.push(issue(
                "malformed_artifact_descriptor",
                format!("{field}[{index}] is not an object"),
            ));
            continue;
        };
        if non_empty_string(object.get("path")).is_none() {
            issues.push(issue(
                "malformed_artifact_descriptor",
                format!("{field}[{index}] is missing a non-empty 'path'"),
            ));
        }
        if let Some(hash) = object.get("sha256") {
            if !hash.is_null() && hash.as_str().is_none() {
                issues.push(issue(
                    "malformed_artifact_descriptor",
                    format!("{field}[{index}].sha256 must be a string"),
                ));
            }
        }
        if let Some(bytes) = object.get("bytes") {
            if !bytes.is_null() && bytes.as_u64().is_none() {
                issues.push(issue(
                    "malformed_artifact_descriptor",
                    format!("{field}[{index}].bytes must be a non-negative integer"),
                ));
            }
        }
    }
}

fn check_checks_list(value: Option<&Value>, issues: &mut Vec<ContractIssue>) {
    let Some(list) = value else {
        return;
    };
    let Some(entries) = list.as_array() else {
        issues.push(issue(
            "malformed_checks_list",
            "'checks' must be an array".to_string(),
        ));
        return;
    };
    for (index, entry) in entries.iter().enumerate() {
        let Some(object) = entry.as_object() else {
            issues.push(issue(
                "malformed_check_entry",
                format!("checks[{index}] is not an object"),
            ));
            continue;
        };
        match non_empty_string(object.get("severity")) {
            Some(severity) if CHECK_SEVERITIES.contains(&severity) => {}
            Some(severity) => issues.push(issue(
                "invalid_check_severity",
                format!("checks[{index}].severity '{severity}' is not one of error|warning|info"),
            )),
            None => issues.push(issue(
                "invalid_check_severity",
                format!("checks[{index}] is missing 'severity'"),
            )),
        }
        if non_empty_string(object.get("check")).is_none() {
            issues.push(issue(
                "invalid_check_entry",
                format!("checks[{index}] is missing a non-empty 'check'"),
            ));
        }
        if non_empty_string(object.get("message")).is_none() {
            issues.push(issue(
                "invalid_check_entry",
                format!("checks[{index}] is missing a non-empty 'message'"),
            ));
        }
        if let Some(class) = non_empty_string(object.get("signal_class")) {
            if !SIGNAL_CLASSES.contains(&class) {
                issues.push(issue(
                    "invalid_signal_class",
                    format!("checks[{index}].signal_class '{class}' is not in the taxonomy"),
                ));
            }
        }
        if let Some(path) = non_empty_string(object.get("remediation_path")) {
            if !REMEDIATION_PATHS.contains(&path) {
                issues.push(issue(
                    "invalid_remediation_path",
                    format!("checks[{index}].remediation_path '{path}' is not recognized"),
                ));
            }
        }
    }
}

fn check_timestamps(value: Option<&Value>, issues: &mut Vec<ContractIssue>) {
    let Some(timestamps) = value else {
        return;
    };
    let Some(object) = timestamps.as_object() else {
        issues.push(issue(
            "malformed_timestamps",
            "'timestamps' must be an object".to_string(),
        ));
        return;
    };
    for key in ["started_at", "finished_at"] {
        if non_empty_string(object.get(key)).is_none() {
            issues.push(issue(
                "malformed_timestamps",
                format!("timestamps.{key} must be a non-empty ISO-8601 string"),
            ));
        }
    }
    match object.get("elapsed_sec").and_then(Value::as_f64) {
        Some(elapsed) if elapsed >= 0.0 => {}
        Some(elapsed) => issues.push(issue(
            "malformed_timestamps",
            format!("timestamps.elapsed_sec must be >= 0, got {elapsed}"),
        )),
        None => issues.push(issue(
            "malformed_timestamps",
            "timestamps.elapsed_sec must be a non-negative number".to_string(),
        )),
    }
}

fn check_versions(value: Option<&Value>, issues: &mut Vec<ContractIssue>) {
    let Some(versions) = value else {
        return;
    };
    let Some(object) = versions.as_object() else {
        issues.push(issue(
            "malformed_versions",
            "'versions' must be an object".to_string(),
        ));
        return;
    };
    if non_empty_string(object.get("pipeline_version")).is_none() {
        issues.push(issue(
            "malformed_versions",
            "versions.pipeline_version must be a non-empty string".to_string(),
        ));
    }
    for key in ["prompt_version", "model_id", "schema_version"] {
        if let Some(field) = object.get(key) {
            if !field.is_null() && field.as_str().is_none() {
                issues.push(issue(
                    "malformed_versions",
                    format!("versions.{key} must be a string when present"),
                ));
            }
        }
    }
}

/// Run every structural contract check against a raw report value. Checks
/// never short-circuit: a report missing three keys reports three issues.
pub fn validate_report_value(payload: &Value) -> Vec<ContractIssue> {
    let mut issues = Vec::new();

    let Some(object) = payload.as_object() else {
        issues.push(issue(
            "malformed_stage_report",
            "report is not a JSON object".to_string(),
        ));
        return issues;
    };

    for key in REQUIRED_KEYS {
        if !object.contains_key(*key) {
            issues.push(issue(
                "missing_required_key",
                format!("required top-level key '{key}' is missing"),
            ));
        }
    }
    for key in object.keys() {
        if !REQUIRED_KEYS.contains(&key.as_str()) && !OPTIONAL_KEYS.contains(&key.as_str()) {
            issues.push(issue(
                "unknown_top_level_key",
                format!("top-level key '{key}' is not part of the report contract"),
            ));
        }
    }

    for key in ["stage", "reason_code", "source"] {
        if object.contains_key(key) && non_empty_string(object.get(key)).is_none() {
            issues.push(issue(
                "malformed_field",
                format!("'{key}' must be a non-empty string"),
            ));
        }
    }

    match non_empty_string(object.get("status")) {
        None if object.contains_key("status") => issues.push(issue(
            "invalid_report_status",
            "'status' must be a non-empty string".to_string(),
        )),
        Some(status) if !REPORT_STATUSES.contains(&status) => issues.push(issue(
            "invalid_report_status",
            format!("'status' must be one of PASS|WARN|FAIL, got '{status}'"),
        )),
        _ => {}
    }

    if let Some(video_id) = object.get("video_id") {
        match video_id.as_str() {
            Some(raw) if crate::scope::is_video_id(raw) => {}
            Some(raw) => issues.push(issue(
                "invalid_video_id",
                format!("'video_id' does not match the 11-character id pattern: '{raw}'"),
            )),
            None => issues.push(issue(
                "invalid_video_id",
                "'video_id' must be a string".to_string(),
            )),
        }
    }

    if let Some(metrics) = object.get("metrics") {
        if !metrics.is_object() {
            issues.push(issue(
                "malformed_metrics",
                "'metrics' must be an object".to_string(),
            ));
        }
    }

    check_artifact_list("inputs", object.get("inputs"), &mut issues);
    check_artifact_list("outputs", object.get("outputs"), &mut issues);
    check_checks_list(object.get("checks"), &mut issues);
    check_timestamps(object.get("timestamps"), &mut issues);
    check_versions(object.get("versions"), &mut issues);

    issues
}

/// Lenient parse into the typed report. Only meaningful for values that
/// already passed `validate_report_value` with zero issues.
pub fn parse_report(payload: &Value) -> Option<StageReport> {
    serde_json::from_value(payload.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_report() -> Value {
        json!({
            "stage": "stage03_transcribe",
            "status": "PASS",
            "reason_code": "ok",
            "video_id": "abcdefghijk",
            "source": "coach_x",
            "stem": "Some Title [abcdefghijk]",
            "inputs": [{"path": "02_audio/abcdefghijk.wav", "bytes": 1024}],
            "outputs": [{"path": "03_transcribe/abcdefghijk.transcript.json"}],
            "checks": [],
            "metrics": {"word_count": 1532},
            "timestamps": {
                "started_at": "2026-01-01T00:00:00Z",
                "finished_at": "2026-01-01T00:01:30Z",
                "elapsed_sec": 90.0
            },
            "versions": {"pipeline_version": "1.4.0", "model_id": "whisper-large-v3"}
        })
    }

    #[test]
    fn valid_report_has_no_issues_and_parses() {
        let payload = valid_report();
        assert!(validate_report_value(&payload).is_empty());
        let report = parse_report(&payload).expect("parse");
        assert_eq!(report.stage, "stage03_transcribe");
        assert_eq!(report.metrics["word_count"], json!(1532));
    }

    #[test]
    fn missing_required_key_always_reports() {
        let mut payload = valid_report();
        payload.as_object_mut().expect("object").remove("timestamps");
        payload.as_object_mut().expect("object").remove("versions");
        let issues = validate_report_value(&payload);
        let missing = issues
            .iter()
            .filter(|entry| entry.check == "missing_required_key")
            .count();
        assert_eq!(missing, 2);
    }

    #[test]
    fn unknown_top_level_key_is_a_violation() {
        let mut payload = valid_report();
        payload
            .as_object_mut()
            .expect("object")
            .insert("extra_field".to_string(), json!(true));
        let issues = validate_report_value(&payload);
        assert!(issues.iter().any(|entry| entry.check == "unknown_top_level_key"));
    }

    #[test]
    fn optional_keys_are_allowed() {
        let mut payload = valid_report();
        let object = payload.as_object_mut().expect("object");
        object.insert("batch_id".to_string(), json!("2026-01-batch"));
        object.insert("notes".to_string(), json!("reprocessed"));
        assert!(validate_report_value(&payload).is_empty());
    }

    #[test]
    fn bad_status_and_video_id_are_independent_issues() {
        let mut payload = valid_report();
        let object = payload.as_object_mut().expect("object");
        object.insert("status".to_string(), json!("MAYBE"));
        object.insert("video_id".to_string(), json!("short"));
        let issues = validate_report_value(&payload);
        assert!(issues.iter().any(|entry| entry.check == "invalid_report_status"));
        assert!(issues.iter().any(|entry| entry.check == "invalid_video_id"));
    }

    #[test]
    fn check_entries_are_validated_field_by_field() {
        let mut payload = valid_report();
        payload.as_object_mut().expect("object").insert(
            "checks".to_string(),
            json!([
                {"severity": "fatal", "check": "x", "message": "m"},
                {"severity": "warning", "check": "", "message": "m"},
                {"severity": "warning", "check": "ok_check", "message": "m",
                 "signal_class": "not_in_taxonomy"},
                {"severity": "warning", "check": "ok_check", "message": "m",
                 "remediation_path": "reboot"}
            ]),
        );
        let issues = validate_report_value(&payload);
        assert!(issues.iter().any(|entry| entry.check == "invalid_check_severity"));
        assert!(issues.iter().any(|entry| entry.check == "invalid_check_entry"));
        assert!(issues.iter().any(|entry| entry.check == "invalid_signal_class"));
        assert!(issues.iter().any(|entry| entry.check == "invalid_remediation_path"));
    }

    #[test]
    fn negative_elapsed_and_empty_pipeline_version_are_violations() {
        let mut payload = valid_report();
        let object = payload.as_object_mut().expect("object");
        object.insert(
            "timestamps".to_string(),
            json!({"started_at": "2026-01-01T00:00:00Z", "finished_at": "2026-01-01T00:01:00Z",
                   "elapsed_sec": -1.0}),
        );
        object.insert("versions".to_string(), json!({"pipeline_version": ""}));
        let issues = validate_report_value(&payload);
        assert!(issues.iter().any(|entry| entry.check == "malformed_timestamps"));
        assert!(issues.iter().any(|entry| entry.check == "malformed_versions"));
    }

    #[test]
    fn malformed_artifact_descriptors_are_reported_per_entry() {
        let mut payload = valid_report();
        payload.as_object_mut().expect("object").insert(
            "inputs".to_string(),
            json!([{"path": ""}, "not-an-object", {"path": "ok", "bytes": -5}]),
        );
        let issues = validate_report_value(&payload);
        let descriptor_issues = issues
            .iter()
            .filter(|entry| entry.check == "malformed_artifact_descriptor")
            .count();
        assert_eq!(descriptor_issues, 3);
    }

    #[test]
    fn non_object_report_is_one_terminal_issue() {
        let issues = validate_report_value(&json!(["not", "a", "report"]));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].check, "malformed_stage_report");
    }
}
