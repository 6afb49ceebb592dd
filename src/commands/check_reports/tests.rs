use std::fs;

use serde_json::json;

use crate::index::scan_reports;
use crate::scope::parse_manifest_text;

use super::evaluate_index;

fn valid_report(stage: &str, video_id: &str) -> serde_json::Value {
    json!({
        "stage": stage,
        "status": "PASS",
        "reason_code": "ok",
        "video_id": video_id,
        "source": "coach_x",
        "stem": format!("Title [{video_id}]"),
        "inputs": [],
        "outputs": [{"path": format!("{stage}/{video_id}.out.json")}],
        "checks": [],
        "metrics": {},
        "timestamps": {
            "started_at": "2026-01-01T00:00:00Z",
            "finished_at": "2026-01-01T00:01:00Z",
            "elapsed_sec": 60.0
        },
        "versions": {"pipeline_version": "1.0.0"}
    })
}

#[test]
fn valid_and_invalid_files_are_judged_independently() {
    let dir = tempfile::tempdir().expect("tempdir");
    let scope = parse_manifest_text("coach_x | A [abcdefghijk]\ncoach_x | B [AAAAAAAAAAA]\n");

    let stage_dir = dir.path().join("stage03_transcribe");
    fs::create_dir_all(&stage_dir).expect("mkdir");
    fs::write(
        stage_dir.join("abcdefghijk.report.json"),
        serde_json::to_string(&valid_report("stage03_transcribe", "abcdefghijk")).expect("json"),
    )
    .expect("write");

    let mut broken = valid_report("stage03_transcribe", "AAAAAAAAAAA");
    broken.as_object_mut().expect("object").remove("versions");
    broken
        .as_object_mut()
        .expect("object")
        .insert("surprise".to_string(), json!(1));
    fs::write(
        stage_dir.join("AAAAAAAAAAA.report.json"),
        serde_json::to_string(&broken).expect("json"),
    )
    .expect("write");

    let index = scan_reports(dir.path(), &scope);
    let (files, findings) = evaluate_index(&index);

    assert_eq!(files.len(), 2);
    let valid = files.iter().find(|f| f.video_id == "abcdefghijk").expect("verdict");
    assert!(valid.valid);
    let invalid = files.iter().find(|f| f.video_id == "AAAAAAAAAAA").expect("verdict");
    assert!(!invalid.valid);
    assert_eq!(invalid.issue_count, 2);

    let checks: Vec<&str> = findings.iter().map(|f| f.check.as_str()).collect();
    assert!(checks.contains(&"missing_required_key"));
    assert!(checks.contains(&"unknown_top_level_key"));
}

#[test]
fn unreadable_file_is_a_single_contract_finding() {
    let dir = tempfile::tempdir().expect("tempdir");
    let scope = parse_manifest_text("coach_x | A [abcdefghijk]\n");

    let stage_dir = dir.path().join("stage06_segment");
    fs::create_dir_all(&stage_dir).expect("mkdir");
    fs::write(stage_dir.join("abcdefghijk.report.json"), "{ nope").expect("write");

    let index = scan_reports(dir.path(), &scope);
    let (files, findings) = evaluate_index(&index);

    assert_eq!(files.len(), 1);
    assert!(!files[0].valid);
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].check, "unreadable_stage_report");
}
