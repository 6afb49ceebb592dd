use anyhow::{Context, Result};
use tracing::info;

use crate::cli::CheckReportsArgs;
use crate::index::scan_reports;
use crate::scope::parse_manifest;
use crate::util::{now_utc_string, write_json_pretty};

use super::{StructuralReport, StructuralSummary, evaluate_index};

pub fn run(args: CheckReportsArgs) -> Result<i32> {
    let mut scope = parse_manifest(&args.manifest)
        .with_context(|| format!("failed to load manifest: {}", args.manifest.display()))?;
    if let Some(source) = &args.source {
        scope = scope.filter_source(source);
    }

    let index = scan_reports(&args.reports_root, &scope);
    let (files, findings) = evaluate_index(&index);

    let invalid = files.iter().filter(|verdict| !verdict.valid).count();
    let summary = StructuralSummary {
        scanned: files.len(),
        valid: files.len() - invalid,
        invalid,
        findings: findings.len(),
    };
    let has_warnings = !scope.malformed_lines.is_empty();

    let report = StructuralReport {
        manifest_version: 1,
        generated_at: now_utc_string(),
        reports_root: args.reports_root.display().to_string(),
        status: if invalid > 0 { "failed" } else { "passed" }.to_string(),
        summary,
        files,
        findings,
        malformed_manifest_lines: scope.malformed_lines.clone(),
    };

    if let Some(path) = &args.emit_report {
        write_json_pretty(path, &report)?;
        info!(path = %path.display(), "structural report written");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "check-reports: {} scanned, {} invalid, {} findings ({})",
            report.summary.scanned, report.summary.invalid, report.summary.findings, report.status
        );
        for finding in &report.findings {
            println!(
                "  [{}] {} {}: {} - {}",
                finding.stage, finding.video_id, finding.check, finding.path, finding.message
            );
        }
        for line in &report.malformed_manifest_lines {
            println!("  manifest: {line}");
        }
    }

    let failing = invalid > 0 || (args.strict && has_warnings);
    Ok(if failing { 1 } else { 0 })
}
