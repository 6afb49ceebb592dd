use serde::Serialize;

use crate::index::{ReportIndex, ReportPayload};
use crate::report::validate_report_value;

mod run;
#[cfg(test)]
mod tests;

pub use self::run::run;

/// One structural contract violation tied to the file it came from.
#[derive(Debug, Clone, Serialize)]
pub struct StructuralFinding {
    pub path: String,
    pub stage: String,
    pub video_id: String,
    pub check: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileVerdict {
    pub path: String,
    pub stage: String,
    pub video_id: String,
    pub valid: bool,
    pub issue_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StructuralSummary {
    pub scanned: usize,
    pub valid: usize,
    pub invalid: usize,
    pub findings: usize,
}

/// Output artifact of the `check-reports` subcommand.
#[derive(Debug, Serialize)]
pub struct StructuralReport {
    pub manifest_version: u32,
    pub generated_at: String,
    pub reports_root: String,
    pub status: String,
    pub summary: StructuralSummary,
    pub files: Vec<FileVerdict>,
    pub findings: Vec<StructuralFinding>,
    pub malformed_manifest_lines: Vec<String>,
}

/// Validate every indexed report against the structural contract. Checks
/// within one file never short-circuit, and one invalid file never hides
/// another.
pub fn evaluate_index(index: &ReportIndex) -> (Vec<FileVerdict>, Vec<StructuralFinding>) {
    let mut verdicts = Vec::new();
    let mut findings = Vec::new();

    for report in index.reports.values() {
        let path = report.path.display().to_string();
        let issues = match &report.payload {
            ReportPayload::Parsed(value) => validate_report_value(value),
            ReportPayload::Unreadable(message) => vec![crate::report::ContractIssue {
                check: "unreadable_stage_report".to_string(),
                message: message.clone(),
            }],
        };

        verdicts.push(FileVerdict {
            path: path.clone(),
            stage: report.stage.to_string(),
            video_id: report.video_id.clone(),
            valid: issues.is_empty(),
            issue_count: issues.len(),
        });

        findings.extend(issues.into_iter().map(|issue| StructuralFinding {
            path: path.clone(),
            stage: report.stage.to_string(),
            video_id: report.video_id.clone(),
            check: issue.check,
            message: issue.message,
        }));
    }

    (verdicts, findings)
}
