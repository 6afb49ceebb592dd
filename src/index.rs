use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::resolve::resolve_candidate;
use crate::scope::Scope;
use crate::stages::{STAGES, StageSpec};
use crate::util::read_json_value;

pub const REPORT_SUFFIX: &str = ".report.json";

/// Outcome of loading one resolved report file. An unreadable or unparseable
/// file is a contract violation for the owning id, never a process error.
#[derive(Debug)]
pub enum ReportPayload {
    Parsed(Value),
    Unreadable(String),
}

#[derive(Debug)]
pub struct IndexedReport {
    pub stage: &'static str,
    pub video_id: String,
    pub path: PathBuf,
    pub payload: ReportPayload,
}

/// Read-only index built up-front: (stage, video_id) -> resolved report.
/// Per-item work downstream shares this without further disk access.
#[derive(Debug, Default)]
pub struct ReportIndex {
    pub reports: BTreeMap<(String, String), IndexedReport>,
}

impl ReportIndex {
    pub fn get(&self, stage: &str, video_id: &str) -> Option<&IndexedReport> {
        self.reports
            .get(&(stage.to_string(), video_id.to_string()))
    }

}

fn list_files(dir: &Path) -> Vec<PathBuf> {
    // A missing or unreadable stage directory degrades to zero coverage for
    // that stage; the gate reports it as missing, not as a crash.
    let Ok(entries) = fs::read_dir(dir) else {
        debug!(dir = %dir.display(), "stage directory not readable, treating as empty");
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    files
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|name| name.to_str()).unwrap_or("")
}

/// Scan `<reports_root>/<stage_key>/` for `*.report.json` files naming a
/// scope id. Duplicate candidates resolve deterministically through the
/// ranked resolver.
pub fn scan_reports(reports_root: &Path, scope: &Scope) -> ReportIndex {
    let mut index = ReportIndex::default();
    let scope_ids = scope.video_ids();

    for stage in STAGES {
        let stage_dir = reports_root.join(stage.key);
        let files = list_files(&stage_dir);

        let mut candidates: BTreeMap<&String, Vec<PathBuf>> = BTreeMap::new();
        for path in &files {
            let name = file_name(path);
            if !name.ends_with(REPORT_SUFFIX) {
                continue;
            }
            for video_id in &scope_ids {
                if name.contains(video_id.as_str()) {
                    candidates.entry(video_id).or_default().push(path.clone());
                }
            }
        }

        for (video_id, paths) in candidates {
            let source = scope.entry_for(video_id).map(|entry| entry.source.as_str());
            let Some(resolved) = resolve_candidate(&paths, source) else {
                continue;
            };
            let payload = match read_json_value(resolved) {
                Ok(value) => ReportPayload::Parsed(value),
                Err(error) => ReportPayload::Unreadable(format!("{error:#}")),
            };
            index.reports.insert(
                (stage.key.to_string(), video_id.clone()),
                IndexedReport {
                    stage: stage.key,
                    video_id: video_id.clone(),
                    path: resolved.to_path_buf(),
                    payload,
                },
            );
        }
    }

    index
}

/// Ids (within scope) for which `stage` has produced any artifact matching
/// its declared suffixes under `<pipeline_root>/<stage_dir>/`.
pub fn scan_stage_artifacts(
    pipeline_root: &Path,
    stage: &StageSpec,
    scope: &Scope,
) -> BTreeSet<String> {
    let stage_dir = pipeline_root.join(stage.dir);
    let files = list_files(&stage_dir);
    let scope_ids = scope.video_ids();

    let mut covered = BTreeSet::new();
    for path in &files {
        let name = file_name(path);
        if !stage
            .artifact_suffixes
            .iter()
            .any(|suffix| name.ends_with(suffix))
        {
            continue;
        }
        for video_id in &scope_ids {
            if name.contains(video_id.as_str()) {
                covered.insert(video_id.clone());
            }
        }
    }
    covered
}

/// Resolve the artifact file for one `(stage, video_id)`, preferring the
/// scope source on duplicates.
pub fn find_stage_artifact(
    pipeline_root: &Path,
    stage: &StageSpec,
    video_id: &str,
    source: Option<&str>,
) -> Option<PathBuf> {
    let stage_dir = pipeline_root.join(stage.dir);
    let candidates: Vec<PathBuf> = list_files(&stage_dir)
        .into_iter()
        .filter(|path| {
            let name = file_name(path);
            name.contains(video_id)
                && stage
                    .artifact_suffixes
                    .iter()
                    .any(|suffix| name.ends_with(suffix))
        })
        .collect();
    resolve_candidate(&candidates, source).map(Path::to_path_buf)
}
