use std::collections::BTreeSet;
use std::path::Path;

use serde::Serialize;

use crate::index::scan_stage_artifacts;
use crate::quarantine::QuarantineSet;
use crate::scope::Scope;
use crate::stages::StageSpec;

mod run;

pub use self::run::run;

#[derive(Debug, Clone, Serialize)]
pub struct DependencyCoverage {
    pub stage: String,
    pub required_ids: usize,
    pub covered_ids: usize,
    pub missing_ids: Vec<String>,
}

/// Pre-flight gate output: run before invoking a stage, never after.
#[derive(Debug, Serialize)]
pub struct PreflightReport {
    pub manifest_version: u32,
    pub generated_at: String,
    pub target_stage: String,
    pub status: String,
    pub scope_ids: usize,
    pub quarantined_in_scope: usize,
    pub dependencies: Vec<DependencyCoverage>,
}

/// For every declared upstream dependency of `target`, report the
/// non-quarantined scope ids that dependency has produced no artifact for.
pub fn evaluate_dependencies(
    pipeline_root: &Path,
    deps: &[&'static StageSpec],
    scope: &Scope,
    quarantine: &QuarantineSet,
) -> Vec<DependencyCoverage> {
    let required: BTreeSet<String> = scope
        .video_ids()
        .into_iter()
        .filter(|video_id| !quarantine.contains(video_id))
        .collect();

    deps.iter()
        .map(|dep| {
            let covered = scan_stage_artifacts(pipeline_root, dep, scope);
            let missing: Vec<String> = required
                .iter()
                .filter(|video_id| !covered.contains(*video_id))
                .cloned()
                .collect();
            DependencyCoverage {
                stage: dep.key.to_string(),
                required_ids: required.len(),
                covered_ids: required.len() - missing.len(),
                missing_ids: missing,
            }
        })
        .collect()
}
