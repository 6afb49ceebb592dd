use anyhow::{Context, Result};
use tracing::info;

use crate::cli::PreflightArgs;
use crate::quarantine;
use crate::scope::parse_manifest;
use crate::stages;
use crate::util::{now_utc_string, write_json_pretty};

use super::{PreflightReport, evaluate_dependencies};

pub fn run(args: PreflightArgs) -> Result<i32> {
    let target = stages::stage(&args.target_stage)
        .with_context(|| format!("unknown target stage: {}", args.target_stage))?;
    let deps: Vec<&'static stages::StageSpec> = target
        .depends_on
        .iter()
        .filter_map(|key| stages::stage(key))
        .collect();

    let mut scope = parse_manifest(&args.manifest)
        .with_context(|| format!("failed to load manifest: {}", args.manifest.display()))?;
    if let Some(source) = &args.source {
        scope = scope.filter_source(source);
    }

    let quarantine = quarantine::load(&args.quarantine_file)?;
    let quarantined_in_scope = scope
        .video_ids()
        .iter()
        .filter(|video_id| quarantine.contains(video_id))
        .count();

    let dependencies = evaluate_dependencies(&args.pipeline_root, &deps, &scope, &quarantine);
    let failed = dependencies
        .iter()
        .any(|coverage| !coverage.missing_ids.is_empty());

    let report = PreflightReport {
        manifest_version: 1,
        generated_at: now_utc_string(),
        target_stage: target.key.to_string(),
        status: if failed { "fail" } else { "pass" }.to_string(),
        scope_ids: scope.len(),
        quarantined_in_scope,
        dependencies,
    };

    if let Some(path) = &args.emit_report {
        write_json_pretty(path, &report)?;
        info!(path = %path.display(), "preflight report written");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "preflight {}: {} ({} scope ids, {} quarantined)",
            report.target_stage, report.status, report.scope_ids, report.quarantined_in_scope
        );
        for coverage in &report.dependencies {
            println!(
                "  {}: {}/{} covered, missing: {:?}",
                coverage.stage, coverage.covered_ids, coverage.required_ids, coverage.missing_ids
            );
        }
    }

    Ok(if failed { 1 } else { 0 })
}
