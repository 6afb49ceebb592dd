use anyhow::{Context, Result, bail};
use tracing::info;

use crate::cli::CrossStageArgs;
use crate::index::find_stage_artifact;
use crate::scope::parse_manifest;
use crate::stagedoc::load_stage_doc;
use crate::stages;
use crate::util::{now_utc_string, write_json_pretty};

use super::{CrossStageReport, CrossStageResult, ResultSeverity, VideoComparison, compare_docs};

pub fn run(args: CrossStageArgs) -> Result<i32> {
    let upstream_stage = stages::stage(&args.upstream_stage)
        .with_context(|| format!("unknown upstream stage: {}", args.upstream_stage))?;
    let downstream_stage = stages::stage(&args.downstream_stage)
        .with_context(|| format!("unknown downstream stage: {}", args.downstream_stage))?;

    let mut scope = parse_manifest(&args.manifest)
        .with_context(|| format!("failed to load manifest: {}", args.manifest.display()))?;
    if let Some(source) = &args.source {
        scope = scope.filter_source(source);
    }
    if let Some(video_id) = &args.video_id {
        scope.entries.retain(|entry| entry.video_id == *video_id);
        if scope.is_empty() {
            bail!("video id {video_id} is not in the manifest scope");
        }
    }

    let mut videos = Vec::new();
    for entry in &scope.entries {
        let source = Some(entry.source.as_str());
        let upstream_path =
            find_stage_artifact(&args.pipeline_root, upstream_stage, &entry.video_id, source);
        let downstream_path =
            find_stage_artifact(&args.pipeline_root, downstream_stage, &entry.video_id, source);

        let mut results = Vec::new();
        let docs = match (&upstream_path, &downstream_path) {
            (Some(up), Some(down)) => {
                let upstream_doc = load_stage_doc(up);
                let downstream_doc = load_stage_doc(down);
                match (upstream_doc, downstream_doc) {
                    (Ok(upstream_doc), Ok(downstream_doc)) => Some((upstream_doc, downstream_doc)),
                    (Err(error), _) | (_, Err(error)) => {
                        results.push(CrossStageResult::error(
                            "unreadable_stage_artifact",
                            format!("{error:#}"),
                        ));
                        None
                    }
                }
            }
            _ => {
                if upstream_path.is_none() {
                    results.push(CrossStageResult::error(
                        "missing_stage_artifact",
                        format!("{} has no artifact for this id", upstream_stage.key),
                    ));
                }
                if downstream_path.is_none() {
                    results.push(CrossStageResult::error(
                        "missing_stage_artifact",
                        format!("{} has no artifact for this id", downstream_stage.key),
                    ));
                }
                None
            }
        };

        if let Some((upstream_doc, downstream_doc)) = docs {
            results.extend(compare_docs(&upstream_doc, &downstream_doc));
        }

        let error_count = results
            .iter()
            .filter(|result| result.severity == ResultSeverity::Error)
            .count();
        let warning_count = results
            .iter()
            .filter(|result| result.severity == ResultSeverity::Warning)
            .count();

        videos.push(VideoComparison {
            video_id: entry.video_id.clone(),
            upstream_path: upstream_path.map(|path| path.display().to_string()),
            downstream_path: downstream_path.map(|path| path.display().to_string()),
            error_count,
            warning_count,
            results,
        });
    }

    let total_errors: usize = videos.iter().map(|video| video.error_count).sum();
    let total_warnings: usize = videos.iter().map(|video| video.warning_count).sum();

    let report = CrossStageReport {
        manifest_version: 1,
        generated_at: now_utc_string(),
        upstream_stage: upstream_stage.key.to_string(),
        downstream_stage: downstream_stage.key.to_string(),
        status: if total_errors > 0 { "failed" } else { "passed" }.to_string(),
        videos,
    };

    if let Some(path) = &args.emit_report {
        write_json_pretty(path, &report)?;
        info!(path = %path.display(), "cross-stage report written");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "cross-stage {} -> {}: {} items, {} errors, {} warnings ({})",
            report.upstream_stage,
            report.downstream_stage,
            report.videos.len(),
            total_errors,
            total_warnings,
            report.status
        );
        for video in &report.videos {
            for result in &video.results {
                println!(
                    "  {} [{}] {}: {}",
                    video.video_id,
                    result.severity.as_str(),
                    result.check,
                    result.message
                );
            }
        }
    }

    let failing = total_errors > 0 || (args.strict && total_warnings > 0);
    Ok(if failing { 1 } else { 0 })
}
