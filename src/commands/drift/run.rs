use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::cli::DriftArgs;
use crate::index::find_stage_artifact;
use crate::model::{BatchScorecard, ReadinessSummaryView};
use crate::scope::{Scope, parse_manifest};
use crate::stagedoc::load_stage_doc;
use crate::stages::{self, STAGES};
use crate::util::{now_utc_string, read_json, write_json_pretty};

use super::stats::{CategoryDrift, ScalarDrift, categorical_drift, scalar_drift};

pub const SCORECARD_SUFFIX: &str = ".scorecard.json";

/// Fewest prior scorecards for a drift comparison; below this the report
/// carries `no_prior_batches` and can never flag drift.
const MIN_PRIOR_BATCHES: usize = 2;

const SEMANTIC_STAGE: &str = "stage07_semantic";

#[derive(Debug, Serialize)]
pub struct DriftReport {
    pub batch_id: String,
    pub generated_at: String,
    /// `ok`, `drift`, or `no_prior_batches`.
    pub status: String,
    pub prior_batches: Vec<String>,
    pub category_drift: Vec<CategoryDrift>,
    pub scalar_drift: Vec<ScalarDrift>,
    pub scorecard: BatchScorecard,
}

impl DriftReport {
    pub fn drifted(&self) -> bool {
        self.category_drift.iter().any(|entry| entry.drifted)
            || self.scalar_drift.iter().any(|entry| entry.drifted)
    }
}

/// Aggregate the current batch into a scorecard: per-stage artifact
/// coverage, the readiness histogram from the gate summary, and content
/// statistics from the semantic-stage documents.
pub fn build_scorecard(
    batch_id: &str,
    pipeline_root: &Path,
    summary_path: &Path,
    scope: &Scope,
) -> Result<BatchScorecard> {
    let summary: ReadinessSummaryView = read_json(summary_path)
        .with_context(|| format!("failed to load readiness summary: {}", summary_path.display()))?;

    let mut scorecard = BatchScorecard {
        batch_id: batch_id.to_string(),
        generated_at: now_utc_string(),
        readiness: summary.totals,
        ..BatchScorecard::default()
    };

    for stage in STAGES {
        let covered = crate::index::scan_stage_artifacts(pipeline_root, stage, scope);
        scorecard
            .stage_coverage
            .insert(stage.key.to_string(), covered.len());
    }

    let semantic = stages::stage(SEMANTIC_STAGE).context("semantic stage missing from table")?;
    let mut technique_usage: BTreeMap<String, u64> = BTreeMap::new();
    let mut topic_usage: BTreeMap<String, u64> = BTreeMap::new();
    let mut segment_counts: Vec<f64> = Vec::new();

    for entry in &scope.entries {
        let Some(path) =
            find_stage_artifact(pipeline_root, semantic, &entry.video_id, Some(&entry.source))
        else {
            continue;
        };
        let doc = match load_stage_doc(&path) {
            Ok(doc) => doc,
            Err(error) => {
                debug!(
                    video_id = %entry.video_id,
                    path = %path.display(),
                    error = %format!("{error:#}"),
                    "skipping unreadable semantic document"
                );
                continue;
            }
        };
        segment_counts.push(doc.segments.len() as f64);
        for segment in &doc.segments {
            for technique in &segment.techniques {
                *technique_usage.entry(technique.clone()).or_default() += 1;
            }
            for topic in &segment.topics {
                *topic_usage.entry(topic.clone()).or_default() += 1;
            }
        }
    }

    scorecard
        .category_tables
        .insert("technique_usage".to_string(), technique_usage);
    scorecard
        .category_tables
        .insert("topic_usage".to_string(), topic_usage);

    if !segment_counts.is_empty() {
        let mean = segment_counts.iter().sum::<f64>() / segment_counts.len() as f64;
        scorecard
            .scalar_summaries
            .insert("mean_segments_per_video".to_string(), mean);
    }
    if !summary.records.is_empty() {
        let confidences: Vec<f64> = summary
            .records
            .iter()
            .map(|record| record.confidence)
            .collect();
        scorecard.scalar_summaries.insert(
            "mean_confidence".to_string(),
            crate::confidence::weighted_mean(&confidences, None),
        );
    }
    if summary.totals.total() > 0 {
        scorecard.scalar_summaries.insert(
            "ready_fraction".to_string(),
            summary.totals.ready as f64 / summary.totals.total() as f64,
        );
    }

    Ok(scorecard)
}

/// Most recent prior scorecards from the scorecard directory, newest first,
/// excluding the current batch and capped at `max_prior_batches`.
pub fn load_prior_scorecards(
    scorecard_dir: &Path,
    current_batch_id: &str,
    max_prior_batches: usize,
) -> Result<Vec<BatchScorecard>> {
    let Ok(entries) = fs::read_dir(scorecard_dir) else {
        debug!(dir = %scorecard_dir.display(), "scorecard directory not readable, no priors");
        return Ok(Vec::new());
    };

    let mut priors: Vec<BatchScorecard> = Vec::new();
    for entry in entries.filter_map(|entry| entry.ok()) {
        let path = entry.path();
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("");
        if !name.ends_with(SCORECARD_SUFFIX) {
            continue;
        }
        let scorecard: BatchScorecard = read_json(&path)
            .with_context(|| format!("failed to load scorecard: {}", path.display()))?;
        if scorecard.batch_id == current_batch_id {
            continue;
        }
        priors.push(scorecard);
    }

    priors.sort_by(|left, right| {
        right
            .generated_at
            .cmp(&left.generated_at)
            .then_with(|| right.batch_id.cmp(&left.batch_id))
    });
    priors.truncate(max_prior_batches);
    Ok(priors)
}

pub fn compare(current: &BatchScorecard, priors: &[BatchScorecard]) -> (Vec<CategoryDrift>, Vec<ScalarDrift>) {
    let mut category_drift = Vec::new();
    for (table, observed) in &current.category_tables {
        let prior_tables: Vec<&BTreeMap<String, u64>> = priors
            .iter()
            .filter_map(|prior| prior.category_tables.get(table))
            .collect();
        if let Some(result) = categorical_drift(table, observed, &prior_tables) {
            category_drift.push(result);
        }
    }

    let mut scalar_results = Vec::new();
    for (name, observed) in &current.scalar_summaries {
        let prior_values: Vec<f64> = priors
            .iter()
            .filter_map(|prior| prior.scalar_summaries.get(name).copied())
            .collect();
        if let Some(result) = scalar_drift(name, *observed, &prior_values) {
            scalar_results.push(result);
        }
    }

    (category_drift, scalar_results)
}

pub fn run(args: DriftArgs) -> Result<i32> {
    let mut scope = parse_manifest(&args.manifest)
        .with_context(|| format!("failed to load manifest: {}", args.manifest.display()))?;
    if let Some(source) = &args.source {
        scope = scope.filter_source(source);
    }

    let scorecard = build_scorecard(
        &args.batch_id,
        &args.pipeline_root,
        &args.summary_path,
        &scope,
    )?;

    let priors =
        load_prior_scorecards(&args.scorecard_dir, &args.batch_id, args.max_prior_batches)?;

    let (category_drift, scalar_drift) = if priors.len() >= MIN_PRIOR_BATCHES {
        compare(&scorecard, &priors)
    } else {
        (Vec::new(), Vec::new())
    };

    let scorecard_path = args
        .scorecard_dir
        .join(format!("{}{SCORECARD_SUFFIX}", args.batch_id));
    write_json_pretty(&scorecard_path, &scorecard)?;
    info!(path = %scorecard_path.display(), "batch scorecard written");

    let mut report = DriftReport {
        batch_id: args.batch_id.clone(),
        generated_at: scorecard.generated_at.clone(),
        status: String::new(),
        prior_batches: priors.iter().map(|prior| prior.batch_id.clone()).collect(),
        category_drift,
        scalar_drift,
        scorecard,
    };
    report.status = if priors.len() < MIN_PRIOR_BATCHES {
        "no_prior_batches".to_string()
    } else if report.drifted() {
        "drift".to_string()
    } else {
        "ok".to_string()
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "drift: batch {} status={} ({} prior batches)",
            report.batch_id,
            report.status,
            report.prior_batches.len()
        );
        for entry in &report.category_drift {
            println!(
                "  {}: statistic {:.2} vs threshold {:.2} over {} categories{}",
                entry.table,
                entry.statistic,
                entry.threshold,
                entry.categories,
                if entry.drifted { " DRIFT" } else { "" }
            );
        }
        for entry in &report.scalar_drift {
            println!(
                "  {}: {:.3} vs prior mean {:.3} (z {:.2}){}",
                entry.name,
                entry.observed,
                entry.prior_mean,
                entry.z,
                if entry.drifted { " DRIFT" } else { "" }
            );
        }
    }

    let failing = args.strict && report.status == "drift";
    Ok(if failing { 1 } else { 0 })
}
