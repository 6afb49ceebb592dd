use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::util::read_json_value;

/// Whether missing media-stage coverage blocks an item or only warns. The
/// upstream pipelines never agreed on one answer, so it stays a policy knob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingMediaSeverity {
    Error,
    Warning,
}

impl MissingMediaSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
        }
    }
}

/// Default per-class review budget applied when no content-type override is
/// configured. One stray warning in a class should not force human review.
pub const DEFAULT_REVIEW_CLASS_BUDGET: usize = 3;

/// Immutable escalation policy for one gate invocation. Constructed once
/// from CLI flags, threaded through every decision function, and serialized
/// into the readiness summary so the output is auditable on its own.
#[derive(Debug, Clone, Serialize)]
pub struct GatePolicy {
    /// Check names whose warnings block outright.
    pub block_warning_checks: BTreeSet<String>,
    /// Signal classes whose warnings block outright.
    pub block_warning_classes: BTreeSet<String>,
    /// Signal classes that block only for a given content type
    /// (`content_type -> classes`).
    pub block_warning_classes_by_content_type: BTreeMap<String, BTreeSet<String>>,
    /// Global total-warning budget across all checks for one item.
    pub max_warning_checks: Option<usize>,
    /// Per-check warning budgets (`check -> max`).
    pub max_warnings_by_check: BTreeMap<String, usize>,
    /// Per-class warning budgets (`class -> max`).
    pub max_warnings_by_class: BTreeMap<String, usize>,
    /// Review budgets per class, per content type; falls back to
    /// `review_class_budget_default` for unconfigured pairs.
    pub review_class_budget_by_content_type: BTreeMap<String, BTreeMap<String, usize>>,
    pub review_class_budget_default: usize,
    pub missing_media_severity: MissingMediaSeverity,
    pub strict: bool,
}

impl Default for GatePolicy {
    fn default() -> Self {
        GatePolicy {
            block_warning_checks: BTreeSet::new(),
            block_warning_classes: BTreeSet::new(),
            block_warning_classes_by_content_type: BTreeMap::new(),
            max_warning_checks: None,
            max_warnings_by_check: BTreeMap::new(),
            max_warnings_by_class: BTreeMap::new(),
            review_class_budget_by_content_type: BTreeMap::new(),
            review_class_budget_default: DEFAULT_REVIEW_CLASS_BUDGET,
            missing_media_severity: MissingMediaSeverity::Error,
            strict: false,
        }
    }
}

impl GatePolicy {
    pub fn review_budget(&self, content_type: Option<&str>, class: &str) -> usize {
        content_type
            .and_then(|content_type| self.review_class_budget_by_content_type.get(content_type))
            .and_then(|budgets| budgets.get(class).copied())
            .unwrap_or(self.review_class_budget_default)
    }
}

/// Parse `key=value` where value is a non-negative count.
pub fn parse_budget_entry(raw: &str) -> Result<(String, usize)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("expected key=value budget entry, got: {raw}");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("empty key in budget entry: {raw}");
    }
    let value = value
        .trim()
        .parse::<usize>()
        .with_context(|| format!("invalid budget count in entry: {raw}"))?;
    Ok((key.to_string(), value))
}

/// Parse `content_type:class` scoped block-list entries.
pub fn parse_scoped_class_entry(raw: &str) -> Result<(String, String)> {
    let Some((content_type, class)) = raw.split_once(':') else {
        bail!("expected content_type:class entry, got: {raw}");
    };
    let content_type = content_type.trim();
    let class = class.trim();
    if content_type.is_empty() || class.is_empty() {
        bail!("empty content type or class in entry: {raw}");
    }
    Ok((content_type.to_string(), class.to_string()))
}

/// Parse `content_type:class=budget` review-budget entries.
pub fn parse_scoped_budget_entry(raw: &str) -> Result<(String, String, usize)> {
    let Some((scoped, value)) = raw.split_once('=') else {
        bail!("expected content_type:class=budget entry, got: {raw}");
    };
    let (content_type, class) = parse_scoped_class_entry(scoped)?;
    let budget = value
        .trim()
        .parse::<usize>()
        .with_context(|| format!("invalid budget count in entry: {raw}"))?;
    Ok((content_type, class, budget))
}

/// Time-bounded exception rule. `"*"` wildcards either field; among multiple
/// matches the rule with the fewest wildcards wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Waiver {
    pub video_id: String,
    pub check: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

impl Waiver {
    fn field_matches(pattern: &str, value: &str) -> bool {
        pattern == "*" || pattern == value
    }

    pub fn matches(&self, video_id: &str, check: &str) -> bool {
        Self::field_matches(&self.video_id, video_id) && Self::field_matches(&self.check, check)
    }

    pub fn wildcard_count(&self) -> usize {
        usize::from(self.video_id == "*") + usize::from(self.check == "*")
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match &self.expires_at {
            None => false,
            Some(raw) => match DateTime::parse_from_rfc3339(raw) {
                Ok(expiry) => expiry.with_timezone(&Utc) < now,
                // An unparseable expiry is treated as already expired so a
                // typo can never grant an open-ended waiver.
                Err(_) => true,
            },
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WaiverSet {
    pub active: Vec<Waiver>,
    pub expired: Vec<Waiver>,
}

impl WaiverSet {
    pub fn partition(waivers: Vec<Waiver>, now: DateTime<Utc>) -> Self {
        let mut set = WaiverSet::default();
        for waiver in waivers {
            if waiver.is_expired(now) {
                set.expired.push(waiver);
            } else {
                set.active.push(waiver);
            }
        }
        set
    }

    /// Most-specific active match, if any. Expired rules are inert.
    pub fn match_for(&self, video_id: &str, check: &str) -> Option<&Waiver> {
        self.active
            .iter()
            .filter(|waiver| waiver.matches(video_id, check))
            .min_by_key(|waiver| waiver.wildcard_count())
    }
}

/// Waiver file: either a bare array of rules or `{"waivers": [...]}`.
pub fn load_waivers(path: &Path) -> Result<Vec<Waiver>> {
    let payload = read_json_value(path)?;
    let rows = match &payload {
        Value::Array(rows) => rows.clone(),
        Value::Object(map) => match map.get("waivers") {
            Some(Value::Array(rows)) => rows.clone(),
            _ => bail!(
                "waiver file must be an array or an object with a 'waivers' array: {}",
                path.display()
            ),
        },
        _ => bail!("waiver file has unsupported shape: {}", path.display()),
    };

    rows.into_iter()
        .map(|row| {
            serde_json::from_value(row)
                .with_context(|| format!("invalid waiver rule in {}", path.display()))
        })
        .collect()
}
