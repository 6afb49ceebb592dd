use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::util::{now_utc_string, read_json, write_json_pretty_atomic};

pub const QUARANTINE_FILE_VERSION: u32 = 2;

/// One recorded reason an id is quarantined. Deduplication key is the whole
/// tuple: the same check firing with a different message is a new reason.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QuarantineReason {
    pub severity: String,
    pub check: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarantinedVideo {
    pub video_id: String,
    pub checks: BTreeSet<String>,
    pub reasons: Vec<QuarantineReason>,
}

/// On-disk quarantine schema. The id list is the source of truth for
/// "already blocked"; `videos` carries the per-id audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarantineFile {
    pub version: u32,
    pub generated_at: String,
    pub quarantine_level: String,
    pub quarantined_video_count: usize,
    pub quarantined_video_ids: Vec<String>,
    pub videos: Vec<QuarantinedVideo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuarantineSet {
    pub quarantine_level: String,
    pub videos: BTreeMap<String, QuarantinedVideo>,
}

impl QuarantineSet {
    pub fn empty() -> Self {
        QuarantineSet {
            quarantine_level: "video".to_string(),
            videos: BTreeMap::new(),
        }
    }

    pub fn contains(&self, video_id: &str) -> bool {
        self.videos.contains_key(video_id)
    }

    pub fn ids(&self) -> BTreeSet<String> {
        self.videos.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.videos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.videos.is_empty()
    }

    /// Monotonic, idempotent merge: union over ids, union over each id's
    /// checks, reason concat deduplicated by (severity, check, message).
    /// Never removes an id; removing a false positive is an out-of-band
    /// rewrite, not an API call.
    pub fn merge(&mut self, additions: &[QuarantinedVideo]) {
        for addition in additions {
            let entry = self
                .videos
                .entry(addition.video_id.clone())
                .or_insert_with(|| QuarantinedVideo {
                    video_id: addition.video_id.clone(),
                    checks: BTreeSet::new(),
                    reasons: Vec::new(),
                });
            entry.checks.extend(addition.checks.iter().cloned());
            for reason in &addition.reasons {
                if !entry.reasons.contains(reason) {
                    entry.reasons.push(reason.clone());
                }
            }
        }
    }

    pub fn to_file(&self) -> QuarantineFile {
        QuarantineFile {
            version: QUARANTINE_FILE_VERSION,
            generated_at: now_utc_string(),
            quarantine_level: self.quarantine_level.clone(),
            quarantined_video_count: self.videos.len(),
            quarantined_video_ids: self.videos.keys().cloned().collect(),
            videos: self.videos.values().cloned().collect(),
        }
    }
}

impl From<QuarantineFile> for QuarantineSet {
    fn from(file: QuarantineFile) -> Self {
        let mut videos: BTreeMap<String, QuarantinedVideo> = BTreeMap::new();
        for video in file.videos {
            videos.insert(video.video_id.clone(), video);
        }
        // Ids listed without a per-video record still count as quarantined.
        for video_id in file.quarantined_video_ids {
            videos
                .entry(video_id.clone())
                .or_insert_with(|| QuarantinedVideo {
                    video_id,
                    checks: BTreeSet::new(),
                    reasons: Vec::new(),
                });
        }
        QuarantineSet {
            quarantine_level: file.quarantine_level,
            videos,
        }
    }
}

/// Missing file is an empty set, not an error: the first validator run on a
/// fresh pipeline has nothing quarantined yet.
pub fn load(path: &Path) -> Result<QuarantineSet> {
    if !path.exists() {
        return Ok(QuarantineSet::empty());
    }
    let file: QuarantineFile = read_json(path)?;
    Ok(QuarantineSet::from(file))
}

/// Single-writer rewrite of the quarantine file. Callers must have merged
/// against the freshly loaded state (read-merge-write).
pub fn store(path: &Path, set: &QuarantineSet) -> Result<()> {
    write_json_pretty_atomic(path, &set.to_file())
}
