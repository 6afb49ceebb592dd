use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::util::read_json;

/// Upstream speaker roles that are explicit placeholders: a downstream stage
/// refining one of these is not drift.
pub const PLACEHOLDER_ROLES: &[&str] = &["unknown", "collapsed"];

/// One atomic element of a stage document. Ids are stable integers assigned
/// by the segmentation stage and must survive downstream re-emission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub id: i64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_role: Option<String>,
    /// Reference to an upstream conversation grouping; only present on
    /// downstream (semantic) documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub techniques: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: i64,
    pub segment_ids: Vec<i64>,
}

/// Content document emitted by the segmentation stage and re-emitted (with
/// annotations) by the semantic stage. The cross-stage validator compares
/// two of these for the same video id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDoc {
    pub content_type: String,
    pub segments: Vec<Segment>,
    #[serde(default)]
    pub conversations: Vec<Conversation>,
}

impl StageDoc {
    pub fn conversation(&self, id: i64) -> Option<&Conversation> {
        self.conversations
            .iter()
            .find(|conversation| conversation.id == id)
    }
}

pub fn load_stage_doc(path: &Path) -> Result<StageDoc> {
    read_json(path)
}

pub fn is_placeholder_role(role: &str) -> bool {
    PLACEHOLDER_ROLES.contains(&role)
}
