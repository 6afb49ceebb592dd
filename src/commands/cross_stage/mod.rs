use serde::Serialize;

mod compare;
mod run;

pub use self::compare::compare_docs;
pub use self::run::run;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSeverity {
    Error,
    Warning,
    Info,
}

impl ResultSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

/// One finding from comparing the same item across two sequential stages.
#[derive(Debug, Clone, Serialize)]
pub struct CrossStageResult {
    pub severity: ResultSeverity,
    pub check: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_id: Option<i64>,
}

impl CrossStageResult {
    pub fn error(check: &str, message: String) -> Self {
        CrossStageResult {
            severity: ResultSeverity::Error,
            check: check.to_string(),
            message,
            segment_id: None,
        }
    }

    pub fn warning(check: &str, message: String) -> Self {
        CrossStageResult {
            severity: ResultSeverity::Warning,
            check: check.to_string(),
            message,
            segment_id: None,
        }
    }

    pub fn info(check: &str, message: String) -> Self {
        CrossStageResult {
            severity: ResultSeverity::Info,
            check: check.to_string(),
            message,
            segment_id: None,
        }
    }

    pub fn at_segment(mut self, segment_id: i64) -> Self {
        self.segment_id = Some(segment_id);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoComparison {
    pub video_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downstream_path: Option<String>,
    pub error_count: usize,
    pub warning_count: usize,
    pub results: Vec<CrossStageResult>,
}

#[derive(Debug, Serialize)]
pub struct CrossStageReport {
    pub manifest_version: u32,
    pub generated_at: String,
    pub upstream_stage: String,
    pub downstream_stage: String,
    pub status: String,
    pub videos: Vec<VideoComparison>,
}
