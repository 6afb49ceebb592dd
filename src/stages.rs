use serde::Serialize;

/// One pipeline stage as the gate layer sees it: where its reports and
/// artifacts live and which upstream stages must have run first. This is a
/// fixed table, never inferred from disk.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StageSpec {
    pub key: &'static str,
    /// Subdirectory under the pipeline root holding this stage's artifacts.
    pub dir: &'static str,
    /// Filename suffixes that count as "this stage produced an artifact".
    pub artifact_suffixes: &'static [&'static str],
    pub depends_on: &'static [&'static str],
}

pub const STAGES: &[StageSpec] = &[
    StageSpec {
        key: "stage01_media",
        dir: "01_media",
        artifact_suffixes: &[".mp4", ".m4a", ".webm"],
        depends_on: &[],
    },
    StageSpec {
        key: "stage02_audio",
        dir: "02_audio",
        artifact_suffixes: &[".wav"],
        depends_on: &["stage01_media"],
    },
    StageSpec {
        key: "stage03_transcribe",
        dir: "03_transcribe",
        artifact_suffixes: &[".transcript.json"],
        depends_on: &["stage02_audio"],
    },
    StageSpec {
        key: "stage04_diarize",
        dir: "04_diarize",
        artifact_suffixes: &[".diarization.json"],
        depends_on: &["stage02_audio", "stage03_transcribe"],
    },
    StageSpec {
        key: "stage05_features",
        dir: "05_features",
        artifact_suffixes: &[".features.json"],
        depends_on: &["stage03_transcribe"],
    },
    StageSpec {
        key: "stage06_segment",
        dir: "06_segment",
        artifact_suffixes: &[".segments.json"],
        depends_on: &["stage03_transcribe", "stage04_diarize"],
    },
    StageSpec {
        key: "stage07_semantic",
        dir: "07_semantic",
        artifact_suffixes: &[".semantic.json"],
        depends_on: &["stage06_segment"],
    },
    StageSpec {
        key: "stage08_taxonomy",
        dir: "08_taxonomy",
        artifact_suffixes: &[".taxonomy.json"],
        depends_on: &["stage07_semantic"],
    },
];

/// Stage whose report metrics carry the resolved content-type classification.
pub const CONTENT_TYPE_STAGE: &str = "stage06_segment";

/// Media coverage stage whose absence is policy-graded rather than a fixed
/// severity (see `GatePolicy::missing_media_severity`).
pub const MEDIA_STAGE: &str = "stage01_media";

/// Checks that are informational by construction. They never count against
/// warning budgets and cannot force REVIEW or BLOCKED on their own.
pub const INFORMATIONAL_CHECKS: &[&str] = &[
    "normalization_repair_applied",
    "unicode_nfc_applied",
    "stem_whitespace_collapsed",
];

pub fn stage(key: &str) -> Option<&'static StageSpec> {
    STAGES.iter().find(|spec| spec.key == key)
}

pub fn is_informational_check(check: &str) -> bool {
    INFORMATIONAL_CHECKS.contains(&check)
}

/// Derive a signal class from a check name via substring/prefix rules.
/// Producers that tag their checks explicitly bypass this.
pub fn signal_class_for_check(check: &str) -> &'static str {
    if check.starts_with("stage08_") || check.contains("taxonomy") {
        return "taxonomy_coverage";
    }
    if check.starts_with("stage07_") || check.contains("semantic") || check.contains("technique") {
        return "semantic_tagging";
    }
    if check.starts_with("stage06_") || check.contains("segment") || check.contains("conversation")
    {
        return "segmentation_integrity";
    }
    if check.starts_with("stage04_") || check.contains("speaker") || check.contains("diariz") {
        return "speaker_attribution";
    }
    if check.starts_with("stage03_") || check.contains("transcript") {
        return "transcript_quality";
    }
    if check.starts_with("invalid_")
        || check.starts_with("missing_")
        || check.contains("schema")
        || check.contains("artifact")
        || check.contains("contract")
    {
        return "artifact_contract";
    }
    "content_quality"
}
