use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;

fn video_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("static pattern"))
}

fn bracketed_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[([A-Za-z0-9_-]{11})\]").expect("static pattern"))
}

pub fn is_video_id(candidate: &str) -> bool {
    video_id_pattern().is_match(candidate)
}

/// Pull an 11-character id out of a folder label such as
/// `Some Title [abcdefghijk]`. The last bracketed match wins so titles that
/// themselves contain brackets stay parseable.
pub fn extract_video_id(label: &str) -> Option<String> {
    bracketed_id_pattern()
        .captures_iter(label)
        .last()
        .map(|captures| captures[1].to_string())
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ScopeEntry {
    pub source: String,
    pub video_id: String,
    pub raw_label: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Scope {
    pub entries: Vec<ScopeEntry>,
    /// Manifest lines that could not be parsed, with line numbers. Reported,
    /// never fatal: a bad line must not hide the rest of the scope.
    pub malformed_lines: Vec<String>,
}

impl Scope {
    pub fn video_ids(&self) -> BTreeSet<String> {
        self.entries
            .iter()
            .map(|entry| entry.video_id.clone())
            .collect()
    }

    pub fn filter_source(&self, source: &str) -> Scope {
        Scope {
            entries: self
                .entries
                .iter()
                .filter(|entry| entry.source == source)
                .cloned()
                .collect(),
            malformed_lines: self.malformed_lines.clone(),
        }
    }

    pub fn entry_for(&self, video_id: &str) -> Option<&ScopeEntry> {
        self.entries.iter().find(|entry| entry.video_id == video_id)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Parse a line-oriented manifest: `source | folder_label`, `#` comments and
/// blank lines skipped. Uniqueness is per `(source, video_id)`; later
/// duplicates are dropped.
pub fn parse_manifest(path: &Path) -> Result<Scope> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest: {}", path.display()))?;
    Ok(parse_manifest_text(&data))
}

pub fn parse_manifest_text(data: &str) -> Scope {
    let mut scope = Scope::default();
    let mut seen = BTreeSet::new();

    for (index, raw_line) in data.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((source, label)) = line.split_once('|') else {
            scope
                .malformed_lines
                .push(format!("line {}: missing '|' separator", index + 1));
            continue;
        };
        let source = source.trim();
        let label = label.trim();
        if source.is_empty() {
            scope
                .malformed_lines
                .push(format!("line {}: empty source", index + 1));
            continue;
        }

        let Some(video_id) = extract_video_id(label) else {
            scope.malformed_lines.push(format!(
                "line {}: no bracketed 11-character id in label",
                index + 1
            ));
            continue;
        };

        if !seen.insert((source.to_string(), video_id.clone())) {
            continue;
        }

        scope.entries.push(ScopeEntry {
            source: source.to_string(),
            video_id,
            raw_label: label.to_string(),
        });
    }

    scope
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_bracketed_id_from_label() {
        assert_eq!(
            extract_video_id("Some Title [abcdefghijk]"),
            Some("abcdefghijk".to_string())
        );
        assert_eq!(
            extract_video_id("Nested [tag] title [AbC-dEf_123]"),
            Some("AbC-dEf_123".to_string())
        );
        assert_eq!(extract_video_id("No id here"), None);
        assert_eq!(extract_video_id("Too short [abc]"), None);
    }

    #[test]
    fn video_id_pattern_rejects_wrong_lengths_and_chars() {
        assert!(is_video_id("abcdefghijk"));
        assert!(is_video_id("A1-_b2C3d4E"));
        assert!(!is_video_id("abcdefghij"));
        assert!(!is_video_id("abcdefghijkl"));
        assert!(!is_video_id("abcdefghij!"));
    }

    #[test]
    fn parses_manifest_skipping_comments_and_reporting_bad_lines() {
        let text = "\
# comment
coach_x | First Video [abcdefghijk]

coach_y | Second Video [AAAAAAAAAAA]
broken line without separator
coach_x | No id in this label
coach_x | First Video [abcdefghijk]
";
        let scope = parse_manifest_text(text);
        assert_eq!(scope.entries.len(), 2);
        assert_eq!(scope.entries[0].source, "coach_x");
        assert_eq!(scope.entries[0].video_id, "abcdefghijk");
        assert_eq!(scope.entries[1].video_id, "AAAAAAAAAAA");
        assert_eq!(scope.malformed_lines.len(), 2);
        assert!(scope.malformed_lines[0].contains("line 5"));
        assert!(scope.malformed_lines[1].contains("line 6"));
    }

    #[test]
    fn filter_source_keeps_only_matching_entries() {
        let scope = parse_manifest_text(
            "coach_x | A [abcdefghijk]\ncoach_y | B [AAAAAAAAAAA]\n",
        );
        let filtered = scope.filter_source("coach_y");
        assert_eq!(filtered.entries.len(), 1);
        assert_eq!(filtered.entries[0].video_id, "AAAAAAAAAAA");
    }
}
