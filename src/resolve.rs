use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// Deterministic resolver for duplicate artifact candidates. Ranking:
/// prefer a path mentioning the scope source, then the deeper path, then the
/// lexicographically smallest. Replaces per-caller glob-order heuristics.
pub fn resolve_candidate<'a>(
    candidates: &'a [PathBuf],
    scope_source: Option<&str>,
) -> Option<&'a Path> {
    candidates
        .iter()
        .min_by(|left, right| rank(left, right, scope_source))
        .map(PathBuf::as_path)
}

fn mentions_source(path: &Path, source: Option<&str>) -> bool {
    let Some(source) = source else {
        return false;
    };
    path.components().any(|component| {
        component
            .as_os_str()
            .to_str()
            .map(|part| part.contains(source))
            .unwrap_or(false)
    })
}

fn depth(path: &Path) -> usize {
    path.components().count()
}

fn rank(left: &Path, right: &Path, source: Option<&str>) -> Ordering {
    let left_source = mentions_source(left, source);
    let right_source = mentions_source(right, source);
    // true sorts first
    right_source
        .cmp(&left_source)
        .then_with(|| depth(right).cmp(&depth(left)))
        .then_with(|| left.cmp(right))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(raw: &[&str]) -> Vec<PathBuf> {
        raw.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn empty_candidates_yield_none() {
        assert_eq!(resolve_candidate(&[], Some("coach_x")), None);
    }

    #[test]
    fn prefers_candidate_mentioning_scope_source() {
        let candidates = paths(&[
            "reports/other/abcdefghijk.report.json",
            "reports/coach_x/abcdefghijk.report.json",
        ]);
        let resolved = resolve_candidate(&candidates, Some("coach_x")).expect("candidate");
        assert_eq!(
            resolved,
            Path::new("reports/coach_x/abcdefghijk.report.json")
        );
    }

    #[test]
    fn prefers_deeper_path_when_source_ties() {
        let candidates = paths(&[
            "reports/abcdefghijk.report.json",
            "reports/nested/run/abcdefghijk.report.json",
        ]);
        let resolved = resolve_candidate(&candidates, None).expect("candidate");
        assert_eq!(
            resolved,
            Path::new("reports/nested/run/abcdefghijk.report.json")
        );
    }

    #[test]
    fn lexicographic_tiebreak_is_stable() {
        let candidates = paths(&[
            "reports/b/abcdefghijk.report.json",
            "reports/a/abcdefghijk.report.json",
        ]);
        let resolved = resolve_candidate(&candidates, None).expect("candidate");
        assert_eq!(resolved, Path::new("reports/a/abcdefghijk.report.json"));

        let mut reversed = candidates.clone();
        reversed.reverse();
        assert_eq!(
            resolve_candidate(&reversed, None).expect("candidate"),
            resolved
        );
    }
}
