use std::collections::BTreeMap;

use crate::stagedoc::{Segment, StageDoc, is_placeholder_role};

use super::CrossStageResult;

/// Compare one item's upstream (segmentation) and downstream (semantic)
/// documents. Ordered results: classification agreement, element stability,
/// referential integrity, role stability, then the terminal passed marker
/// when nothing errored.
pub fn compare_docs(upstream: &StageDoc, downstream: &StageDoc) -> Vec<CrossStageResult> {
    let mut results = Vec::new();

    check_classification(upstream, downstream, &mut results);
    check_segment_stability(upstream, downstream, &mut results);
    check_conversation_references(upstream, downstream, &mut results);
    check_role_stability(upstream, downstream, &mut results);

    let has_error = results
        .iter()
        .any(|result| result.severity == super::ResultSeverity::Error);
    if !has_error {
        results.push(CrossStageResult::info(
            "cross_stage_passed",
            "no cross-stage errors detected".to_string(),
        ));
    }

    results
}

fn check_classification(
    upstream: &StageDoc,
    downstream: &StageDoc,
    results: &mut Vec<CrossStageResult>,
) {
    if upstream.content_type != downstream.content_type {
        results.push(CrossStageResult::error(
            "content_type_mismatch",
            format!(
                "upstream classified '{}' but downstream classified '{}'",
                upstream.content_type, downstream.content_type
            ),
        ));
    }
}

fn segments_by_id(doc: &StageDoc) -> BTreeMap<i64, &Segment> {
    doc.segments
        .iter()
        .map(|segment| (segment.id, segment))
        .collect()
}

fn check_segment_stability(
    upstream: &StageDoc,
    downstream: &StageDoc,
    results: &mut Vec<CrossStageResult>,
) {
    if upstream.segments.len() != downstream.segments.len() {
        results.push(CrossStageResult::error(
            "segment_count_mismatch",
            format!(
                "upstream has {} segments, downstream has {}",
                upstream.segments.len(),
                downstream.segments.len()
            ),
        ));
        return;
    }

    let upstream_ids = segments_by_id(upstream);
    let downstream_ids = segments_by_id(downstream);
    let missing: Vec<i64> = upstream_ids
        .keys()
        .filter(|id| !downstream_ids.contains_key(id))
        .copied()
        .collect();
    if !missing.is_empty() {
        results.push(CrossStageResult::error(
            "segment_id_mismatch",
            format!("downstream is missing segment ids {missing:?}"),
        ));
        return;
    }

    // Counts and ids match; content stability is advisory.
    let diffs = upstream_ids
        .iter()
        .filter(|(id, segment)| {
            downstream_ids
                .get(id)
                .map(|other| other.text != segment.text)
                .unwrap_or(false)
        })
        .count();
    if diffs > 0 {
        results.push(CrossStageResult::warning(
            "segment_text_drift",
            format!("{diffs} of {} segment texts differ", upstream.segments.len()),
        ));
    }
}

fn check_conversation_references(
    upstream: &StageDoc,
    downstream: &StageDoc,
    results: &mut Vec<CrossStageResult>,
) {
    for segment in &downstream.segments {
        let Some(conversation_id) = segment.conversation_id else {
            continue;
        };
        match upstream.conversation(conversation_id) {
            None => {
                results.push(
                    CrossStageResult::error(
                        "phantom_conversation_reference",
                        format!(
                            "segment {} references conversation {conversation_id} \
                             which does not exist upstream",
                            segment.id
                        ),
                    )
                    .at_segment(segment.id),
                );
            }
            Some(conversation) if !conversation.segment_ids.contains(&segment.id) => {
                results.push(
                    CrossStageResult::error(
                        "mismatched_conversation_reference",
                        format!(
                            "segment {} claims conversation {conversation_id} but that \
                             conversation does not list it",
                            segment.id
                        ),
                    )
                    .at_segment(segment.id),
                );
            }
            Some(_) => {}
        }
    }
}

fn check_role_stability(
    upstream: &StageDoc,
    downstream: &StageDoc,
    results: &mut Vec<CrossStageResult>,
) {
    let downstream_ids = segments_by_id(downstream);
    for segment in &upstream.segments {
        let Some(other) = downstream_ids.get(&segment.id) else {
            continue;
        };
        let (Some(upstream_role), Some(downstream_role)) =
            (segment.speaker_role.as_deref(), other.speaker_role.as_deref())
        else {
            continue;
        };
        if upstream_role == downstream_role {
            continue;
        }
        // Refining an explicit placeholder is expected, not drift.
        if is_placeholder_role(upstream_role) {
            continue;
        }
        results.push(
            CrossStageResult::warning(
                "speaker_role_drift",
                format!(
                    "segment {} role changed from '{upstream_role}' to '{downstream_role}'",
                    segment.id
                ),
            )
            .at_segment(segment.id),
        );
    }
}
