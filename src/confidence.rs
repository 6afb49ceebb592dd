use serde::{Deserialize, Serialize};

use crate::signal::{IssueSeverity, ScopeType};

pub const BAND_HIGH_THRESHOLD: f64 = 0.80;
pub const BAND_MEDIUM_THRESHOLD: f64 = 0.60;

/// Severity-keyed multipliers used when folding signals into a per-item
/// confidence score. Surfaced in the readiness summary for audit.
pub const PENALTY_CRITICAL: f64 = 0.50;
pub const PENALTY_MAJOR: f64 = 0.70;
pub const PENALTY_MINOR: f64 = 0.90;
pub const PENALTY_INFO: f64 = 1.00;

pub fn severity_multiplier(severity: IssueSeverity) -> f64 {
    match severity {
        IssueSeverity::Critical => PENALTY_CRITICAL,
        IssueSeverity::Major => PENALTY_MAJOR,
        IssueSeverity::Minor => PENALTY_MINOR,
        IssueSeverity::Info => PENALTY_INFO,
    }
}

/// Clip to [0, 1]; NaN collapses to 0 so downstream arithmetic stays total.
pub fn clamp01(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
}

impl ConfidenceBand {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

pub fn band(score: f64) -> ConfidenceBand {
    band_with_thresholds(score, BAND_HIGH_THRESHOLD, BAND_MEDIUM_THRESHOLD)
}

/// Inclusive lower bounds: `score >= high` is high, `score >= medium` is
/// medium, everything else low.
pub fn band_with_thresholds(score: f64, high: f64, medium: f64) -> ConfidenceBand {
    let score = clamp01(score);
    if score >= high {
        ConfidenceBand::High
    } else if score >= medium {
        ConfidenceBand::Medium
    } else {
        ConfidenceBand::Low
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Penalty {
    pub issue_code: String,
    pub scope_type: ScopeType,
    pub severity: IssueSeverity,
    pub multiplier: f64,
}

/// One multiplication in the audit trail. The sequence of steps must
/// reproduce the exact order penalties were applied in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PenaltyStep {
    pub issue_code: String,
    pub scope_type: ScopeType,
    pub severity: IssueSeverity,
    pub multiplier: f64,
    pub before: f64,
    pub after: f64,
    pub delta: f64,
}

/// Fold penalties into `base` one multiplication at a time, clamping the
/// multiplier and each intermediate score. Returns the final score plus the
/// ordered audit trail.
pub fn apply_penalties(base: f64, penalties: &[Penalty]) -> (f64, Vec<PenaltyStep>) {
    let mut score = clamp01(base);
    let mut trail = Vec::with_capacity(penalties.len());

    for penalty in penalties {
        let multiplier = clamp01(penalty.multiplier);
        let before = score;
        let after = clamp01(before * multiplier);
        trail.push(PenaltyStep {
            issue_code: penalty.issue_code.clone(),
            scope_type: penalty.scope_type,
            severity: penalty.severity,
            multiplier,
            before,
            after,
            delta: after - before,
        });
        score = after;
    }

    (score, trail)
}

/// Bounded weighted average. Entries whose weight is non-positive or
/// non-finite are excluded; empty (or fully excluded) input yields 0.
pub fn weighted_mean(scores: &[f64], weights: Option<&[f64]>) -> f64 {
    let mut numerator = 0.0_f64;
    let mut denominator = 0.0_f64;

    for (index, &score) in scores.iter().enumerate() {
        let weight = match weights {
            Some(weights) => weights.get(index).copied().unwrap_or(0.0),
            None => 1.0,
        };
        if !weight.is_finite() || weight <= 0.0 {
            continue;
        }
        numerator += clamp01(score) * weight;
        denominator += weight;
    }

    if denominator <= 0.0 {
        return 0.0;
    }
    clamp01(numerator / denominator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp01_bounds_and_nan() {
        assert_eq!(clamp01(-0.5), 0.0);
        assert_eq!(clamp01(0.0), 0.0);
        assert_eq!(clamp01(0.42), 0.42);
        assert_eq!(clamp01(1.0), 1.0);
        assert_eq!(clamp01(7.3), 1.0);
        assert_eq!(clamp01(f64::NAN), 0.0);
        assert_eq!(clamp01(f64::INFINITY), 1.0);
        assert_eq!(clamp01(f64::NEG_INFINITY), 0.0);
    }

    #[test]
    fn band_uses_inclusive_lower_bounds() {
        assert_eq!(band(0.80), ConfidenceBand::High);
        assert_eq!(band(0.95), ConfidenceBand::High);
        assert_eq!(band(0.799), ConfidenceBand::Medium);
        assert_eq!(band(0.60), ConfidenceBand::Medium);
        assert_eq!(band(0.599), ConfidenceBand::Low);
        assert_eq!(band(f64::NAN), ConfidenceBand::Low);
    }

    fn penalty(code: &str, multiplier: f64) -> Penalty {
        Penalty {
            issue_code: code.to_string(),
            scope_type: ScopeType::Video,
            severity: IssueSeverity::Minor,
            multiplier,
        }
    }

    #[test]
    fn apply_penalties_records_ordered_trail() {
        let (score, trail) =
            apply_penalties(1.0, &[penalty("first", 0.9), penalty("second", 0.7)]);
        assert!((score - 0.63).abs() < 1e-12);
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].issue_code, "first");
        assert_eq!(trail[0].before, 1.0);
        assert!((trail[0].after - 0.9).abs() < 1e-12);
        assert_eq!(trail[1].issue_code, "second");
        assert!((trail[1].before - 0.9).abs() < 1e-12);
        assert!((trail[1].delta - (0.63 - 0.9)).abs() < 1e-12);
    }

    #[test]
    fn apply_penalties_is_order_insensitive_in_final_score() {
        let forward = apply_penalties(0.8, &[penalty("a", 0.5), penalty("b", 0.9)]);
        let reverse = apply_penalties(0.8, &[penalty("b", 0.9), penalty("a", 0.5)]);
        assert!((forward.0 - reverse.0).abs() < 1e-12);
        assert_eq!(forward.1[0].issue_code, "a");
        assert_eq!(reverse.1[0].issue_code, "b");
    }

    #[test]
    fn apply_penalties_clamps_wild_multipliers() {
        let (score, trail) = apply_penalties(0.5, &[penalty("boost", 3.0)]);
        assert_eq!(score, 0.5);
        assert_eq!(trail[0].multiplier, 1.0);

        let (score, trail) = apply_penalties(0.5, &[penalty("nan", f64::NAN)]);
        assert_eq!(score, 0.0);
        assert_eq!(trail[0].multiplier, 0.0);
    }

    #[test]
    fn weighted_mean_skips_invalid_weights_and_handles_empty() {
        assert_eq!(weighted_mean(&[], None), 0.0);
        assert!((weighted_mean(&[0.4, 0.8], None) - 0.6).abs() < 1e-12);
        let scores = [0.2, 0.9, 0.5];
        let weights = [1.0, 0.0, f64::NAN];
        assert_eq!(weighted_mean(&scores, Some(&weights)), 0.2);
        assert_eq!(weighted_mean(&[0.5], Some(&[-1.0])), 0.0);
    }
}
