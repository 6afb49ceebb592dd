use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

/// Expected counts are floored so a category absent from the prior pool
/// cannot divide by zero or dominate the statistic on its own.
pub const PSEUDO_COUNT_FLOOR: f64 = 0.5;

/// Categorical drift threshold is this factor times the number of categories
/// in the key union.
pub const CATEGORY_DRIFT_FACTOR: f64 = 2.0;

pub const SCALAR_Z_THRESHOLD: f64 = 2.0;

/// Scalar comparison needs at least this many prior values for a usable
/// standard deviation.
pub const MIN_SCALAR_PRIORS: usize = 2;

#[derive(Debug, Clone, Serialize)]
pub struct CategoryDrift {
    pub table: String,
    pub statistic: f64,
    pub threshold: f64,
    pub categories: usize,
    pub drifted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScalarDrift {
    pub name: String,
    pub observed: f64,
    pub prior_mean: f64,
    pub prior_std: f64,
    pub z: f64,
    pub drifted: bool,
}

/// Chi-square-style statistic over the key union of the observed table and
/// the pooled prior tables: `sum((observed - expected)^2 / expected)` with
/// expected scaled to the observed total mass. `None` when there is nothing
/// to compare against.
pub fn categorical_drift(
    table: &str,
    observed: &BTreeMap<String, u64>,
    priors: &[&BTreeMap<String, u64>],
) -> Option<CategoryDrift> {
    if priors.is_empty() {
        return None;
    }

    let mut pooled: BTreeMap<&str, u64> = BTreeMap::new();
    for prior in priors {
        for (key, count) in prior.iter() {
            *pooled.entry(key.as_str()).or_default() += count;
        }
    }

    let observed_total: u64 = observed.values().sum();
    let pooled_total: u64 = pooled.values().sum();
    if pooled_total == 0 && observed_total == 0 {
        return None;
    }

    let keys: BTreeSet<&str> = observed
        .keys()
        .map(String::as_str)
        .chain(pooled.keys().copied())
        .collect();

    let mut statistic = 0.0_f64;
    for key in &keys {
        let observed_count = observed.get(*key).copied().unwrap_or(0) as f64;
        let expected = if pooled_total == 0 {
            PSEUDO_COUNT_FLOOR
        } else {
            let share = pooled.get(key).copied().unwrap_or(0) as f64 / pooled_total as f64;
            (share * observed_total as f64).max(PSEUDO_COUNT_FLOOR)
        };
        let diff = observed_count - expected;
        statistic += diff * diff / expected;
    }

    let threshold = CATEGORY_DRIFT_FACTOR * keys.len() as f64;
    Some(CategoryDrift {
        table: table.to_string(),
        statistic,
        threshold,
        categories: keys.len(),
        drifted: statistic > threshold,
    })
}

/// Z-score of the observed scalar against the prior batches' mean/std.
/// `None` below `MIN_SCALAR_PRIORS`: one prior batch has no spread.
pub fn scalar_drift(name: &str, observed: f64, priors: &[f64]) -> Option<ScalarDrift> {
    if priors.len() < MIN_SCALAR_PRIORS {
        return None;
    }

    let count = priors.len() as f64;
    let mean = priors.iter().sum::<f64>() / count;
    let variance = priors
        .iter()
        .map(|value| (value - mean) * (value - mean))
        .sum::<f64>()
        / count;
    // Floor the std so identical priors yield a huge but finite (and thus
    // serializable) z instead of a division by zero.
    let std = variance.sqrt().max(f64::EPSILON);
    let z = (observed - mean) / std;

    Some(ScalarDrift {
        name: name.to_string(),
        observed,
        prior_mean: mean,
        prior_std: std,
        z,
        drifted: z.abs() > SCALAR_Z_THRESHOLD,
    })
}
