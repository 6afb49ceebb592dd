use crate::signal::CanonicalSignal;

mod engine;
mod evidence;
mod run;
#[cfg(test)]
mod tests;

pub use self::engine::{Decision, decide};
pub use self::evidence::{ItemEvidence, collect_evidence};
pub use self::run::run;

/// Effective signal class of a canonical signal: the producer's explicit tag
/// when present, otherwise derived from the check name.
pub fn effective_class(signal: &CanonicalSignal) -> String {
    signal
        .signal_class
        .clone()
        .unwrap_or_else(|| crate::stages::signal_class_for_check(&signal.issue_code).to_string())
}
