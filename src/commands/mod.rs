pub mod check_reports;
pub mod cross_stage;
pub mod drift;
pub mod gate;
pub mod preflight;
