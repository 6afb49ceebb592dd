mod run;
mod stats;

pub use self::run::run;
