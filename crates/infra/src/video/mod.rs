//! Video capture backends

pub mod test_pattern;

pub use test_pattern::TestPatternManager;
