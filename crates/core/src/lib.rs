//! Minstrel core: device identities, managers and the per-class media cores

pub mod domain;
mod sync;

pub use domain::*;
