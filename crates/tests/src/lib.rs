//! Cross-crate scenario tests
//!
//! Cores driven by the infra managers plus a scripted manager that can be
//! told to fail.

#[cfg(test)]
mod support;

#[cfg(test)]
mod core_scenarios;

#[cfg(test)]
mod scheduler_scenarios;

#[cfg(test)]
mod config_integration;
