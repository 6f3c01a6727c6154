//! Test utilities gated behind the `testing` feature — re-exports the
//! mockall-generated mocks plus reusable fixtures, so downstream crates
//! (`tutor-storage`, `tutor-cli`) don't each hand-roll learner/concept
//! test data.

pub mod fixtures;

pub use crate::ports::{MockLlmClient, MockRepository};
