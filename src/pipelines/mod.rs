//! Signing workflow orchestration.

pub mod sign;

pub use sign::{SignRequest, SignWorkflow};
