//! Core domain models and strategies for the Taskforge orchestration engine
//!
//! This crate contains the fundamental domain models, traits, and types
//! used throughout Taskforge for coordinating short-lived development
//! tasks across a fixed set of named agents: the immutable task model,
//! the agent roster and registry, pluggable agent-selection strategies,
//! the task decomposer, and the workflow/phase types consumed by the
//! engine crate.

pub mod agent;
pub mod decompose;
pub mod error;
pub mod selection;
pub mod task;
pub mod workflow;

pub use error::{Error, Result};
