//! Runtime layer of the Taskforge orchestration engine
//!
//! This crate hosts the stateful, tokio-backed half of the system: the
//! task service that owns the live registry, the sync/async executors
//! that invoke agent callbacks, the multi-phase work orchestrator, and
//! the file-backed checkpoint store with its VCS adapter seam. All domain
//! models come from `taskforge-core`.

pub mod checkpoint;
pub mod executor;
pub mod orchestrator;
pub mod service;
pub mod vcs;

pub use taskforge_core::{Error, Result};
