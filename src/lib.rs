// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod config;
pub mod dedup;
pub mod extract;
pub mod feedxml;
pub mod fetch;
pub mod pacing;
pub mod relevance;
pub mod scheduler;
pub mod sinks;
pub mod store;

// Harvest cycles (one module per recurring source type)
pub mod harvest;

// ---- Re-exports for stable public API ----
pub use crate::config::HarvesterConfig;
pub use crate::extract::Document;
pub use crate::harvest::{Candidate, CycleContext, CycleReport, HarvestCycle, RunOutcome};
pub use crate::scheduler::Scheduler;
