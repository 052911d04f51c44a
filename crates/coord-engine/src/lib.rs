//! Drives the eight-step coordination protocol over a pool of reasoning
//! agents and executes the resulting agreement against the append-only
//! ledger. This crate is the glue between `coord-agents` and `coord-ledger`
//! — it owns no data model of its own beyond the session-tracking engine.

mod binding;
mod engine;
mod error;
mod scenario;

pub use engine::{CoordinationEngine, EngineConfig};
pub use error::{CoordinationError, FailureReason};
pub use scenario::{CoordinationResult, ScenarioSpec};
