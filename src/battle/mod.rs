//! The battle lifecycle core: data model, state machines, event ledger,
//! configuration rules and post-battle kill aggregation.

pub mod config_rules;
pub mod engine;
pub mod events;
pub mod finalize;
pub mod model;
pub mod service;
pub mod snapshot;
pub mod status;
