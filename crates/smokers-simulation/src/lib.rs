//! Smokers Simulation
//!
//! Runs the cigarette smokers protocol from `smokers-core` as one process:
//! a [`Simulation`] owns the synchronisation set, spawns the agent and the
//! three smokers as tokio tasks, checks every state snapshot against the
//! protocol invariants and reports the outcome.
//!
//! Configuration comes from an optional TOML file overridden by command-line
//! flags; see [`config::SimulationConfig`].

pub mod cli;
pub mod config;
pub mod invariant;
pub mod runner;

pub use config::{AccessKey, ConfigError, LogConfig, SimulationConfig};
pub use invariant::{
    default_checkers, InvariantChecker, InvariantObserver, InvariantResult, InvariantType,
    InvariantViolation,
};
pub use runner::{Simulation, SimulationReport};
