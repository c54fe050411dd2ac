//! Pipeline board simulator
//!
//! Drives a [`pipeline_board::MoveCoordinator`] with seeded random moves
//! against an in-memory store, injecting persistence failures and checking
//! the board's invariants after every step.

pub mod simulator;

pub use simulator::{run_simulator, SimulatorConfig, SimulatorReport, SimulatorStats, Violation};
