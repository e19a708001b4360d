//! QUBOARD Solver - client for the external optimization service
//!
//! Sends a normalized payload to the solver endpoint and turns its reply
//! into a board position. The `Solver` trait is the seam the match driver
//! uses, so tests can substitute a scripted solver.

pub mod client;
pub mod config;
pub mod error;

pub use client::{parse_reply, HttpSolver, Solver, SolverReply};
pub use config::SolverConfig;
pub use error::SolverError;
