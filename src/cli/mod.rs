//! Command line interface module
//!
//! This module provides argument parsing and the runner that wires configuration,
//! credentials, the fetch engine and the registry getter together.

pub mod args;
pub mod runner;

pub use args::{Args, Command};
pub use runner::Runner;
