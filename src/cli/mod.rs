//! CLI-specific functionality for the aegis diagnostic binary
//!
//! This module contains all CLI-related code including argument parsing
//! and the subcommand handlers.

pub mod args;
pub mod commands;

pub use args::{Args, Commands};
