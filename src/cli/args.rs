//! Command line argument parsing
//!
//! This module handles CLI argument parsing with subcommands:
//! - `status`: Show the current service status snapshot
//! - `probe`: Probe the remote service once and report the result
//! - `send`: Submit a single request and print the response
//! - `init-config`: Create a default configuration file in the home directory
//! - `show-config`: Show configuration discovery information

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "aegis")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Resilience layer for remote AI completion services: rate limiting, health monitoring, fallback"
)]
#[command(long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show the current service status snapshot
    Status {
        /// Configuration file path
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,
    },
    /// Probe the remote service once and report the result
    Probe {
        /// Configuration file path
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,
    },
    /// Submit a single request and print the response
    Send {
        /// The prompt to send
        prompt: String,
        /// Task kind (code, review, docs, regex, optimize, debug, architecture,
        /// explain, or a custom label)
        #[arg(short = 'k', long = "kind", default_value = "code")]
        kind: String,
        /// Priority (critical, high, normal, low, background)
        #[arg(short = 'p', long = "priority", default_value = "normal")]
        priority: String,
        /// Configuration file path
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,
    },
    /// Create a default configuration file in the user's home directory
    InitConfig,
    /// Show configuration discovery information
    ShowConfig,
}

impl Args {
    pub fn parse() -> Self {
        Parser::parse()
    }
}
