//! CLI module for subloop - command-line interface and subcommands.
//!
//! Provides operator commands that inspect and maintain a substrate
//! without running the cycle loop.

pub mod commands;

pub use commands::{Cli, Commands};
