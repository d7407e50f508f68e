//! Command-line interface for qctrack.
//!
//! This module provides the CLI structure for the `qctrack` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ConfigCommand, CreateAdminCommand, ExportCommand, ServeCommand, StatusCommand, UserCommand,
};

/// qctrack - Equipment quality-control test tracker
///
/// Registers network equipment (ONUs, routers), records QC test results and
/// produces searchable histories and PDF reports through a small web app.
#[derive(Debug, Parser)]
#[command(name = "qctrack")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the web application
    Serve(ServeCommand),

    /// Create or upgrade the database schema
    InitDb,

    /// Create the initial administrator if it does not exist
    CreateAdmin(CreateAdminCommand),

    /// Manage user accounts
    #[command(subcommand)]
    User(UserCommand),

    /// Export a report to a PDF or HTML file
    #[command(subcommand)]
    Export(ExportCommand),

    /// Show database status
    Status(StatusCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
