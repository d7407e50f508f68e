//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};

use crate::search::SearchParams;
use crate::user::{DEFAULT_ADMIN_PASSWORD, DEFAULT_ADMIN_USERNAME};

/// Serve command arguments.
#[derive(Debug, Args)]
pub struct ServeCommand {
    /// Address to bind (overrides `server.host`)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind, 0 for any free port (overrides `server.port`)
    #[arg(short, long)]
    pub port: Option<u16>,
}

/// Create-admin command arguments.
#[derive(Debug, Args)]
pub struct CreateAdminCommand {
    /// Username of the administrator
    #[arg(short, long, default_value = DEFAULT_ADMIN_USERNAME)]
    pub username: String,

    /// Initial password
    #[arg(short, long, default_value = DEFAULT_ADMIN_PASSWORD)]
    pub password: String,
}

/// User management commands.
#[derive(Debug, Subcommand)]
pub enum UserCommand {
    /// List all accounts
    List,

    /// Create an account
    Add {
        /// Username
        username: String,

        /// Password
        #[arg(short, long)]
        password: String,

        /// Grant the admin role
        #[arg(long)]
        admin: bool,
    },

    /// Delete an account (administrators cannot be deleted)
    Delete {
        /// Username
        username: String,
    },

    /// Set a new password and end the user's sessions
    ResetPassword {
        /// Username
        username: String,

        /// New password
        #[arg(short, long)]
        password: String,
    },
}

/// Report export commands.
///
/// The output format follows the file extension: `.pdf` or `.html`.
#[derive(Debug, Subcommand)]
pub enum ExportCommand {
    /// Export equipment matching a search
    Search {
        /// Text matched against serial, model and type
        #[arg(long, default_value = "")]
        query: String,

        /// Status: awaiting_test, passed or failed
        #[arg(short, long, default_value = "")]
        status: String,

        /// Only equipment tested on this day (YYYY-MM-DD)
        #[arg(long, default_value = "")]
        day: String,

        /// Only equipment tested in this month (YYYY-MM)
        #[arg(long, default_value = "")]
        month: String,

        /// Output file
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },

    /// Export the test history of one device
    History {
        /// Serial number or MAC address
        serial: String,

        /// Output file
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },
}

impl ExportCommand {
    /// Output file of the export.
    #[must_use]
    pub fn output(&self) -> &Path {
        match self {
            Self::Search { output, .. } | Self::History { output, .. } => output,
        }
    }

    /// Search parameters, for a search export.
    #[must_use]
    pub fn search_params(&self) -> Option<SearchParams> {
        match self {
            Self::Search {
                query,
                status,
                day,
                month,
                ..
            } => Some(SearchParams {
                q: query.clone(),
                status: status.clone(),
                day: day.clone(),
                month: month.clone(),
            }),
            Self::History { .. } => None,
        }
    }
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_search_params() {
        let cmd = ExportCommand::Search {
            query: "hg8245".to_string(),
            status: "passed".to_string(),
            day: String::new(),
            month: "2026-03".to_string(),
            output: PathBuf::from("out.pdf"),
        };
        let params = cmd.search_params().unwrap();
        assert_eq!(params.q, "hg8245");
        assert_eq!(params.status, "passed");
        assert_eq!(params.month, "2026-03");
        assert_eq!(cmd.output(), Path::new("out.pdf"));
    }

    #[test]
    fn test_export_history_has_no_search_params() {
        let cmd = ExportCommand::History {
            serial: "AA:BB:CC:DD:EE:FF".to_string(),
            output: PathBuf::from("history.html"),
        };
        assert!(cmd.search_params().is_none());
        assert_eq!(cmd.output(), Path::new("history.html"));
    }

    #[test]
    fn test_status_command_debug() {
        let cmd = StatusCommand { json: true };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("json"));
    }

    #[test]
    fn test_config_command_debug() {
        let cmd = ConfigCommand::Show { json: false };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Show"));
    }
}
