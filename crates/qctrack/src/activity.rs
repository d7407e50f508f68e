//! Audit trail entries.
//!
//! Every state change made through the web UI or the CLI appends one
//! [`ActivityEntry`]. Entries are never edited; old ones are pruned by age.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Kind of action recorded in the activity log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    /// Successful login.
    Login,
    /// Rejected login attempt.
    LoginFailed,
    /// Explicit logout.
    Logout,
    /// New equipment registered.
    EquipmentRegistered,
    /// Existing equipment flagged for another test.
    EquipmentRetest,
    /// QC run recorded.
    TestRecorded,
    /// Equipment and its history deleted.
    EquipmentDeleted,
    /// Account created.
    UserCreated,
    /// Account deleted.
    UserDeleted,
    /// Password changed by an admin.
    PasswordReset,
    /// PDF or HTML report downloaded.
    ReportExported,
    /// Schema created or upgraded.
    DatabaseInitialized,
}

impl ActivityAction {
    /// Stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::LoginFailed => "login_failed",
            Self::Logout => "logout",
            Self::EquipmentRegistered => "equipment_registered",
            Self::EquipmentRetest => "equipment_retest",
            Self::TestRecorded => "test_recorded",
            Self::EquipmentDeleted => "equipment_deleted",
            Self::UserCreated => "user_created",
            Self::UserDeleted => "user_deleted",
            Self::PasswordReset => "password_reset",
            Self::ReportExported => "report_exported",
            Self::DatabaseInitialized => "database_initialized",
        }
    }

    /// Whether the action is administrative (shown highlighted in the log).
    #[must_use]
    pub const fn is_administrative(self) -> bool {
        matches!(
            self,
            Self::UserCreated
                | Self::UserDeleted
                | Self::PasswordReset
                | Self::EquipmentDeleted
                | Self::DatabaseInitialized
        )
    }
}

impl fmt::Display for ActivityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let action = match s {
            "login" => Self::Login,
            "login_failed" => Self::LoginFailed,
            "logout" => Self::Logout,
            "equipment_registered" => Self::EquipmentRegistered,
            "equipment_retest" => Self::EquipmentRetest,
            "test_recorded" => Self::TestRecorded,
            "equipment_deleted" => Self::EquipmentDeleted,
            "user_created" => Self::UserCreated,
            "user_deleted" => Self::UserDeleted,
            "password_reset" => Self::PasswordReset,
            "report_exported" => Self::ReportExported,
            "database_initialized" => Self::DatabaseInitialized,
            other => return Err(Error::validation(format!("unknown activity: {other}"))),
        };
        Ok(action)
    }
}

/// One row of the activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityEntry {
    /// Database identifier.
    pub id: i64,
    /// When the action happened.
    pub occurred_at: DateTime<Utc>,
    /// Username that performed the action; `None` for CLI/system actions.
    pub actor: Option<String>,
    /// What happened.
    pub action: ActivityAction,
    /// Free-form context, e.g. the serial involved.
    pub details: String,
}
