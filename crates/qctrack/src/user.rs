//! User accounts and password handling.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

/// Username of the account created by `create-admin` and server bootstrap.
pub const DEFAULT_ADMIN_USERNAME: &str = "admin";

/// Initial password of the bootstrap admin account.
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin";

/// Maximum username length.
pub const MAX_USERNAME_LEN: usize = 80;

/// Permission level of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Can manage users and read the activity log.
    Admin,
    /// Can register equipment and record tests.
    #[default]
    User,
}

impl Role {
    /// Stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }

    /// Decode a stored role, treating unknown values as the least privileged.
    #[must_use]
    pub fn from_stored(value: &str) -> Self {
        value.parse().unwrap_or_else(|_| {
            warn!("Unknown role {:?}, treating as user", value);
            Self::User
        })
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "admin" => Ok(Self::Admin),
            "user" | "" => Ok(Self::User),
            other => Err(Error::validation(format!("unknown role: {other}"))),
        }
    }
}

/// A user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    /// Database identifier.
    pub id: i64,
    /// Unique login name.
    pub username: String,
    /// bcrypt hash of the password.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Permission level.
    pub role: Role,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Whether this account has admin rights.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Check a candidate password against the stored hash.
    ///
    /// A corrupt stored hash never matches.
    #[must_use]
    pub fn verify_password(&self, password: &str) -> bool {
        match bcrypt::verify(password, &self.password_hash) {
            Ok(matches) => matches,
            Err(e) => {
                warn!("Stored password hash for {} is unreadable: {}", self.username, e);
                false
            }
        }
    }
}

/// Hash a password with bcrypt.
///
/// # Errors
///
/// Returns a validation error for an empty password, or a hashing error if
/// bcrypt rejects the cost.
pub fn hash_password(password: &str, cost: u32) -> Result<String> {
    if password.is_empty() {
        return Err(Error::validation("password cannot be empty"));
    }
    Ok(bcrypt::hash(password, cost)?)
}

/// Validate a username from form or CLI input, returning the trimmed name.
///
/// # Errors
///
/// Returns a validation error if the name is blank, too long or contains
/// whitespace.
pub fn validate_username(raw: &str) -> Result<String> {
    let username = raw.trim();
    if username.is_empty() {
        return Err(Error::validation("username is required"));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(Error::validation(format!(
            "username must be at most {MAX_USERNAME_LEN} characters"
        )));
    }
    if username.chars().any(char::is_whitespace) {
        return Err(Error::validation("username cannot contain spaces"));
    }
    Ok(username.to_string())
}
