//! Storage layer for qctrack.
//!
//! This module provides `SQLite`-based persistent storage for users,
//! equipment, QC test records, login sessions and the activity log.

pub mod migrations;
pub mod schema;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Offset, SecondsFormat, TimeDelta, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info};

use crate::activity::{ActivityAction, ActivityEntry};
use crate::equipment::{
    normalize_serial, Equipment, EquipmentStatus, NewEquipment, NewTest, TestRecord,
};
use crate::error::{Error, Result};
use crate::search::SearchFilter;
use crate::user::{Role, User};

/// Columns selected for every equipment query, including the derived test count.
const EQUIPMENT_COLUMNS: &str = r"
    e.id, e.equipment_type, e.model, e.serial, e.status, e.registered_at,
    (SELECT COUNT(*) FROM tests t WHERE t.equipment_id = e.id)
";

const TEST_COLUMNS: &str = r"
    id, equipment_id, tested_at, outcome, speed_mbps, signal_dbm, observations, tested_by
";

const USER_COLUMNS: &str = "id, username, password_hash, role, created_at";

/// Storage engine for the QC tracker.
///
/// Wraps a single `SQLite` connection. Callers that share it across threads
/// put it behind a mutex.
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

/// Outcome of registering a serial.
#[derive(Debug, Clone, PartialEq)]
pub enum Registration {
    /// A new equipment row was inserted.
    Created(Equipment),
    /// The serial already existed and was flagged for another test.
    Retest(Equipment),
}

impl Registration {
    /// The registered equipment.
    #[must_use]
    pub fn equipment(&self) -> &Equipment {
        match self {
            Self::Created(equipment) | Self::Retest(equipment) => equipment,
        }
    }

    /// Whether an existing serial was re-registered.
    #[must_use]
    pub fn is_retest(&self) -> bool {
        matches!(self, Self::Retest(_))
    }
}

/// Severity of a one-shot message shown on the next page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashLevel {
    /// The action worked.
    Success,
    /// The action was skipped or partially applied.
    Warning,
    /// The action failed.
    Danger,
}

impl FlashLevel {
    /// Stored representation, also used as the CSS class suffix.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Danger => "danger",
        }
    }
}

impl fmt::Display for FlashLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlashLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "success" => Ok(Self::Success),
            "warning" => Ok(Self::Warning),
            "danger" => Ok(Self::Danger),
            other => Err(Error::validation(format!("unknown flash level: {other}"))),
        }
    }
}

/// A one-shot message attached to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Flash {
    /// Severity.
    pub level: FlashLevel,
    /// Text shown to the user.
    pub message: String,
}

impl Flash {
    /// A success message.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Success,
            message: message.into(),
        }
    }

    /// A warning message.
    #[must_use]
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Warning,
            message: message.into(),
        }
    }

    /// An error message.
    #[must_use]
    pub fn danger(message: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Danger,
            message: message.into(),
        }
    }
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    /// Initializes the schema if this is a new database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        // WAL lets the report exports read while a test is being recorded
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )?;

        migrations::initialize_schema(&conn)?;

        info!("Database opened successfully at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Set how long a write waits on a locked database before failing.
    ///
    /// # Errors
    ///
    /// Returns an error if `SQLite` rejects the setting.
    pub fn with_busy_timeout(self, timeout: Duration) -> Result<Self> {
        self.conn.busy_timeout(timeout)?;
        Ok(self)
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Schema version recorded in the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata table cannot be read.
    pub fn schema_version(&self) -> Result<i32> {
        migrations::schema_version(&self.conn)
    }

    // === Users ===

    /// Create a user account.
    ///
    /// # Errors
    ///
    /// Returns `Error::Conflict` if the username is taken, or an error if the
    /// database operation fails.
    pub fn create_user(&self, username: &str, password_hash: &str, role: Role) -> Result<User> {
        if self.get_user_by_username(username)?.is_some() {
            return Err(Error::conflict(format!("username {username:?} already exists")));
        }

        let created_at = Utc::now();
        let id = self.insert_user(username, password_hash, role, created_at)?;
        info!("Created {} account {} (id {})", role, username, id);
        Ok(User {
            id,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            role,
            created_at,
        })
    }

    /// Insert a user row. Another process may take the username between
    /// the lookup in [`Self::create_user`] and this insert; the UNIQUE
    /// constraint then reports the same conflict.
    fn insert_user(
        &self,
        username: &str,
        password_hash: &str,
        role: Role,
        created_at: DateTime<Utc>,
    ) -> Result<i64> {
        let inserted = self.conn.execute(
            "INSERT INTO users (username, password_hash, role, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![username, password_hash, role.as_str(), encode_time(created_at)],
        );
        match inserted {
            Ok(_) => Ok(self.conn.last_insert_rowid()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(Error::conflict(format!("username {username:?} already exists")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Get a user by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                [id],
                Self::row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Get a user by username (exact match).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                [username],
                Self::row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// List all users ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))?;
        let users = stmt
            .query_map([], Self::row_to_user)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(users)
    }

    /// Delete a user and their sessions.
    ///
    /// Returns `true` if a user was deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn delete_user(&self, id: i64) -> Result<bool> {
        let affected = self.conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
        if affected > 0 {
            info!("Deleted user {}", id);
        }
        Ok(affected > 0)
    }

    /// Replace a user's password hash and end their sessions.
    ///
    /// Returns `true` if the user exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn set_password_hash(&self, id: i64, password_hash: &str) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let affected = tx.execute(
            "UPDATE users SET password_hash = ?1 WHERE id = ?2",
            params![password_hash, id],
        )?;
        tx.execute("DELETE FROM sessions WHERE user_id = ?1", [id])?;
        tx.commit()?;
        Ok(affected > 0)
    }

    /// Count admin accounts.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_admins(&self) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM users WHERE role = ?1",
            [Role::Admin.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // === Equipment ===

    /// Register a serial, or flag an existing one for another test.
    ///
    /// An existing serial keeps its id, registration time and test history;
    /// its type and model are updated and its status goes back to
    /// awaiting test.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn register_equipment(&self, new: &NewEquipment) -> Result<Registration> {
        let tx = self.conn.unchecked_transaction()?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM equipment WHERE serial = ?1",
                [&new.serial],
                |row| row.get(0),
            )
            .optional()?;

        let (id, retest) = if let Some(id) = existing {
            tx.execute(
                "UPDATE equipment SET equipment_type = ?1, model = ?2, status = ?3 WHERE id = ?4",
                params![
                    new.equipment_type,
                    new.model,
                    EquipmentStatus::AwaitingTest.as_str(),
                    id
                ],
            )?;
            (id, true)
        } else {
            tx.execute(
                r"
                INSERT INTO equipment (equipment_type, model, serial, status, registered_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ",
                params![
                    new.equipment_type,
                    new.model,
                    new.serial,
                    EquipmentStatus::AwaitingTest.as_str(),
                    encode_time(Utc::now()),
                ],
            )?;
            (tx.last_insert_rowid(), false)
        };
        tx.commit()?;

        let equipment = self
            .get_equipment(id)?
            .ok_or_else(|| Error::internal(format!("equipment {id} vanished after write")))?;

        if retest {
            info!("Flagged {} for re-test", equipment.serial);
            Ok(Registration::Retest(equipment))
        } else {
            info!("Registered {} (id {})", equipment.serial, id);
            Ok(Registration::Created(equipment))
        }
    }

    /// Get equipment by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_equipment(&self, id: i64) -> Result<Option<Equipment>> {
        let equipment = self
            .conn
            .query_row(
                &format!("SELECT {EQUIPMENT_COLUMNS} FROM equipment e WHERE e.id = ?1"),
                [id],
                Self::row_to_equipment,
            )
            .optional()?;
        Ok(equipment)
    }

    /// Get equipment by serial. The serial is normalized before lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_equipment_by_serial(&self, serial: &str) -> Result<Option<Equipment>> {
        let equipment = self
            .conn
            .query_row(
                &format!("SELECT {EQUIPMENT_COLUMNS} FROM equipment e WHERE e.serial = ?1"),
                [normalize_serial(serial)],
                Self::row_to_equipment,
            )
            .optional()?;
        Ok(equipment)
    }

    /// List all equipment, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_equipment(&self) -> Result<Vec<Equipment>> {
        self.search_equipment(&SearchFilter::default())
    }

    /// Delete equipment together with its test history.
    ///
    /// Returns `true` if the equipment existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn delete_equipment(&self, id: i64) -> Result<bool> {
        let affected = self.conn.execute("DELETE FROM equipment WHERE id = ?1", [id])?;
        if affected > 0 {
            info!("Deleted equipment {} and its tests", id);
        }
        Ok(affected > 0)
    }

    /// Find equipment matching a filter, newest first.
    ///
    /// Date windows match equipment with at least one test inside the
    /// window; `offset` is the local time zone the window is expressed in.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn search_equipment_at(
        &self,
        filter: &SearchFilter,
        offset: FixedOffset,
    ) -> Result<Vec<Equipment>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(query) = &filter.query {
            clauses.push(
                r"(e.serial LIKE ? ESCAPE '\' OR e.model LIKE ? ESCAPE '\' OR e.equipment_type LIKE ? ESCAPE '\')",
            );
            let pattern = format!("%{}%", escape_like(query));
            for _ in 0..3 {
                values.push(Value::Text(pattern.clone()));
            }
        }

        if let Some(status) = filter.status {
            clauses.push("e.status = ?");
            values.push(Value::Text(status.as_str().to_string()));
        }

        if let Some((start, end)) = filter.window.and_then(|w| w.utc_range(offset)) {
            clauses.push(
                "EXISTS (SELECT 1 FROM tests t WHERE t.equipment_id = e.id AND t.tested_at >= ? AND t.tested_at < ?)",
            );
            values.push(Value::Text(encode_time(start)));
            values.push(Value::Text(encode_time(end)));
        }

        let mut sql = format!("SELECT {EQUIPMENT_COLUMNS} FROM equipment e");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY e.id DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let equipment = stmt
            .query_map(params_from_iter(values), Self::row_to_equipment)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        debug!("Search matched {} equipment", equipment.len());
        Ok(equipment)
    }

    /// Find equipment matching a filter, with date windows in UTC.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn search_equipment(&self, filter: &SearchFilter) -> Result<Vec<Equipment>> {
        self.search_equipment_at(filter, Utc.fix())
    }

    // === Tests ===

    /// Record a QC run now.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` for an unknown equipment id, or an error if
    /// the database operation fails.
    pub fn record_test(
        &self,
        equipment_id: i64,
        test: &NewTest,
        tested_by: Option<&str>,
    ) -> Result<TestRecord> {
        self.record_test_at(equipment_id, test, tested_by, Utc::now())
    }

    /// Record a QC run at a given time and update the equipment status.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` for an unknown equipment id, or an error if
    /// the database operation fails.
    pub fn record_test_at(
        &self,
        equipment_id: i64,
        test: &NewTest,
        tested_by: Option<&str>,
        tested_at: DateTime<Utc>,
    ) -> Result<TestRecord> {
        let tx = self.conn.unchecked_transaction()?;

        let status = EquipmentStatus::from(test.outcome);
        let updated = tx.execute(
            "UPDATE equipment SET status = ?1 WHERE id = ?2",
            params![status.as_str(), equipment_id],
        )?;
        if updated == 0 {
            return Err(Error::not_found(format!("equipment {equipment_id}")));
        }

        tx.execute(
            r"
            INSERT INTO tests (equipment_id, tested_at, outcome, speed_mbps, signal_dbm, observations, tested_by)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
            params![
                equipment_id,
                encode_time(tested_at),
                test.outcome.as_str(),
                test.speed_mbps,
                test.signal_dbm,
                test.observations,
                tested_by,
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        debug!("Recorded test {} for equipment {}", id, equipment_id);
        Ok(TestRecord {
            id,
            equipment_id,
            tested_at,
            outcome: test.outcome,
            speed_mbps: test.speed_mbps,
            signal_dbm: test.signal_dbm,
            observations: test.observations.clone(),
            tested_by: tested_by.map(str::to_string),
        })
    }

    /// Get all tests for an equipment, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn tests_for(&self, equipment_id: i64) -> Result<Vec<TestRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TEST_COLUMNS} FROM tests WHERE equipment_id = ?1 ORDER BY tested_at ASC, id ASC"
        ))?;
        let tests = stmt
            .query_map([equipment_id], Self::row_to_test)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tests)
    }

    // === Sessions ===

    /// Store a new login session.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn create_session(
        &self,
        user_id: i64,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sessions (token_hash, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![token_hash, user_id, encode_time(Utc::now()), encode_time(expires_at)],
        )?;
        Ok(())
    }

    /// Resolve a session to its user, ignoring expired sessions.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn session_user(&self, token_hash: &str, now: DateTime<Utc>) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                r"
                SELECT u.id, u.username, u.password_hash, u.role, u.created_at
                FROM sessions s JOIN users u ON u.id = s.user_id
                WHERE s.token_hash = ?1 AND s.expires_at > ?2
                ",
                params![token_hash, encode_time(now)],
                Self::row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Delete a session. Returns `true` if it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn delete_session(&self, token_hash: &str) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM sessions WHERE token_hash = ?1", [token_hash])?;
        Ok(affected > 0)
    }

    /// Delete sessions that expired before `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn prune_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize> {
        let affected = self.conn.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            [encode_time(now)],
        )?;
        if affected > 0 {
            info!("Pruned {} expired sessions", affected);
        }
        Ok(affected)
    }

    /// Attach a flash message to a session, replacing any pending one.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn set_flash(&self, token_hash: &str, flash: &Flash) -> Result<()> {
        self.conn.execute(
            "UPDATE sessions SET flash_level = ?1, flash_message = ?2 WHERE token_hash = ?3",
            params![flash.level.as_str(), flash.message, token_hash],
        )?;
        Ok(())
    }

    /// Remove and return the pending flash message of a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn take_flash(&self, token_hash: &str) -> Result<Option<Flash>> {
        let tx = self.conn.unchecked_transaction()?;
        let pending: Option<(Option<String>, Option<String>)> = tx
            .query_row(
                "SELECT flash_level, flash_message FROM sessions WHERE token_hash = ?1",
                [token_hash],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let flash = match pending {
            Some((Some(level), Some(message))) => {
                tx.execute(
                    "UPDATE sessions SET flash_level = NULL, flash_message = NULL WHERE token_hash = ?1",
                    [token_hash],
                )?;
                Some(Flash {
                    level: level.parse().unwrap_or(FlashLevel::Warning),
                    message,
                })
            }
            _ => None,
        };
        tx.commit()?;
        Ok(flash)
    }

    // === Activity ===

    /// Append an entry to the activity log.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn log_activity(
        &self,
        actor: Option<&str>,
        action: ActivityAction,
        details: &str,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO activity_log (occurred_at, actor, action, details) VALUES (?1, ?2, ?3, ?4)",
            params![encode_time(Utc::now()), actor, action.as_str(), details],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Get the most recent activity entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityEntry>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT id, occurred_at, actor, action, details
            FROM activity_log ORDER BY occurred_at DESC, id DESC LIMIT ?1
            ",
        )?;

        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let entries = stmt
            .query_map([limit_i64], Self::row_to_activity)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Prune activity entries older than the specified duration.
    ///
    /// Returns the number of entries deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn prune_activity_older_than(&self, max_age: TimeDelta) -> Result<usize> {
        let cutoff = Utc::now() - max_age;
        let affected = self.conn.execute(
            "DELETE FROM activity_log WHERE occurred_at < ?1",
            [encode_time(cutoff)],
        )?;

        if affected > 0 {
            info!("Pruned {} old activity entries", affected);
        }
        Ok(affected)
    }

    // === Statistics ===

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let count = |sql: &str| -> Result<i64> {
            Ok(self.conn.query_row(sql, [], |row| row.get(0))?)
        };

        let latest: Option<String> = self
            .conn
            .query_row("SELECT MAX(tested_at) FROM tests", [], |row| row.get(0))?;
        let latest_test = latest
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            users: count("SELECT COUNT(*) FROM users")?,
            equipment: count("SELECT COUNT(*) FROM equipment")?,
            tests: count("SELECT COUNT(*) FROM tests")?,
            awaiting_test: self.conn.query_row(
                "SELECT COUNT(*) FROM equipment WHERE status = ?1",
                [EquipmentStatus::AwaitingTest.as_str()],
                |row| row.get(0),
            )?,
            latest_test,
            db_size_bytes,
        })
    }

    // === Row mapping ===

    fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
        let role: String = row.get(3)?;
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            password_hash: row.get(2)?,
            role: Role::from_stored(&role),
            created_at: decode_time(4, &row.get::<_, String>(4)?)?,
        })
    }

    fn row_to_equipment(row: &rusqlite::Row) -> rusqlite::Result<Equipment> {
        Ok(Equipment {
            id: row.get(0)?,
            equipment_type: row.get(1)?,
            model: row.get(2)?,
            serial: row.get(3)?,
            status: parse_column(4, &row.get::<_, String>(4)?)?,
            registered_at: decode_time(5, &row.get::<_, String>(5)?)?,
            test_count: row.get(6)?,
        })
    }

    fn row_to_test(row: &rusqlite::Row) -> rusqlite::Result<TestRecord> {
        Ok(TestRecord {
            id: row.get(0)?,
            equipment_id: row.get(1)?,
            tested_at: decode_time(2, &row.get::<_, String>(2)?)?,
            outcome: parse_column(3, &row.get::<_, String>(3)?)?,
            speed_mbps: row.get(4)?,
            signal_dbm: row.get(5)?,
            observations: row.get(6)?,
            tested_by: row.get(7)?,
        })
    }

    fn row_to_activity(row: &rusqlite::Row) -> rusqlite::Result<ActivityEntry> {
        Ok(ActivityEntry {
            id: row.get(0)?,
            occurred_at: decode_time(1, &row.get::<_, String>(1)?)?,
            actor: row.get(2)?,
            action: parse_column(3, &row.get::<_, String>(3)?)?,
            details: row.get(4)?,
        })
    }
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    /// Number of user accounts.
    pub users: i64,
    /// Number of registered equipment.
    pub equipment: i64,
    /// Number of recorded QC runs.
    pub tests: i64,
    /// Equipment currently waiting for a test.
    pub awaiting_test: i64,
    /// Time of the most recent QC run.
    pub latest_test: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

/// Fixed-width UTC timestamps so text comparison matches time order.
fn encode_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_time(column: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}

fn parse_column<T>(column: usize, raw: &str) -> rusqlite::Result<T>
where
    T: FromStr<Err = Error>,
{
    raw.parse().map_err(|e: Error| {
        rusqlite::Error::FromSqlConversionFailure(column, Type::Text, e.to_string().into())
    })
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
