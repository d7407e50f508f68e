//! `SQLite` schema definitions for qctrack.
//!
//! Timestamps are stored as RFC 3339 UTC text, which sorts and compares
//! correctly as plain strings.

/// SQL statement to create the users table.
pub const CREATE_USERS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'user',
    created_at TEXT NOT NULL
)
";

/// SQL statement to create the equipment table.
pub const CREATE_EQUIPMENT_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS equipment (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    equipment_type TEXT NOT NULL,
    model TEXT NOT NULL,
    serial TEXT NOT NULL UNIQUE,
    status TEXT NOT NULL DEFAULT 'awaiting_test',
    registered_at TEXT NOT NULL
)
";

/// SQL statement to create the tests table.
///
/// Test records belong to exactly one equipment and go away with it.
pub const CREATE_TESTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS tests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    equipment_id INTEGER NOT NULL REFERENCES equipment(id) ON DELETE CASCADE,
    tested_at TEXT NOT NULL,
    outcome TEXT NOT NULL,
    speed_mbps REAL,
    signal_dbm REAL,
    observations TEXT,
    tested_by TEXT
)
";

/// SQL statement to index tests by equipment and time.
pub const CREATE_TESTS_EQUIPMENT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_tests_equipment ON tests(equipment_id, tested_at)
";

/// SQL statement to index tests by time for day/month filters.
pub const CREATE_TESTS_TIME_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_tests_tested_at ON tests(tested_at)
";

/// SQL statement to index equipment by status for the index tabs.
pub const CREATE_EQUIPMENT_STATUS_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_equipment_status ON equipment(status)
";

/// SQL statement to create the sessions table.
///
/// Only a hash of the cookie token is stored.
pub const CREATE_SESSIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS sessions (
    token_hash TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    flash_level TEXT,
    flash_message TEXT
)
";

/// SQL statement to create the activity log table.
pub const CREATE_ACTIVITY_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS activity_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    occurred_at TEXT NOT NULL,
    actor TEXT,
    action TEXT NOT NULL,
    details TEXT NOT NULL DEFAULT ''
)
";

/// SQL statement to index the activity log by time.
pub const CREATE_ACTIVITY_TIME_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_activity_occurred_at ON activity_log(occurred_at DESC)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_USERS_TABLE,
    CREATE_EQUIPMENT_TABLE,
    CREATE_TESTS_TABLE,
    CREATE_TESTS_EQUIPMENT_INDEX,
    CREATE_TESTS_TIME_INDEX,
    CREATE_EQUIPMENT_STATUS_INDEX,
    CREATE_SESSIONS_TABLE,
    CREATE_ACTIVITY_TABLE,
    CREATE_ACTIVITY_TIME_INDEX,
    CREATE_METADATA_TABLE,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_not_empty() {
        assert!(!SCHEMA_STATEMENTS.is_empty());
        for stmt in SCHEMA_STATEMENTS {
            assert!(!stmt.trim().is_empty());
        }
    }

    #[test]
    fn test_tests_cascade_with_equipment() {
        assert!(CREATE_TESTS_TABLE.contains("REFERENCES equipment(id) ON DELETE CASCADE"));
    }

    #[test]
    fn test_unique_keys() {
        assert!(CREATE_USERS_TABLE.contains("username TEXT NOT NULL UNIQUE"));
        assert!(CREATE_EQUIPMENT_TABLE.contains("serial TEXT NOT NULL UNIQUE"));
    }

    #[test]
    fn test_statements_are_valid_sql() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        for stmt in SCHEMA_STATEMENTS {
            conn.execute(stmt, []).unwrap();
        }
    }
}
