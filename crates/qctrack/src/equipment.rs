//! Equipment and test-record types for qctrack.
//!
//! An [`Equipment`] is one physical device identified by its serial (usually a
//! MAC address). Each QC run against it is an append-only [`TestRecord`]; the
//! outcome of the most recent run becomes the equipment's current status.

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Maximum length of the type, model and serial fields.
pub const MAX_FIELD_LEN: usize = 100;

/// Maximum length of free-text test observations.
pub const MAX_OBSERVATIONS_LEN: usize = 300;

/// Accepted signal strength range in dBm.
pub const SIGNAL_DBM_RANGE: RangeInclusive<f64> = -100.0..=20.0;

/// Twelve hex digits, optionally grouped by `:`, `-` or `.` separators.
static MAC_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)(?:[0-9a-f]{2}[:\-.]?){5}[0-9a-f]{2}$|^(?i)(?:[0-9a-f]{4}\.){2}[0-9a-f]{4}$")
        .expect("MAC pattern is valid")
});

/// Current QC status of a piece of equipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentStatus {
    /// Registered (or flagged for re-test) and waiting for a QC run.
    AwaitingTest,
    /// Last QC run passed.
    Passed,
    /// Last QC run failed.
    Failed,
}

impl EquipmentStatus {
    /// All statuses, in display order.
    pub const ALL: [Self; 3] = [Self::AwaitingTest, Self::Passed, Self::Failed];

    /// Stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AwaitingTest => "awaiting_test",
            Self::Passed => "passed",
            Self::Failed => "failed",
        }
    }

    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::AwaitingTest => "Awaiting test",
            Self::Passed => "Passed",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for EquipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EquipmentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "awaiting_test" => Ok(Self::AwaitingTest),
            "passed" => Ok(Self::Passed),
            "failed" => Ok(Self::Failed),
            other => Err(Error::validation(format!("unknown status: {other}"))),
        }
    }
}

impl From<TestOutcome> for EquipmentStatus {
    fn from(outcome: TestOutcome) -> Self {
        match outcome {
            TestOutcome::Pass => Self::Passed,
            TestOutcome::Fail => Self::Failed,
        }
    }
}

/// Result of a single QC run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestOutcome {
    /// The device met the QC criteria.
    Pass,
    /// The device did not meet the QC criteria.
    Fail,
}

impl TestOutcome {
    /// Stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
        }
    }

    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pass => "Pass",
            Self::Fail => "Fail",
        }
    }
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestOutcome {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pass" | "passed" => Ok(Self::Pass),
            "fail" | "failed" => Ok(Self::Fail),
            "" => Err(Error::validation("test result is required")),
            other => Err(Error::validation(format!("unknown test result: {other}"))),
        }
    }
}

/// A registered piece of equipment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equipment {
    /// Database identifier.
    pub id: i64,
    /// Device family, e.g. "ONU" or "Router".
    pub equipment_type: String,
    /// Vendor model.
    pub model: String,
    /// Normalized serial or MAC address.
    pub serial: String,
    /// Current QC status.
    pub status: EquipmentStatus,
    /// When the device was first registered.
    pub registered_at: DateTime<Utc>,
    /// Number of test records on file.
    pub test_count: i64,
}

impl Equipment {
    /// Whether at least one QC run has been recorded.
    #[must_use]
    pub fn has_been_tested(&self) -> bool {
        self.test_count > 0
    }

    /// Whether the device is waiting for a (re-)test.
    #[must_use]
    pub fn is_awaiting_test(&self) -> bool {
        self.status == EquipmentStatus::AwaitingTest
    }
}

/// A single QC run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRecord {
    /// Database identifier.
    pub id: i64,
    /// Equipment this run belongs to.
    pub equipment_id: i64,
    /// When the run was recorded.
    pub tested_at: DateTime<Utc>,
    /// Pass or fail.
    pub outcome: TestOutcome,
    /// Measured throughput in Mbps.
    pub speed_mbps: Option<f64>,
    /// Measured optical/radio signal in dBm.
    pub signal_dbm: Option<f64>,
    /// Free-text notes.
    pub observations: Option<String>,
    /// Username of the technician who recorded the run.
    pub tested_by: Option<String>,
}

/// Validated input for registering equipment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEquipment {
    /// Device family.
    pub equipment_type: String,
    /// Vendor model.
    pub model: String,
    /// Normalized serial.
    pub serial: String,
}

impl NewEquipment {
    /// Validate and normalize raw form input.
    ///
    /// # Errors
    ///
    /// Returns a validation error if any field is blank or too long.
    pub fn new(equipment_type: &str, model: &str, serial: &str) -> Result<Self> {
        let equipment_type = equipment_type.trim();
        let model = model.trim();
        let serial = normalize_serial(serial);

        if equipment_type.is_empty() || model.is_empty() || serial.is_empty() {
            return Err(Error::validation(
                "type, model and serial are all required",
            ));
        }
        for (name, value) in [
            ("type", equipment_type),
            ("model", model),
            ("serial", serial.as_str()),
        ] {
            if value.chars().count() > MAX_FIELD_LEN {
                return Err(Error::validation(format!(
                    "{name} must be at most {MAX_FIELD_LEN} characters"
                )));
            }
        }

        Ok(Self {
            equipment_type: equipment_type.to_string(),
            model: model.to_string(),
            serial,
        })
    }
}

/// Validated input for recording a QC run.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTest {
    /// Pass or fail.
    pub outcome: TestOutcome,
    /// Measured throughput in Mbps.
    pub speed_mbps: Option<f64>,
    /// Measured signal in dBm.
    pub signal_dbm: Option<f64>,
    /// Free-text notes.
    pub observations: Option<String>,
}

impl NewTest {
    /// Parse raw form fields.
    ///
    /// Blank measurement fields are treated as "not measured". A comma is
    /// accepted as the decimal separator.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a missing outcome, non-numeric or
    /// out-of-range measurements, or overlong observations.
    pub fn parse(outcome: &str, speed: &str, signal: &str, observations: &str) -> Result<Self> {
        let outcome: TestOutcome = outcome.parse()?;

        let speed_mbps = parse_measurement("speed", speed)?;
        if let Some(speed) = speed_mbps {
            if speed < 0.0 {
                return Err(Error::validation("speed cannot be negative"));
            }
        }

        let signal_dbm = parse_measurement("signal", signal)?;
        if let Some(signal) = signal_dbm {
            if !SIGNAL_DBM_RANGE.contains(&signal) {
                return Err(Error::validation(format!(
                    "signal must be between {} and {} dBm",
                    SIGNAL_DBM_RANGE.start(),
                    SIGNAL_DBM_RANGE.end()
                )));
            }
        }

        let observations = observations.trim();
        if observations.chars().count() > MAX_OBSERVATIONS_LEN {
            return Err(Error::validation(format!(
                "observations must be at most {MAX_OBSERVATIONS_LEN} characters"
            )));
        }

        Ok(Self {
            outcome,
            speed_mbps,
            signal_dbm,
            observations: (!observations.is_empty()).then(|| observations.to_string()),
        })
    }
}

fn parse_measurement(name: &str, raw: &str) -> Result<Option<f64>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    let value: f64 = raw
        .replace(',', ".")
        .parse()
        .map_err(|_| Error::validation(format!("{name} must be a number, got {raw:?}")))?;
    if !value.is_finite() {
        return Err(Error::validation(format!("{name} must be a finite number")));
    }
    Ok(Some(value))
}

/// Normalize a serial number or MAC address.
///
/// MAC addresses in any common notation become `AA:BB:CC:DD:EE:FF`; other
/// serials are trimmed and upper-cased.
#[must_use]
pub fn normalize_serial(raw: &str) -> String {
    let trimmed = raw.trim();
    if MAC_PATTERN.is_match(trimmed) {
        let hex: Vec<char> = trimmed
            .chars()
            .filter(char::is_ascii_hexdigit)
            .map(|c| c.to_ascii_uppercase())
            .collect();
        return hex
            .chunks(2)
            .map(|pair| pair.iter().collect::<String>())
            .collect::<Vec<_>>()
            .join(":");
    }
    trimmed.to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_mac_notations() {
        let expected = "AA:BB:CC:00:11:22";
        assert_eq!(normalize_serial("aa:bb:cc:00:11:22"), expected);
        assert_eq!(normalize_serial("AA-BB-CC-00-11-22"), expected);
        assert_eq!(normalize_serial("aabbcc001122"), expected);
        assert_eq!(normalize_serial("aabb.cc00.1122"), expected);
        assert_eq!(normalize_serial("  aa:bb:cc:00:11:22 "), expected);
    }

    #[test]
    fn test_normalize_plain_serial() {
        assert_eq!(normalize_serial(" zte1234abcd "), "ZTE1234ABCD");
        // 13 hex digits is not a MAC
        assert_eq!(normalize_serial("aabbcc0011223"), "AABBCC0011223");
    }

    #[test]
    fn test_status_round_trip_through_str() {
        for status in EquipmentStatus::ALL {
            assert_eq!(status.as_str().parse::<EquipmentStatus>().unwrap(), status);
        }
        assert!("unknown".parse::<EquipmentStatus>().is_err());
    }

    #[test]
    fn test_status_from_outcome() {
        assert_eq!(
            EquipmentStatus::from(TestOutcome::Pass),
            EquipmentStatus::Passed
        );
        assert_eq!(
            EquipmentStatus::from(TestOutcome::Fail),
            EquipmentStatus::Failed
        );
    }

    #[test]
    fn test_outcome_parse_is_lenient() {
        assert_eq!("PASS".parse::<TestOutcome>().unwrap(), TestOutcome::Pass);
        assert_eq!(" failed ".parse::<TestOutcome>().unwrap(), TestOutcome::Fail);
        let err = "".parse::<TestOutcome>().unwrap_err();
        assert!(err.to_string().contains("required"));
    }

    #[test]
    fn test_new_equipment_requires_all_fields() {
        assert!(NewEquipment::new("ONU", "F601", "").is_err());
        assert!(NewEquipment::new(" ", "F601", "ABC").is_err());
        assert!(NewEquipment::new("ONU", "", "ABC").is_err());
    }

    #[test]
    fn test_new_equipment_normalizes() {
        let eq = NewEquipment::new(" ONU ", " F601 ", "aa-bb-cc-dd-ee-ff").unwrap();
        assert_eq!(eq.equipment_type, "ONU");
        assert_eq!(eq.model, "F601");
        assert_eq!(eq.serial, "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_new_equipment_rejects_long_fields() {
        let long = "x".repeat(MAX_FIELD_LEN + 1);
        let err = NewEquipment::new("ONU", &long, "ABC").unwrap_err();
        assert!(err.to_string().contains("model"));
    }

    #[test]
    fn test_new_test_parses_measurements() {
        let test = NewTest::parse("pass", "940,5", "-18.2", "  ok  ").unwrap();
        assert_eq!(test.outcome, TestOutcome::Pass);
        assert_eq!(test.speed_mbps, Some(940.5));
        assert_eq!(test.signal_dbm, Some(-18.2));
        assert_eq!(test.observations.as_deref(), Some("ok"));
    }

    #[test]
    fn test_new_test_blank_fields_are_none() {
        let test = NewTest::parse("fail", "", " ", "").unwrap();
        assert_eq!(test.speed_mbps, None);
        assert_eq!(test.signal_dbm, None);
        assert_eq!(test.observations, None);
    }

    #[test]
    fn test_new_test_rejects_bad_measurements() {
        assert!(NewTest::parse("pass", "fast", "", "").is_err());
        assert!(NewTest::parse("pass", "-1", "", "").is_err());
        assert!(NewTest::parse("pass", "", "-150", "").is_err());
        assert!(NewTest::parse("pass", "", "NaN", "").is_err());
        assert!(NewTest::parse("pass", "inf", "", "").is_err());
    }

    #[test]
    fn test_new_test_rejects_long_observations() {
        let long = "o".repeat(MAX_OBSERVATIONS_LEN + 1);
        assert!(NewTest::parse("pass", "", "", &long).is_err());
        let max = "o".repeat(MAX_OBSERVATIONS_LEN);
        assert!(NewTest::parse("pass", "", "", &max).is_ok());
    }

    #[test]
    fn test_equipment_flags() {
        let eq = Equipment {
            id: 1,
            equipment_type: "ONU".to_string(),
            model: "F601".to_string(),
            serial: "ABC".to_string(),
            status: EquipmentStatus::AwaitingTest,
            registered_at: Utc::now(),
            test_count: 0,
        };
        assert!(eq.is_awaiting_test());
        assert!(!eq.has_been_tested());
    }
}
