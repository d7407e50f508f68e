//! Test history with time-in-field.
//!
//! "Time in field" is how long a device spent between two QC events: from
//! registration to its first test, then from each test to the next. A long
//! gap after a pass usually means the unit came back from a customer.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::equipment::TestRecord;

/// One history row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    /// The QC run.
    pub test: TestRecord,
    /// Formatted gap since the previous event.
    pub time_in_field: String,
    /// The same gap in whole seconds.
    pub seconds_in_field: i64,
}

/// Pair each test with the time elapsed since the previous event.
///
/// `tests` may be in any order. The result is newest first. Gaps that come
/// out negative (clock changes between records) are reported as zero.
#[must_use]
pub fn time_in_field(registered_at: DateTime<Utc>, tests: &[TestRecord]) -> Vec<HistoryEntry> {
    let mut ordered: Vec<&TestRecord> = tests.iter().collect();
    ordered.sort_by_key(|t| (t.tested_at, t.id));

    let mut previous = registered_at;
    let mut entries: Vec<HistoryEntry> = ordered
        .into_iter()
        .map(|test| {
            let gap = (test.tested_at - previous).max(TimeDelta::zero());
            previous = test.tested_at;
            HistoryEntry {
                test: test.clone(),
                time_in_field: format_duration(gap),
                seconds_in_field: gap.num_seconds(),
            }
        })
        .collect();

    entries.reverse();
    entries
}

/// Format a duration as `2d 3h 4m`, `3h 12m` or `45m`.
#[must_use]
pub fn format_duration(delta: TimeDelta) -> String {
    let total = delta.num_seconds().max(0);
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}
