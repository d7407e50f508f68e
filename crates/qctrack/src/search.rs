//! Equipment search filters.
//!
//! A [`SearchFilter`] is built from raw query-string values. Date filters are
//! interpreted in the configured local UTC offset and turned into a half-open
//! UTC range so storage can compare stored RFC 3339 timestamps directly.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::equipment::EquipmentStatus;

/// Raw search parameters as they arrive from a form or the CLI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    /// Free-text query matched against serial, model and type.
    pub q: String,
    /// Status name, e.g. `passed`.
    pub status: String,
    /// Day in `YYYY-MM-DD` form.
    pub day: String,
    /// Month in `YYYY-MM` form.
    pub month: String,
}

/// Restriction on when an equipment's tests happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateWindow {
    /// A single local calendar day.
    Day(NaiveDate),
    /// A local calendar month; the date is the first of the month.
    Month(NaiveDate),
}

impl DateWindow {
    /// Convert to a half-open UTC range `[start, end)`.
    #[must_use]
    pub fn utc_range(self, offset: FixedOffset) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let (start, end) = match self {
            Self::Day(day) => (day, day.succ_opt()?),
            Self::Month(first) => {
                let next = if first.month() == 12 {
                    NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)?
                } else {
                    NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)?
                };
                (first, next)
            }
        };
        let to_utc = |date: NaiveDate| {
            offset
                .from_local_datetime(&date.and_hms_opt(0, 0, 0)?)
                .single()
                .map(|dt| dt.with_timezone(&Utc))
        };
        Some((to_utc(start)?, to_utc(end)?))
    }
}

/// Parsed, validated search filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    /// Case-insensitive substring to look for.
    pub query: Option<String>,
    /// Exact status match.
    pub status: Option<EquipmentStatus>,
    /// Test date restriction.
    pub window: Option<DateWindow>,
}

impl SearchFilter {
    /// Build a filter from raw parameters.
    ///
    /// Invalid status or date values are dropped with a warning rather than
    /// failing the whole search. A day filter takes precedence over a month.
    #[must_use]
    pub fn from_params(params: &SearchParams) -> Self {
        let query = Some(params.q.trim())
            .filter(|q| !q.is_empty())
            .map(str::to_string);

        let status = match params.status.trim() {
            "" => None,
            raw => match raw.parse::<EquipmentStatus>() {
                Ok(status) => Some(status),
                Err(_) => {
                    warn!("Ignoring invalid status filter: {}", raw);
                    None
                }
            },
        };

        let day = params.day.trim();
        let month = params.month.trim();
        let window = if !day.is_empty() {
            match NaiveDate::parse_from_str(day, "%Y-%m-%d") {
                Ok(date) => Some(DateWindow::Day(date)),
                Err(_) => {
                    warn!("Ignoring invalid day filter: {}", day);
                    None
                }
            }
        } else if !month.is_empty() {
            match NaiveDate::parse_from_str(&format!("{month}-01"), "%Y-%m-%d") {
                Ok(date) => Some(DateWindow::Month(date)),
                Err(_) => {
                    warn!("Ignoring invalid month filter: {}", month);
                    None
                }
            }
        } else {
            None
        };

        Self {
            query,
            status,
            window,
        }
    }

    /// Whether the filter matches everything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.query.is_none() && self.status.is_none() && self.window.is_none()
    }

    /// Short human-readable description for report headers.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(query) = &self.query {
            parts.push(format!("matching \"{query}\""));
        }
        if let Some(status) = self.status {
            parts.push(format!("status {}", status.label()));
        }
        match self.window {
            Some(DateWindow::Day(day)) => parts.push(format!("tested on {}", day.format("%d/%m/%Y"))),
            Some(DateWindow::Month(first)) => {
                parts.push(format!("tested in {}", first.format("%m/%Y")));
            }
            None => {}
        }
        if parts.is_empty() {
            "all equipment".to_string()
        } else {
            parts.join(", ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(q: &str, status: &str, day: &str, month: &str) -> SearchParams {
        SearchParams {
            q: q.to_string(),
            status: status.to_string(),
            day: day.to_string(),
            month: month.to_string(),
        }
    }

    fn brt() -> FixedOffset {
        FixedOffset::west_opt(3 * 3600).unwrap()
    }

    #[test]
    fn test_empty_params_give_empty_filter() {
        let filter = SearchFilter::from_params(&SearchParams::default());
        assert!(filter.is_empty());
        assert_eq!(filter.describe(), "all equipment");
    }

    #[test]
    fn test_query_is_trimmed() {
        let filter = SearchFilter::from_params(&params("  f601 ", "", "", ""));
        assert_eq!(filter.query.as_deref(), Some("f601"));
    }

    #[test]
    fn test_invalid_values_are_ignored() {
        let filter = SearchFilter::from_params(&params("", "bogus", "2026-13-45", ""));
        assert!(filter.is_empty());

        let filter = SearchFilter::from_params(&params("", "", "", "2026/04"));
        assert!(filter.window.is_none());
    }

    #[test]
    fn test_day_takes_precedence_over_month() {
        let filter = SearchFilter::from_params(&params("", "", "2026-03-10", "2026-01"));
        assert_eq!(
            filter.window,
            Some(DateWindow::Day(NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()))
        );
    }

    #[test]
    fn test_day_window_shifts_by_offset() {
        let day = DateWindow::Day(NaiveDate::from_ymd_opt(2026, 3, 10).unwrap());
        let (start, end) = day.utc_range(brt()).unwrap();
        assert_eq!(start.to_rfc3339(), "2026-03-10T03:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2026-03-11T03:00:00+00:00");
    }

    #[test]
    fn test_december_month_window_rolls_year() {
        let filter = SearchFilter::from_params(&params("", "", "", "2025-12"));
        let (start, end) = filter.window.unwrap().utc_range(brt()).unwrap();
        assert_eq!(start.to_rfc3339(), "2025-12-01T03:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2026-01-01T03:00:00+00:00");
    }

    #[test]
    fn test_describe() {
        let filter = SearchFilter::from_params(&params("zte", "failed", "", "2026-02"));
        assert_eq!(
            filter.describe(),
            "matching \"zte\", status Failed, tested in 02/2026"
        );
    }
}
