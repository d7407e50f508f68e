//! Printable reports for search results and equipment histories.
//!
//! Reports are assembled once into plain data ([`SearchReport`],
//! [`HistoryReport`]) and rendered either to PDF or to printable HTML.

pub mod html;
pub mod pdf;

use std::path::Path;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Serialize;

use crate::equipment::{Equipment, TestRecord};
use crate::error::{Error, Result};
use crate::history::{time_in_field, HistoryEntry};
use crate::search::SearchFilter;

pub use html::{render_history_html, render_search_html};
pub use pdf::{render_history_pdf, render_search_pdf};

/// Display format for dates in reports.
pub const DATE_TIME_FORMAT: &str = "%d/%m/%Y %H:%M";

/// Output format of an exported report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// Binary PDF document.
    Pdf,
    /// Self-contained printable HTML page.
    Html,
}

impl ReportFormat {
    /// Pick the format from an output file extension.
    ///
    /// # Errors
    ///
    /// Returns a validation error for anything other than `.pdf` or `.html`.
    pub fn from_path(path: &Path) -> Result<Self> {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("pdf") => Ok(Self::Pdf),
            Some("html" | "htm") => Ok(Self::Html),
            _ => Err(Error::validation(format!(
                "cannot tell report format from {}; use a .pdf or .html file name",
                path.display()
            ))),
        }
    }

    /// File extension without the dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Html => "html",
        }
    }

    /// MIME type for HTTP responses.
    #[must_use]
    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Html => "text/html; charset=utf-8",
        }
    }
}

/// Filtered equipment list ready for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct SearchReport {
    /// When the report was produced.
    pub generated_at: DateTime<Utc>,
    /// Local offset used for every displayed time.
    #[serde(skip)]
    pub offset: FixedOffset,
    /// Human-readable filter summary.
    pub filter_description: String,
    /// Matching equipment, newest first.
    pub rows: Vec<Equipment>,
}

impl SearchReport {
    /// Build a report for the given search results.
    #[must_use]
    pub fn new(filter: &SearchFilter, rows: Vec<Equipment>, offset: FixedOffset) -> Self {
        Self {
            generated_at: Utc::now(),
            offset,
            filter_description: filter.describe(),
            rows,
        }
    }

    /// Number of equipment rows.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.rows.len()
    }

    /// Download file name, dated in local time.
    #[must_use]
    pub fn file_name(&self, format: ReportFormat) -> String {
        search_report_file_name(
            self.generated_at.with_timezone(&self.offset).date_naive(),
            format,
        )
    }
}

/// One equipment's test history ready for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryReport {
    /// When the report was produced.
    pub generated_at: DateTime<Utc>,
    /// Local offset used for every displayed time.
    #[serde(skip)]
    pub offset: FixedOffset,
    /// The device.
    pub equipment: Equipment,
    /// Tests with time-in-field, newest first.
    pub entries: Vec<HistoryEntry>,
}

impl HistoryReport {
    /// Build a report from an equipment and its tests in any order.
    #[must_use]
    pub fn new(equipment: Equipment, tests: &[TestRecord], offset: FixedOffset) -> Self {
        let entries = time_in_field(equipment.registered_at, tests);
        Self {
            generated_at: Utc::now(),
            offset,
            equipment,
            entries,
        }
    }

    /// Number of test rows.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.entries.len()
    }

    /// Download file name derived from the serial.
    #[must_use]
    pub fn file_name(&self, format: ReportFormat) -> String {
        history_report_file_name(&self.equipment.serial, format)
    }
}

/// `equipment_report_<YYYY-MM-DD>.<ext>`
#[must_use]
pub fn search_report_file_name(date: NaiveDate, format: ReportFormat) -> String {
    format!(
        "equipment_report_{}.{}",
        date.format("%Y-%m-%d"),
        format.extension()
    )
}

/// `history_<serial>.<ext>` with the serial reduced to `[A-Za-z0-9_-]`.
#[must_use]
pub fn history_report_file_name(serial: &str, format: ReportFormat) -> String {
    let safe: String = serial
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("history_{safe}.{}", format.extension())
}

/// Format a timestamp in the report's local offset.
pub(crate) fn local_time(at: DateTime<Utc>, offset: FixedOffset) -> String {
    at.with_timezone(&offset).format(DATE_TIME_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equipment::EquipmentStatus;
    use chrono::TimeZone;
    use std::path::PathBuf;

    fn equipment(serial: &str) -> Equipment {
        Equipment {
            id: 7,
            equipment_type: "ONU".to_string(),
            model: "F601".to_string(),
            serial: serial.to_string(),
            status: EquipmentStatus::AwaitingTest,
            registered_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            test_count: 0,
        }
    }

    fn brt() -> FixedOffset {
        FixedOffset::west_opt(3 * 3600).unwrap()
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            ReportFormat::from_path(&PathBuf::from("out/report.PDF")).unwrap(),
            ReportFormat::Pdf
        );
        assert_eq!(
            ReportFormat::from_path(&PathBuf::from("report.html")).unwrap(),
            ReportFormat::Html
        );
        assert!(ReportFormat::from_path(&PathBuf::from("report.csv")).is_err());
        assert!(ReportFormat::from_path(&PathBuf::from("report")).is_err());
    }

    #[test]
    fn test_search_file_name() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        assert_eq!(
            search_report_file_name(date, ReportFormat::Pdf),
            "equipment_report_2026-03-09.pdf"
        );
    }

    #[test]
    fn test_history_file_name_sanitizes_serial() {
        assert_eq!(
            history_report_file_name("AA:BB:CC:DD:EE:FF", ReportFormat::Pdf),
            "history_AA_BB_CC_DD_EE_FF.pdf"
        );
        assert_eq!(
            history_report_file_name("../ZTE 01", ReportFormat::Html),
            "history____ZTE_01.html"
        );
    }

    #[test]
    fn test_search_report_counts_rows() {
        let report = SearchReport::new(
            &SearchFilter::default(),
            vec![equipment("A"), equipment("B")],
            brt(),
        );
        assert_eq!(report.record_count(), 2);
        assert_eq!(report.filter_description, "all equipment");
    }

    #[test]
    fn test_local_time_uses_offset() {
        let at = Utc.with_ymd_and_hms(2026, 3, 11, 1, 30, 0).unwrap();
        assert_eq!(local_time(at, brt()), "10/03/2026 22:30");
    }
}
