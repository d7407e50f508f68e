//! Printable HTML reports.
//!
//! These pages carry their own styling and a print button, so a browser's
//! "save as PDF" gives a usable document when the PDF export is not wanted.

use tera::{Context, Tera};

use super::{HistoryReport, SearchReport};
use crate::error::Result;

/// Render a search report as a standalone HTML page.
///
/// # Errors
///
/// Returns `Error::Template` if rendering fails.
pub fn render_search_html(tera: &Tera, report: &SearchReport) -> Result<String> {
    let mut context = Context::new();
    context.insert("report", report);
    context.insert("count", &report.record_count());
    Ok(tera.render("report_search.html", &context)?)
}

/// Render one equipment's history as a standalone HTML page.
///
/// # Errors
///
/// Returns `Error::Template` if rendering fails.
pub fn render_history_html(tera: &Tera, report: &HistoryReport) -> Result<String> {
    let mut context = Context::new();
    context.insert("report", report);
    context.insert("count", &report.record_count());
    Ok(tera.render("report_history.html", &context)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equipment::{Equipment, EquipmentStatus, TestOutcome, TestRecord};
    use crate::search::{SearchFilter, SearchParams};
    use chrono::{FixedOffset, TimeDelta, TimeZone, Utc};

    fn offset() -> FixedOffset {
        FixedOffset::west_opt(3 * 3600).unwrap()
    }

    fn equipment() -> Equipment {
        Equipment {
            id: 3,
            equipment_type: "Router".to_string(),
            model: "Archer C6".to_string(),
            serial: "TPL0003".to_string(),
            status: EquipmentStatus::Failed,
            registered_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            test_count: 1,
        }
    }

    #[test]
    fn test_search_html_lists_rows() {
        let tera = crate::templates::build(offset()).unwrap();
        let filter = SearchFilter::from_params(&SearchParams {
            q: "archer".to_string(),
            ..SearchParams::default()
        });
        let report = SearchReport::new(&filter, vec![equipment()], offset());

        let html = render_search_html(&tera, &report).unwrap();
        assert!(html.contains("TPL0003"));
        assert!(html.contains("Records: 1"));
        assert!(html.contains("Failed"));
        assert!(html.contains("archer"));
    }

    #[test]
    fn test_history_html_shows_time_in_field() {
        let tera = crate::templates::build(offset()).unwrap();
        let eq = equipment();
        let test = TestRecord {
            id: 1,
            equipment_id: eq.id,
            tested_at: eq.registered_at + TimeDelta::minutes(90),
            outcome: TestOutcome::Fail,
            speed_mbps: None,
            signal_dbm: Some(-27.5),
            observations: Some("<no link>".to_string()),
            tested_by: None,
        };
        let report = HistoryReport::new(eq, &[test], offset());

        let html = render_history_html(&tera, &report).unwrap();
        assert!(html.contains("1h 30m"));
        assert!(html.contains("-27.5"));
        assert!(html.contains("&lt;no link&gt;"));
        assert!(!html.contains("<no link>"));
    }
}
