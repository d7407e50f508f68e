//! Embedded tera templates for pages and printable reports.
//!
//! Templates are compiled into the binary so the server and the CLI export
//! work without a template directory next to the executable.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset};
use tera::{Tera, Value};

use crate::equipment::{EquipmentStatus, TestOutcome};
use crate::error::Result;
use crate::report::DATE_TIME_FORMAT;

const TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../templates/base.html")),
    ("login.html", include_str!("../templates/login.html")),
    ("index.html", include_str!("../templates/index.html")),
    ("search.html", include_str!("../templates/search.html")),
    ("history.html", include_str!("../templates/history.html")),
    ("admin_users.html", include_str!("../templates/admin_users.html")),
    ("admin_activity.html", include_str!("../templates/admin_activity.html")),
    ("error.html", include_str!("../templates/error.html")),
    ("report_search.html", include_str!("../templates/report_search.html")),
    ("report_history.html", include_str!("../templates/report_history.html")),
];

/// Build the template engine with all embedded templates and filters.
///
/// `offset` is the local time zone used by the `localtime` filter.
///
/// # Errors
///
/// Returns `Error::Template` if a template fails to parse.
pub fn build(offset: FixedOffset) -> Result<Tera> {
    let mut tera = Tera::default();
    tera.add_raw_templates(TEMPLATES.iter().copied())?;
    tera.register_filter("localtime", LocalTime { offset });
    tera.register_filter("status_label", status_label);
    Ok(tera)
}

/// `{{ ts | localtime }}` or `{{ ts | localtime(format="%d/%m") }}`
struct LocalTime {
    offset: FixedOffset,
}

impl tera::Filter for LocalTime {
    fn filter(&self, value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let Some(raw) = value.as_str() else {
            return Ok(Value::String("-".to_string()));
        };
        let format = args
            .get("format")
            .and_then(Value::as_str)
            .unwrap_or(DATE_TIME_FORMAT);
        let at = DateTime::parse_from_rfc3339(raw)
            .map_err(|e| tera::Error::msg(format!("localtime: {raw:?} is not a timestamp: {e}")))?;
        Ok(Value::String(
            at.with_timezone(&self.offset).format(format).to_string(),
        ))
    }
}

/// Turn a stored status or outcome name into its display label.
fn status_label(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let Some(raw) = value.as_str() else {
        return Ok(value.clone());
    };
    let label = if let Ok(status) = raw.parse::<EquipmentStatus>() {
        status.label()
    } else if let Ok(outcome) = raw.parse::<TestOutcome>() {
        outcome.label()
    } else {
        raw
    };
    Ok(Value::String(label.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tera::Context;

    fn engine() -> Tera {
        build(FixedOffset::west_opt(3 * 3600).unwrap()).unwrap()
    }

    #[test]
    fn test_all_templates_parse() {
        let tera = engine();
        for (name, _) in TEMPLATES {
            assert!(
                tera.get_template_names().any(|n| n == *name),
                "missing template {name}"
            );
        }
    }

    #[test]
    fn test_localtime_filter() {
        let mut context = Context::new();
        context.insert("at", "2026-03-11T01:30:00Z");

        let mut tera = engine();
        tera.add_raw_template("t", "{{ at | localtime }}|{{ at | localtime(format=\"%Y-%m-%d\") }}")
            .unwrap();
        assert_eq!(
            tera.render("t", &context).unwrap(),
            "10/03/2026 22:30|2026-03-10"
        );
    }

    #[test]
    fn test_localtime_filter_null() {
        let mut tera = engine();
        tera.add_raw_template("t", "{{ at | localtime }}").unwrap();
        let mut context = Context::new();
        context.insert("at", &Option::<String>::None);
        assert_eq!(tera.render("t", &context).unwrap(), "-");
    }

    #[test]
    fn test_status_label_filter() {
        let mut tera = engine();
        tera.add_raw_template("t", "{{ a | status_label }}/{{ b | status_label }}/{{ c | status_label }}")
            .unwrap();
        let mut context = Context::new();
        context.insert("a", "awaiting_test");
        context.insert("b", "fail");
        context.insert("c", "other");
        assert_eq!(tera.render("t", &context).unwrap(), "Awaiting test/Fail/other");
    }
}
