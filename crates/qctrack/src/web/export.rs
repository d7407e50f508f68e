//! Report downloads.
//!
//! PDF responses carry an `x-record-count` header with the number of rows
//! in the document, which the PDF body itself does not expose to scripts.

use axum::extract::{Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::HeaderName;
use axum::response::{Html, IntoResponse, Response};
use tracing::info;

use super::session::CurrentUser;
use super::{blocking, AppState, RecordId};
use crate::activity::ActivityAction;
use crate::error::{Error, Result};
use crate::report::{
    render_history_html, render_history_pdf, render_search_html, render_search_pdf, HistoryReport,
    ReportFormat, SearchReport,
};
use crate::search::{SearchFilter, SearchParams};

/// Header carrying the number of records in an exported report.
pub const RECORD_COUNT_HEADER: HeaderName = HeaderName::from_static("x-record-count");

fn search_report(state: &AppState, params: &SearchParams) -> Result<SearchReport> {
    let filter = SearchFilter::from_params(params);
    let offset = state.config.utc_offset();
    let rows = state.with_storage(|storage| storage.search_equipment_at(&filter, offset))?;
    Ok(SearchReport::new(&filter, rows, offset))
}

fn history_report(state: &AppState, id: i64) -> Result<HistoryReport> {
    let (equipment, tests) = state.with_storage(|storage| {
        let equipment = storage
            .get_equipment(id)?
            .ok_or_else(|| Error::not_found(format!("equipment {id}")))?;
        let tests = storage.tests_for(id)?;
        Ok((equipment, tests))
    })?;
    Ok(HistoryReport::new(equipment, &tests, state.config.utc_offset()))
}

fn log_export(state: &AppState, current: &CurrentUser, file_name: &str, count: usize) -> Result<()> {
    info!(
        "{} exported {} ({} records)",
        current.user.username, file_name, count
    );
    state.with_storage(|storage| {
        storage.log_activity(
            current.actor(),
            ActivityAction::ReportExported,
            &format!("{file_name} ({count} records)"),
        )
    })?;
    Ok(())
}

fn attachment(bytes: Vec<u8>, file_name: &str, count: usize) -> Response {
    (
        [
            (CONTENT_TYPE, ReportFormat::Pdf.content_type().to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
            (RECORD_COUNT_HEADER, count.to_string()),
        ],
        bytes,
    )
        .into_response()
}

/// `GET /export/search.pdf`
pub async fn search_pdf(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(params): Query<SearchParams>,
) -> Result<Response> {
    let report = search_report(&state, &params)?;
    let file_name = report.file_name(ReportFormat::Pdf);
    let count = report.record_count();

    let bytes = blocking(move || render_search_pdf(&report)).await?;
    log_export(&state, &current, &file_name, count)?;
    Ok(attachment(bytes, &file_name, count))
}

/// `GET /export/search.html`
pub async fn search_html(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(params): Query<SearchParams>,
) -> Result<Html<String>> {
    let report = search_report(&state, &params)?;
    let html = render_search_html(&state.templates, &report)?;
    log_export(
        &state,
        &current,
        &report.file_name(ReportFormat::Html),
        report.record_count(),
    )?;
    Ok(Html(html))
}

/// `GET /equipment/{id}/history.pdf`
pub async fn history_pdf(
    State(state): State<AppState>,
    current: CurrentUser,
    RecordId(id): RecordId,
) -> Result<Response> {
    let report = history_report(&state, id)?;
    let file_name = report.file_name(ReportFormat::Pdf);
    let count = report.record_count();

    let bytes = blocking(move || render_history_pdf(&report)).await?;
    log_export(&state, &current, &file_name, count)?;
    Ok(attachment(bytes, &file_name, count))
}

/// `GET /equipment/{id}/history.html`
pub async fn history_html(
    State(state): State<AppState>,
    current: CurrentUser,
    RecordId(id): RecordId,
) -> Result<Html<String>> {
    let report = history_report(&state, id)?;
    let html = render_history_html(&state.templates, &report)?;
    log_export(
        &state,
        &current,
        &report.file_name(ReportFormat::Html),
        report.record_count(),
    )?;
    Ok(Html(html))
}
