//! PDF rendering with printpdf.
//!
//! Layout is a simple flowing table on A4 pages using the built-in Helvetica
//! fonts, so no font files need to ship with the binary.

use printpdf::{
    BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference,
};
use tracing::debug;

use super::{local_time, HistoryReport, SearchReport};
use crate::error::{Error, Result};

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN_LEFT: f32 = 15.0;
const TOP: f32 = 280.0;
const BOTTOM: f32 = 22.0;
const FOOTER_Y: f32 = 10.0;

const TITLE_SIZE: f32 = 16.0;
const BODY_SIZE: f32 = 10.0;
const TABLE_SIZE: f32 = 8.5;
const LINE_HEIGHT: f32 = 5.0;

/// Rough Helvetica advance per point of font size, in millimetres.
const CHAR_WIDTH_PER_PT: f32 = 0.19;

#[derive(Clone, Copy)]
struct Column {
    x: f32,
    width: f32,
}

impl Column {
    const fn new(x: f32, width: f32) -> Self {
        Self { x, width }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn max_chars(self, size: f32) -> usize {
        (self.width / (size * CHAR_WIDTH_PER_PT)).floor().max(1.0) as usize
    }
}

const SEARCH_COLUMNS: [Column; 6] = [
    Column::new(15.0, 44.0),
    Column::new(60.0, 24.0),
    Column::new(85.0, 34.0),
    Column::new(120.0, 26.0),
    Column::new(147.0, 12.0),
    Column::new(160.0, 35.0),
];

const SEARCH_HEADER: [&str; 6] = ["Serial", "Type", "Model", "Status", "Tests", "Registered"];

const HISTORY_COLUMNS: [Column; 7] = [
    Column::new(15.0, 29.0),
    Column::new(45.0, 13.0),
    Column::new(59.0, 17.0),
    Column::new(77.0, 17.0),
    Column::new(95.0, 22.0),
    Column::new(118.0, 22.0),
    Column::new(141.0, 54.0),
];

const HISTORY_HEADER: [&str; 7] = [
    "Tested at",
    "Result",
    "Speed Mbps",
    "Signal dBm",
    "Time in field",
    "By",
    "Observations",
];

/// Render a search report as PDF bytes.
///
/// # Errors
///
/// Returns `Error::Report` if printpdf cannot load a font or serialize the
/// document.
pub fn render_search_pdf(report: &SearchReport) -> Result<Vec<u8>> {
    let mut pdf = PdfWriter::new("Equipment QC report")?;

    pdf.text("Equipment QC report", TITLE_SIZE, true);
    pdf.gap(2.0);
    pdf.text(
        &format!("Generated: {}", local_time(report.generated_at, report.offset)),
        BODY_SIZE,
        false,
    );
    pdf.text(&format!("Filter: {}", report.filter_description), BODY_SIZE, false);
    pdf.text(&format!("Records: {}", report.record_count()), BODY_SIZE, false);
    pdf.gap(4.0);

    if report.rows.is_empty() {
        pdf.text("No equipment matches this filter.", BODY_SIZE, false);
    } else {
        pdf.header_row(&SEARCH_COLUMNS, &SEARCH_HEADER);
        for equipment in &report.rows {
            let cells = [
                equipment.serial.clone(),
                equipment.equipment_type.clone(),
                equipment.model.clone(),
                equipment.status.label().to_string(),
                equipment.test_count.to_string(),
                local_time(equipment.registered_at, report.offset),
            ];
            pdf.table_row(&SEARCH_COLUMNS, &SEARCH_HEADER, &cells);
        }
    }

    debug!("Rendered search PDF with {} rows", report.record_count());
    pdf.finish()
}

/// Render one equipment's history as PDF bytes.
///
/// # Errors
///
/// Returns `Error::Report` if printpdf cannot load a font or serialize the
/// document.
pub fn render_history_pdf(report: &HistoryReport) -> Result<Vec<u8>> {
    let equipment = &report.equipment;
    let mut pdf = PdfWriter::new(&format!("Test history {}", equipment.serial))?;

    pdf.text(&format!("Test history: {}", equipment.serial), TITLE_SIZE, true);
    pdf.gap(2.0);
    pdf.text(
        &format!(
            "Type: {}    Model: {}    Status: {}",
            equipment.equipment_type,
            equipment.model,
            equipment.status.label()
        ),
        BODY_SIZE,
        false,
    );
    pdf.text(
        &format!("Registered: {}", local_time(equipment.registered_at, report.offset)),
        BODY_SIZE,
        false,
    );
    pdf.text(
        &format!("Generated: {}", local_time(report.generated_at, report.offset)),
        BODY_SIZE,
        false,
    );
    pdf.text(&format!("Tests: {}", report.record_count()), BODY_SIZE, false);
    pdf.gap(4.0);

    if report.entries.is_empty() {
        pdf.text("No tests recorded yet.", BODY_SIZE, false);
        return pdf.finish();
    }

    let observations_column = HISTORY_COLUMNS[6];
    pdf.header_row(&HISTORY_COLUMNS, &HISTORY_HEADER);
    for entry in &report.entries {
        let test = &entry.test;
        let notes = wrap(
            test.observations.as_deref().unwrap_or("-"),
            observations_column.max_chars(TABLE_SIZE),
        );
        let mut notes = notes.into_iter();
        let cells = [
            local_time(test.tested_at, report.offset),
            test.outcome.label().to_string(),
            measurement(test.speed_mbps),
            measurement(test.signal_dbm),
            entry.time_in_field.clone(),
            test.tested_by.clone().unwrap_or_else(|| "-".to_string()),
            notes.next().unwrap_or_default(),
        ];
        pdf.table_row(&HISTORY_COLUMNS, &HISTORY_HEADER, &cells);
        for line in notes {
            pdf.continuation(observations_column, &HISTORY_COLUMNS, &HISTORY_HEADER, &line);
        }
    }

    debug!(
        "Rendered history PDF for {} with {} tests",
        equipment.serial,
        report.record_count()
    );
    pdf.finish()
}

fn measurement(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.1}"))
}

/// Cut `text` to at most `max_chars` characters, marking the cut.
fn fit(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}

/// Greedy word wrap; words longer than a line are split.
fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let rest = word.split_off(max_chars);
            lines.push(word.into_iter().collect());
            word = rest;
        }
        let word: String = word.into_iter().collect();
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

/// Page-aware text cursor over a printpdf document.
struct PdfWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    y: f32,
    page: usize,
}

impl PdfWriter {
    fn new(title: &str) -> Result<Self> {
        let (doc, page, layer) =
            PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| Error::report(format!("failed to load Helvetica: {e}")))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| Error::report(format!("failed to load Helvetica Bold: {e}")))?;
        let layer = doc.get_page(page).get_layer(layer);

        let writer = Self {
            doc,
            layer,
            regular,
            bold,
            y: TOP,
            page: 1,
        };
        writer.footer();
        Ok(writer)
    }

    fn footer(&self) {
        self.layer.use_text(
            format!("qctrack - page {}", self.page),
            BODY_SIZE - 2.0,
            Mm(MARGIN_LEFT),
            Mm(FOOTER_Y),
            &self.regular,
        );
    }

    fn new_page(&mut self) {
        let (page, layer) = self
            .doc
            .add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.page += 1;
        self.y = TOP;
        self.footer();
    }

    /// Start a new page if fewer than `height` millimetres remain.
    fn ensure_space(&mut self, height: f32) -> bool {
        if self.y - height < BOTTOM {
            self.new_page();
            true
        } else {
            false
        }
    }

    fn gap(&mut self, height: f32) {
        self.y -= height;
    }

    fn font(&self, bold: bool) -> &IndirectFontRef {
        if bold {
            &self.bold
        } else {
            &self.regular
        }
    }

    fn text(&mut self, text: &str, size: f32, bold: bool) {
        let height = LINE_HEIGHT.max(size * 0.5);
        self.ensure_space(height);
        self.layer.use_text(
            text,
            size,
            Mm(MARGIN_LEFT),
            Mm(self.y),
            self.font(bold),
        );
        self.y -= height;
    }

    fn cells(&mut self, columns: &[Column], cells: &[impl AsRef<str>], bold: bool) {
        for (column, cell) in columns.iter().zip(cells) {
            let cell = fit(cell.as_ref(), column.max_chars(TABLE_SIZE));
            self.layer
                .use_text(cell, TABLE_SIZE, Mm(column.x), Mm(self.y), self.font(bold));
        }
        self.y -= LINE_HEIGHT;
    }

    fn header_row(&mut self, columns: &[Column], header: &[&str]) {
        self.ensure_space(LINE_HEIGHT * 2.0);
        self.cells(columns, header, true);
        self.y -= 1.0;
    }

    /// Write a row, repeating the header at the top of a new page.
    fn table_row(&mut self, columns: &[Column], header: &[&str], cells: &[String]) {
        if self.ensure_space(LINE_HEIGHT) {
            self.header_row(columns, header);
        }
        self.cells(columns, cells, false);
    }

    /// Extra wrapped line in a single column of the previous row.
    fn continuation(&mut self, column: Column, columns: &[Column], header: &[&str], line: &str) {
        if self.ensure_space(LINE_HEIGHT) {
            self.header_row(columns, header);
        }
        self.cells(&[column], &[line], false);
    }

    fn finish(self) -> Result<Vec<u8>> {
        let pages = self.page;
        let bytes = self
            .doc
            .save_to_bytes()
            .map_err(|e| Error::report(format!("failed to write PDF: {e}")))?;
        debug!("PDF has {} page(s), {} bytes", pages, bytes.len());
        Ok(bytes)
    }
}
