use std::error::Error;
use std::path::Path;

use csv::WriterBuilder;
use rust_xlsxwriter::Workbook;

use pawflow_models::errors::{RuntimeError, SendableError};

/// Tabular view of engine data (history records, schedule listings)
/// ready to be written by an exporter.
#[derive(Debug, Clone)]
pub struct TableData {
    pub title: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TableData {
    pub fn new(title: impl Into<String>, headers: Vec<String>) -> Self {
        Self {
            title: title.into(),
            headers,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub trait TableExporter: Send + Sync {
    fn export(&self, path: &Path, table: &TableData) -> Result<(), SendableError>;
}

/// Picks an exporter from the target file extension (`.csv` or `.xlsx`).
pub fn exporter_for_path(path: &Path) -> Result<Box<dyn TableExporter>, SendableError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("csv") => Ok(Box::new(CsvTableExporter)),
        Some("xlsx") => Ok(Box::new(ExcelTableExporter)),
        other => Err(RuntimeError::boxed(
            "export.unknown_format",
            format!("No exporter for extension {:?}", other),
        )),
    }
}

#[derive(Default)]
pub struct CsvTableExporter;

impl TableExporter for CsvTableExporter {
    fn export(&self, path: &Path, table: &TableData) -> Result<(), SendableError> {
        let mut writer = WriterBuilder::new()
            .has_headers(true)
            .from_path(path)
            .map_err(to_sendable)?;

        writer.write_record(&table.headers).map_err(to_sendable)?;
        for row in &table.rows {
            writer.write_record(row).map_err(to_sendable)?;
        }
        writer.flush().map_err(to_sendable)?;
        Ok(())
    }
}

#[derive(Default)]
pub struct ExcelTableExporter;

impl TableExporter for ExcelTableExporter {
    fn export(&self, path: &Path, table: &TableData) -> Result<(), SendableError> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet
            .set_name(sanitize_sheet_name(&table.title))
            .map_err(to_sendable)?;

        for (col_idx, header) in table.headers.iter().enumerate() {
            worksheet
                .write_string(0, col_idx as u16, header)
                .map_err(to_sendable)?;
        }
        for (row_idx, row) in table.rows.iter().enumerate() {
            for (col_idx, value) in row.iter().enumerate() {
                worksheet
                    .write_string((row_idx + 1) as u32, col_idx as u16, value)
                    .map_err(to_sendable)?;
            }
        }

        workbook.save(path).map_err(to_sendable)?;
        Ok(())
    }
}

fn sanitize_sheet_name(name: &str) -> String {
    let mut sanitized = name
        .chars()
        .map(|ch| match ch {
            ':' | '\\' | '/' | '?' | '*' | '[' | ']' => '_',
            _ if ch.is_control() => '_',
            _ => ch,
        })
        .collect::<String>();

    sanitized = sanitized.trim().trim_matches('\'').to_string();
    if sanitized.is_empty() {
        sanitized = "Sheet1".to_string();
    }
    if sanitized.len() > 31 {
        sanitized.truncate(31);
    }
    sanitized
}

fn to_sendable<E>(err: E) -> SendableError
where
    E: Error + Send + Sync + 'static,
{
    Box::new(err)
}
