//! Spreadsheet assembly: merged rows → formatted single-sheet `.xlsx`.
//!
//! Layout:
//! - row 1 is the header: bold white text on blue, centred, wrapped
//! - body cells wrap, aligned top-left
//! - every written cell has a thin black border
//! - column width = longest cell in the column + 2, between 10 and 45
//! - the header row is frozen

use crate::error::Pdf2XlsxError;
use crate::output::TableMatrix;
use rust_xlsxwriter::{
    Color, DocProperties, Format, FormatAlign, FormatBorder, Workbook, XlsxError,
};
use tracing::debug;

pub const HEADER_FILL: u32 = 0x4472C4;
pub const MIN_COLUMN_WIDTH: usize = 10;
pub const MAX_COLUMN_WIDTH: usize = 45;
const CREATOR: &str = "pdf2xlsx";

// Excel hard limits.
const MAX_ROWS: usize = 1_048_576;
const MAX_COLS: usize = 16_384;

/// Column widths in characters for `rows`.
pub fn column_widths(rows: &TableMatrix) -> Vec<usize> {
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut widths = vec![MIN_COLUMN_WIDTH; columns];
    for row in rows {
        for (col, cell) in row.iter().enumerate() {
            widths[col] = widths[col].max(cell.chars().count() + 2);
        }
    }
    widths
        .into_iter()
        .map(|w| w.min(MAX_COLUMN_WIDTH))
        .collect()
}

fn header_format() -> Format {
    Format::new()
        .set_bold()
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(HEADER_FILL))
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter)
        .set_text_wrap()
        .set_border(FormatBorder::Thin)
        .set_border_color(Color::Black)
}

fn body_format() -> Format {
    Format::new()
        .set_align(FormatAlign::Left)
        .set_align(FormatAlign::Top)
        .set_text_wrap()
        .set_border(FormatBorder::Thin)
        .set_border_color(Color::Black)
}

/// Build and serialise the workbook. CPU-bound; see [`assemble`].
pub fn build_workbook(rows: &TableMatrix, sheet_name: &str) -> Result<Vec<u8>, Pdf2XlsxError> {
    if rows.len() > MAX_ROWS {
        return Err(Pdf2XlsxError::WorkbookFailed(format!(
            "{} rows exceed the sheet limit of {MAX_ROWS}",
            rows.len()
        )));
    }
    let widths = column_widths(rows);
    if widths.len() > MAX_COLS {
        return Err(Pdf2XlsxError::WorkbookFailed(format!(
            "{} columns exceed the sheet limit of {MAX_COLS}",
            widths.len()
        )));
    }

    write_workbook(rows, &widths, sheet_name).map_err(|e| Pdf2XlsxError::WorkbookFailed(e.to_string()))
}

fn write_workbook(rows: &TableMatrix, widths: &[usize], sheet_name: &str) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    workbook.set_properties(&DocProperties::new().set_author(CREATOR));

    let header = header_format();
    let body = body_format();

    let sheet = workbook.add_worksheet();
    sheet.set_name(sheet_name)?;

    for (r, row) in rows.iter().enumerate() {
        let format = if r == 0 { &header } else { &body };
        for (c, cell) in row.iter().enumerate() {
            if cell.is_empty() {
                sheet.write_blank(r as u32, c as u16, format)?;
            } else {
                sheet.write_string_with_format(r as u32, c as u16, cell, format)?;
            }
        }
    }

    for (c, width) in widths.iter().enumerate() {
        sheet.set_column_width(c as u16, *width as f64)?;
    }
    sheet.set_freeze_panes(1, 0)?;

    let buf = workbook.save_to_buffer()?;
    debug!("Workbook serialised: {} rows, {} bytes", rows.len(), buf.len());
    Ok(buf)
}

/// Serialise on the blocking pool.
pub async fn assemble(rows: TableMatrix, sheet_name: String) -> Result<Vec<u8>, Pdf2XlsxError> {
    tokio::task::spawn_blocking(move || build_workbook(&rows, &sheet_name))
        .await
        .map_err(|e| Pdf2XlsxError::Internal(format!("Workbook task panicked: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: &[&[&str]]) -> TableMatrix {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn widths_respect_floor_and_cap() {
        let long = "x".repeat(80);
        let rows = matrix(&[&["Name", "Description"], &["A", long.as_str(), "extra column"]]);
        assert_eq!(column_widths(&rows), vec![10, 45, 14]);
    }

    #[test]
    fn widths_count_characters_not_bytes() {
        let rows = matrix(&[&["ação ação ação"]]);
        assert_eq!(column_widths(&rows), vec![16]);
    }

    #[test]
    fn empty_matrix_has_no_columns() {
        assert!(column_widths(&Vec::new()).is_empty());
    }

    #[test]
    fn workbook_is_a_zip_container() {
        let rows = matrix(&[&["Name", "Amount"], &["A", "10"], &["B", ""]]);
        let bytes = build_workbook(&rows, "Tabela").unwrap();
        assert!(bytes.starts_with(b"PK"), "xlsx must be a zip archive");
    }

    #[tokio::test]
    async fn assemble_runs_off_thread() {
        let rows = matrix(&[&["h"], &["v"]]);
        let bytes = assemble(rows, "Table".to_string()).await.unwrap();
        assert!(bytes.len() > 100);
    }

    #[test]
    fn invalid_sheet_name_is_reported() {
        let rows = matrix(&[&["h"]]);
        let err = build_workbook(&rows, "bad/name").unwrap_err();
        assert!(matches!(err, Pdf2XlsxError::WorkbookFailed(_)));
    }
}
