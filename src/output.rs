//! Result types returned by a conversion.

use serde::{Deserialize, Serialize};

/// One extracted table: ordered rows of ordered string cells.
///
/// Rows are not required to have the same number of cells.
pub type TableMatrix = Vec<Vec<String>>;

/// Everything a successful conversion produces.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionOutput {
    /// Serialised `.xlsx` workbook.
    #[serde(skip)]
    pub workbook: Vec<u8>,
    /// Merged rows written to the sheet, header first.
    pub rows: TableMatrix,
    pub stats: ConversionStats,
}

/// Per-conversion counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Pages in the document.
    pub total_pages: usize,
    /// Pages sent to the vision model.
    pub processed_pages: usize,
    /// Pages whose response contained a non-empty table.
    pub pages_with_table: usize,
    /// Pages whose inference call failed or returned an undecodable answer.
    pub failed_pages: usize,
    pub row_count: usize,
    pub column_count: usize,
    pub render_duration_ms: u64,
    pub llm_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Derive the download filename for an uploaded PDF name.
///
/// A trailing `.pdf` (any case) becomes `.xlsx`; anything else gets `.xlsx`
/// appended.
pub fn output_filename(input_name: &str) -> String {
    let stem_len = input_name.len().saturating_sub(4);
    match input_name.get(stem_len..) {
        Some(ext) if ext.eq_ignore_ascii_case(".pdf") => {
            format!("{}.xlsx", &input_name[..stem_len])
        }
        _ => format!("{input_name}.xlsx"),
    }
}
