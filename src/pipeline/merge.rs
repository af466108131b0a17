//! Row merging: fold per-page tables into one logical table.
//!
//! Vision extraction of a multi-page table usually re-emits the header on
//! every page, and sometimes pads pages with empty rows. For each incoming
//! row, in order:
//!
//! 1. skip it unless it is a JSON array
//! 2. skip it if every cell is empty or whitespace
//! 3. skip it if its raw text, case-insensitively and pipe-joined, equals
//!    the *first* accumulated row (a repeated header)
//! 4. otherwise normalise each cell and append it
//!
//! Only the first accumulated row is compared against, so this is a
//! single-pass header filter rather than a general duplicate detector:
//! genuine repeated data rows are kept.

use crate::error::Pdf2XlsxError;
use crate::output::TableMatrix;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Collapse every whitespace run (newlines included) to one space and trim.
///
/// Idempotent: `normalize_cell(&normalize_cell(s)) == normalize_cell(s)`.
pub fn normalize_cell(raw: &str) -> String {
    RE_WHITESPACE.replace_all(raw, " ").trim().to_string()
}

/// Text of one JSON cell. `null` is empty; numbers and booleans keep their
/// literal form.
pub fn cell_text(cell: &Value) -> String {
    match cell {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn row_key<S: AsRef<str>>(cells: &[S]) -> String {
    cells
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("|")
        .to_lowercase()
}

/// Accumulates rows across pages.
#[derive(Debug, Default)]
pub struct RowMerger {
    rows: TableMatrix,
    header_key: Option<String>,
    found_table: bool,
}

impl RowMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// True until some page has contributed a row.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether any page yielded a non-empty table, even one whose rows were
    /// all filtered out.
    pub fn found_table(&self) -> bool {
        self.found_table
    }

    pub fn rows(&self) -> &TableMatrix {
        &self.rows
    }

    /// Merge one page's rows. Returns how many rows were appended.
    pub fn push_page(&mut self, rows: &[Value]) -> usize {
        if rows.is_empty() {
            return 0;
        }
        self.found_table = true;

        let before = self.rows.len();
        for row in rows {
            let Some(cells) = row.as_array() else {
                continue;
            };
            self.push_row(cells.iter().map(cell_text).collect());
        }
        self.rows.len() - before
    }

    /// Apply the blank/header/normalise policy to one row of text cells.
    ///
    /// The repeated-header check compares the raw text against the stored
    /// (normalised) first row, so a row that only differs in whitespace is
    /// kept.
    fn push_row(&mut self, raw: Vec<String>) {
        if raw.iter().all(|cell| cell.trim().is_empty()) {
            return;
        }
        if self.header_key.as_deref() == Some(row_key(&raw).as_str()) {
            return;
        }

        let cells: Vec<String> = raw.iter().map(|c| normalize_cell(c)).collect();
        if self.header_key.is_none() {
            self.header_key = Some(row_key(&cells));
        }
        self.rows.push(cells);
    }

    /// Finish merging. Fails with [`Pdf2XlsxError::NoTableFound`] when no
    /// page produced a table or nothing survived filtering.
    pub fn finish(self) -> Result<TableMatrix, Pdf2XlsxError> {
        if !self.found_table || self.rows.is_empty() {
            return Err(Pdf2XlsxError::NoTableFound);
        }
        Ok(self.rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page(v: Value) -> Vec<Value> {
        v.as_array().cloned().unwrap()
    }

    #[test]
    fn two_page_header_is_deduplicated() {
        let mut m = RowMerger::new();
        m.push_page(&page(json!([["Name", "Amount"], ["A", "10"]])));
        m.push_page(&page(json!([["Name", "Amount"], ["B", "20"]])));
        assert_eq!(
            m.finish().unwrap(),
            vec![
                vec!["Name".to_string(), "Amount".to_string()],
                vec!["A".to_string(), "10".to_string()],
                vec!["B".to_string(), "20".to_string()],
            ]
        );
    }

    #[test]
    fn header_match_is_case_insensitive() {
        let mut m = RowMerger::new();
        m.push_page(&page(json!([["Name", "Amount"], ["A", "10"]])));
        assert_eq!(m.push_page(&page(json!([["NAME", "amount"], ["B", "20"]]))), 1);
        assert_eq!(m.len(), 3);
    }

    #[test]
    fn partial_overlap_with_header_is_kept() {
        let mut m = RowMerger::new();
        m.push_page(&page(json!([["Name", "Amount"]])));
        m.push_page(&page(json!([["Name", "Total"], ["Name", "Amount", ""]])));
        assert_eq!(m.len(), 3);
    }

    #[test]
    fn repeated_data_rows_are_kept() {
        let mut m = RowMerger::new();
        m.push_page(&page(json!([["h"], ["x"], ["x"]])));
        assert_eq!(m.len(), 3);
    }

    #[test]
    fn blank_rows_never_survive() {
        let mut m = RowMerger::new();
        let added = m.push_page(&page(json!([
            ["", "  ", "\n"],
            [null, null],
            [],
            ["Name", "Amount"],
            ["\t", ""],
            ["A", "10"]
        ])));
        assert_eq!(added, 2);
        assert!(m.rows().iter().all(|r| r.iter().any(|c| !c.is_empty())));
    }

    #[test]
    fn non_array_rows_are_skipped() {
        let mut m = RowMerger::new();
        let added = m.push_page(&page(json!(["loose string", {"a": 1}, 7, ["ok"]])));
        assert_eq!(added, 1);
        assert_eq!(m.rows()[0], vec!["ok".to_string()]);
    }

    #[test]
    fn cells_are_normalised() {
        let mut m = RowMerger::new();
        m.push_page(&page(json!([["  Total\r\n due ", "1 000", 42, true, null]])));
        assert_eq!(m.rows()[0], vec!["Total due", "1 000", "42", "true", ""]);
    }

    #[test]
    fn whitespace_variant_of_header_is_kept() {
        let mut m = RowMerger::new();
        m.push_page(&page(json!([["Unit price", "Qty"], ["1", "2"]])));
        let added = m.push_page(&page(json!([["Unit\nprice", "Qty"], ["3", "4"]])));
        assert_eq!(added, 2);
        assert_eq!(
            m.finish().unwrap(),
            vec![
                vec!["Unit price", "Qty"],
                vec!["1", "2"],
                vec!["Unit price", "Qty"],
                vec!["3", "4"],
            ]
        );
    }

    #[test]
    fn header_is_matched_against_its_normalised_form() {
        let mut m = RowMerger::new();
        m.push_page(&page(json!([["  Unit\nprice ", "Qty"]])));
        assert_eq!(m.push_page(&page(json!([["unit price", "QTY"], ["5", "6"]]))), 1);
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn normalisation_is_idempotent() {
        for raw in ["", "  a  b ", "x\n\ny", "\u{00a0}nbsp\u{00a0}", "tab\tsep", "plain"] {
            let once = normalize_cell(raw);
            assert_eq!(normalize_cell(&once), once, "raw={raw:?}");
        }
    }

    #[test]
    fn uneven_rows_are_preserved() {
        let mut m = RowMerger::new();
        m.push_page(&page(json!([["a", "b", "c"], ["1"], ["2", "3"]])));
        let rows = m.finish().unwrap();
        assert_eq!(rows.iter().map(Vec::len).collect::<Vec<_>>(), vec![3, 1, 2]);
    }

    #[test]
    fn empty_page_does_not_mark_found() {
        let mut m = RowMerger::new();
        assert_eq!(m.push_page(&[]), 0);
        assert!(!m.found_table());
        assert!(matches!(m.finish(), Err(Pdf2XlsxError::NoTableFound)));
    }

    #[test]
    fn table_of_only_blank_rows_fails() {
        let mut m = RowMerger::new();
        m.push_page(&page(json!([["", " "]])));
        assert!(m.found_table());
        assert!(m.is_empty());
        assert!(matches!(m.finish(), Err(Pdf2XlsxError::NoTableFound)));
    }
}
