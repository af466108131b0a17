//! Prompts for VLM-based table extraction.
//!
//! The instruction set fixes the response contract: a single JSON object
//! `{"table": [[...], ...]}` where each inner array is one table row. The
//! decoder in [`crate::pipeline::extract`] depends on that shape.

/// Instruction block sent with every page image.
///
/// `{header_rule}` is replaced by [`HEADER_RULE_FIRST_PAGE`] or
/// [`HEADER_RULE_CONTINUATION`].
pub const TABLE_EXTRACTION_PROMPT: &str = r#"Analyse this image of a PDF page and extract the table.

INSTRUCTIONS:
1. Identify the table in the image
2. Extract ALL rows and columns of the table
3. {header_rule}
4. Each table row = one row in the result
5. Separate every column correctly
6. Preserve all values (numbers, text, currency, dates)
7. Do not insert line breaks inside cells. Return continuous text (a single string per cell). Visual wrapping is applied by the column width in the spreadsheet.
8. Return JSON: {"table": [["col1","col2"],["val1","val2"]]}
9. If there is no visible table, return: {"table": []}

IMPORTANT: Extract the data EXACTLY as it appears in the image."#;

/// Header rule for the first page that contributes rows.
pub const HEADER_RULE_FIRST_PAGE: &str = "Include the header row";

/// Header rule once a header has already been captured.
pub const HEADER_RULE_CONTINUATION: &str = "Do NOT include headers (they were already extracted)";

/// Build the extraction prompt for one page.
pub fn table_prompt(is_first_page: bool) -> String {
    let rule = if is_first_page {
        HEADER_RULE_FIRST_PAGE
    } else {
        HEADER_RULE_CONTINUATION
    };
    TABLE_EXTRACTION_PROMPT.replace("{header_rule}", rule)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_page_asks_for_header() {
        let p = table_prompt(true);
        assert!(p.contains(HEADER_RULE_FIRST_PAGE));
        assert!(!p.contains("{header_rule}"));
    }

    #[test]
    fn continuation_page_omits_header() {
        let p = table_prompt(false);
        assert!(p.contains(HEADER_RULE_CONTINUATION));
        assert!(p.contains(r#"{"table": []}"#));
    }
}
