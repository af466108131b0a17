//! Pipeline stages for PDF-to-spreadsheet conversion.
//!
//! Each submodule implements exactly one transformation step so each can be
//! tested alone and swapped behind its trait.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ extract ──▶ merge ──▶ workbook
//! (bytes)   (pdfium)   (VLM JSON)  (dedupe)  (xlsx)
//! ```
//!
//! 1. [`input`]    : load a path or URL into memory and check the `%PDF` magic
//! 2. [`render`]   : rasterise selected pages; runs in `spawn_blocking`
//!    because pdfium is not async-safe
//! 3. [`extract`]  : one VLM call per page, decoded into a
//!    [`extract::TableExtraction`]; failures never leave this stage
//! 4. [`merge`]    : fold page tables into one row sequence, dropping blank
//!    rows and repeated headers
//! 5. [`workbook`] : lay the rows out as a formatted sheet and serialise

pub mod extract;
pub mod input;
pub mod merge;
pub mod render;
pub mod workbook;
