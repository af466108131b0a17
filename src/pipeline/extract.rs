//! Table extraction: one VLM call per page, decoded into a [`TableExtraction`].
//!
//! The model is asked for `{"table": [[...], ...]}` but answers in free text
//! more often than not: fenced code blocks, a sentence before the JSON, a
//! `tables` array instead of `table`. [`parse_table_response`] tolerates all
//! of that and never fails. Anything it cannot make sense of becomes
//! [`TableExtraction::Malformed`], which the merge stage treats exactly like
//! an empty page.
//!
//! Network errors, rate limits and timeouts are likewise caught here and
//! surface as [`TableExtraction::Failed`]. A single bad page never aborts the
//! document.

use crate::config::{ConversionConfig, DEFAULT_MODEL};
use crate::error::{PageError, Pdf2XlsxError};
use crate::prompts::table_prompt;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use image::DynamicImage;
use serde_json::Value;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of extracting one page.
#[derive(Debug, Clone)]
pub enum TableExtraction {
    /// A non-empty table. Rows are raw JSON values; shape checks happen in
    /// [`crate::pipeline::merge`].
    Table(Vec<Value>),
    /// The model reported that the page has no table.
    Empty,
    /// The response could not be decoded into a table.
    Malformed(String),
    /// The inference call itself failed.
    Failed(PageError),
}

impl TableExtraction {
    /// Rows of the table, if the page produced one.
    pub fn rows(&self) -> Option<&[Value]> {
        match self {
            TableExtraction::Table(rows) => Some(rows),
            _ => None,
        }
    }

    /// Short description of a non-table outcome, for logs and callbacks.
    pub fn reason(&self) -> String {
        match self {
            TableExtraction::Table(rows) => format!("{} rows", rows.len()),
            TableExtraction::Empty => "no table on page".to_string(),
            TableExtraction::Malformed(why) => format!("malformed response: {why}"),
            TableExtraction::Failed(e) => e.to_string(),
        }
    }
}

/// Extracts the table on one rasterised page.
#[async_trait]
pub trait TableExtractor: Send + Sync {
    /// `is_first_page` is true until some earlier page has contributed rows;
    /// it decides whether the model is asked to include the header row.
    async fn extract(
        &self,
        image: &DynamicImage,
        page_num: usize,
        is_first_page: bool,
    ) -> TableExtraction;
}

/// [`TableExtractor`] backed by an `edgequake-llm` vision provider.
pub struct VisionTableExtractor {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    timeout: Duration,
}

impl VisionTableExtractor {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ConversionConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
            timeout: config.api_timeout(),
        }
    }

    /// Resolve the provider from `config` and wrap it.
    pub fn from_config(config: &ConversionConfig) -> Result<Self, Pdf2XlsxError> {
        Ok(Self::new(resolve_provider(config)?, config))
    }
}

#[async_trait]
impl TableExtractor for VisionTableExtractor {
    async fn extract(
        &self,
        image: &DynamicImage,
        page_num: usize,
        is_first_page: bool,
    ) -> TableExtraction {
        let image_data = match encode_page(image) {
            Ok(data) => data,
            Err(e) => {
                return TableExtraction::Failed(PageError::EncodeFailed {
                    page: page_num,
                    detail: e.to_string(),
                })
            }
        };

        let messages = vec![ChatMessage::user_with_images(
            &table_prompt(is_first_page),
            vec![image_data],
        )];

        let call = self.provider.chat(&messages, Some(&self.options));
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(response)) => {
                debug!(
                    "Page {}: {} input tokens, {} output tokens, {} chars",
                    page_num,
                    response.prompt_tokens,
                    response.completion_tokens,
                    response.content.len()
                );
                let extraction = parse_table_response(&response.content);
                if let TableExtraction::Malformed(ref why) = extraction {
                    warn!("Page {}: response did not contain a table: {}", page_num, why);
                }
                extraction
            }
            Ok(Err(e)) => {
                let err = PageError::LlmFailed {
                    page: page_num,
                    detail: e.to_string(),
                };
                warn!("{}", err);
                TableExtraction::Failed(err)
            }
            Err(_) => {
                let err = PageError::Timeout {
                    page: page_num,
                    secs: self.timeout.as_secs(),
                };
                warn!("{}", err);
                TableExtraction::Failed(err)
            }
        }
    }
}

/// Decode a model response into a [`TableExtraction`].
///
/// Accepted shapes, in order of preference:
/// - `{"table": [[...], ...]}` with at least one row
/// - `{"tables": [[[...], ...], ...]}`, first table used
pub fn parse_table_response(content: &str) -> TableExtraction {
    let Some(candidate) = find_json_object(content) else {
        return TableExtraction::Malformed("no JSON object in response".to_string());
    };

    let parsed: Value = match serde_json::from_str(candidate) {
        Ok(v) => v,
        Err(e) => return TableExtraction::Malformed(format!("invalid JSON: {e}")),
    };

    let table = parsed.get("table").and_then(Value::as_array);
    if let Some(rows) = table.filter(|rows| !rows.is_empty()) {
        return TableExtraction::Table(rows.clone());
    }

    let tables = parsed.get("tables").and_then(Value::as_array);
    if let Some(first) = tables.and_then(|t| t.first()) {
        return match first.as_array() {
            Some(rows) if !rows.is_empty() => TableExtraction::Table(rows.clone()),
            Some(_) => TableExtraction::Empty,
            None => TableExtraction::Malformed("`tables[0]` is not an array".to_string()),
        };
    }

    if table.is_some() || tables.is_some() {
        TableExtraction::Empty
    } else {
        TableExtraction::Malformed("missing `table` field".to_string())
    }
}

/// Locate the first balanced `{...}` substring, skipping braces inside JSON
/// string literals.
pub fn find_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Encode a rasterised page as a base64 PNG ready for the VLM API.
///
/// PNG is lossless; JPEG artefacts on small table text hurt recognition.
fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(ImageData::new(STANDARD.encode(&buf), "image/png").with_detail("high"))
}

fn build_options(config: &ConversionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. pre-built `config.provider`
/// 2. `config.provider_name` (+ `config.model`)
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`
/// 4. `OPENAI_API_KEY`
/// 5. `ProviderFactory::from_env` auto-detection
///
/// An error here means the inference credential is not configured.
pub fn resolve_provider(config: &ConversionConfig) -> Result<Arc<dyn LLMProvider>, Pdf2XlsxError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);

    if let Some(ref name) = config.provider_name {
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_vision_provider(&prov, &env_model);
        }
    }

    if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        let model = config.model.as_deref().unwrap_or("gpt-4.1-mini");
        return create_vision_provider("openai", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Pdf2XlsxError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "no LLM provider could be auto-detected from the environment \
                 (set OPENAI_API_KEY, ANTHROPIC_API_KEY, or EDGEQUAKE_LLM_PROVIDER): {e}"
            ),
        })?;

    Ok(llm_provider)
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, Pdf2XlsxError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Pdf2XlsxError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_table_is_decoded() {
        let out = parse_table_response(r#"{"table": [["Name","Amount"],["A","10"]]}"#);
        assert_eq!(
            out.rows().unwrap(),
            &[json!(["Name", "Amount"]), json!(["A", "10"])]
        );
    }

    #[test]
    fn json_inside_prose_and_fences() {
        let text = "Here is the table:\n```json\n{\"table\": [[\"x\"]]}\n```\nLet me know!";
        assert_eq!(parse_table_response(text).rows().unwrap(), &[json!(["x"])]);
    }

    #[test]
    fn trailing_braces_after_object_are_ignored() {
        let text = r#"{"table": [["a"]]} and also {"note": 1}"#;
        assert_eq!(parse_table_response(text).rows().unwrap(), &[json!(["a"])]);
    }

    #[test]
    fn braces_inside_strings_do_not_unbalance() {
        let text = r#"{"table": [["{odd}", "\"quoted }\""]]}"#;
        let out = parse_table_response(text);
        assert_eq!(out.rows().unwrap(), &[json!(["{odd}", "\"quoted }\""])]);
    }

    #[test]
    fn tables_field_uses_first_table() {
        let out = parse_table_response(r#"{"tables": [[["h"],["v"]], [["other"]]]}"#);
        assert_eq!(out.rows().unwrap(), &[json!(["h"]), json!(["v"])]);
    }

    #[test]
    fn empty_table_is_empty_not_malformed() {
        assert!(matches!(parse_table_response(r#"{"table": []}"#), TableExtraction::Empty));
        assert!(matches!(parse_table_response(r#"{"tables": []}"#), TableExtraction::Empty));
        assert!(matches!(
            parse_table_response(r#"{"tables": [[]]}"#),
            TableExtraction::Empty
        ));
    }

    #[test]
    fn empty_table_falls_through_to_tables() {
        let out = parse_table_response(r#"{"table": [], "tables": [[["t"]]]}"#);
        assert_eq!(out.rows().unwrap(), &[json!(["t"])]);
    }

    #[test]
    fn garbage_is_malformed_never_panics() {
        for text in ["", "no json here", "{", "}{", r#"{"table": [["a"]"#, r#"{"rows": [[1]]}"#, "{not json}"] {
            let out = parse_table_response(text);
            assert!(
                matches!(out, TableExtraction::Malformed(_)),
                "{text:?} gave {out:?}"
            );
        }
    }

    #[test]
    fn find_json_object_handles_nesting() {
        let text = r#"prefix {"a": {"b": [1, {"c": 2}]}} suffix }"#;
        assert_eq!(find_json_object(text), Some(r#"{"a": {"b": [1, {"c": 2}]}}"#));
        assert_eq!(find_json_object("{ unterminated"), None);
    }

    #[test]
    fn build_options_defaults() {
        let opts = build_options(&ConversionConfig::default());
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(8000));
    }

    #[test]
    fn encode_small_image() {
        use image::{Rgba, RgbaImage};
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255])));
        let data = encode_page(&img).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert!(decoded.starts_with(&[0x89, b'P', b'N', b'G']));
    }
}
