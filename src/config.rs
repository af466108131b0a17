//! Configuration types for PDF-to-spreadsheet conversion and the HTTP service.
//!
//! Conversion behaviour is controlled through [`ConversionConfig`], built via
//! its [`ConversionConfigBuilder`]. The service-level knobs (listen address,
//! job retention, progress polling) live in [`ServerConfig`].

use crate::error::Pdf2XlsxError;
use crate::messages::Locale;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Vision model used when a provider is named without a model.
pub const DEFAULT_MODEL: &str = "meta-llama/llama-4-scout-17b-16e-instruct";

/// Configuration for a PDF-to-XLSX conversion.
///
/// # Example
/// ```rust
/// use pdf2xlsx::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .dpi(200)
///     .model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 200);
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Rendering DPI used when rasterising each PDF page. Range: 72–400. Default: 144.
    ///
    /// 144 DPI is a 2× scale of the PDF's native 72 points per inch, enough
    /// for a vision model to read small table text.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// LLM model identifier. If None, uses [`DEFAULT_MODEL`] or the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for the LLM completion. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate per page. Default: 8000.
    ///
    /// A dense table page serialised as JSON easily exceeds 4 000 tokens;
    /// truncated output fails to decode and the page is lost.
    pub max_tokens: usize,

    /// Per-page inference timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Path to a pdfium shared library. Falls back to `PDFIUM_LIB_PATH`,
    /// then to the system library search path.
    pub pdfium_library: Option<PathBuf>,

    /// Page selection. Default: all pages.
    pub pages: PageSelection,

    /// Language of user-facing progress messages. Default: pt-BR.
    pub locale: Locale,

    /// Worksheet name. If None, a localised default is used.
    pub sheet_name: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            dpi: 144,
            max_rendered_pixels: 2000,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 8000,
            api_timeout_secs: 120,
            password: None,
            pdfium_library: None,
            pages: PageSelection::default(),
            locale: Locale::default(),
            sheet_name: None,
            download_timeout_secs: 120,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("pages", &self.pages)
            .field("locale", &self.locale)
            .field("sheet_name", &self.sheet_name)
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Worksheet name to use, falling back to the localised default.
    pub fn sheet_name(&self) -> &str {
        self.sheet_name
            .as_deref()
            .unwrap_or_else(|| self.locale.sheet_name())
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library = Some(path.into());
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn locale(mut self, locale: Locale) -> Self {
        self.config.locale = locale;
        self
    }

    pub fn sheet_name(mut self, name: impl Into<String>) -> Self {
        self.config.sheet_name = Some(name.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Pdf2XlsxError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(Pdf2XlsxError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(Pdf2XlsxError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if let Some(name) = &c.sheet_name {
            // Excel rejects these in sheet names and caps the length at 31.
            if name.is_empty()
                || name.chars().count() > 31
                || name.contains(['[', ']', ':', '*', '?', '/', '\\'])
            {
                return Err(Pdf2XlsxError::InvalidConfig(format!(
                    "Invalid sheet name '{name}'"
                )));
            }
        }
        Ok(self.config)
    }
}

/// Specifies which pages of the PDF to convert.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum PageSelection {
    /// Convert all pages (default).
    #[default]
    All,
    /// Convert a single page (1-indexed).
    Single(usize),
    /// Convert a contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Convert specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => (1..=total_pages)
                .contains(p)
                .then(|| vec![p - 1])
                .unwrap_or_default(),
            PageSelection::Range(start, end) => {
                ((*start).max(1) - 1..(*end).min(total_pages)).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| (1..=total_pages).contains(&p))
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

/// Settings for the HTTP service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Jobs whose last update is older than this are evicted. Default: 30 min.
    pub job_ttl_secs: u64,
    /// How often the eviction sweep runs. Default: 60 s.
    pub sweep_interval_secs: u64,
    /// How often the progress stream re-reads a job. Default: 500 ms.
    pub progress_poll_ms: u64,
    /// Idle interval between SSE keep-alive comments. Default: 15 s.
    pub keep_alive_secs: u64,
    /// Upload size cap in MiB. Default: 50.
    pub max_upload_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            job_ttl_secs: 30 * 60,
            sweep_interval_secs: 60,
            progress_poll_ms: 500,
            keep_alive_secs: 15,
            max_upload_mb: 50,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, Pdf2XlsxError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| {
                Pdf2XlsxError::InvalidConfig(format!(
                    "Invalid listen address {}:{}: {e}",
                    self.host, self.port
                ))
            })
    }

    pub fn job_ttl(&self) -> Duration {
        Duration::from_secs(self.job_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn progress_poll(&self) -> Duration {
        Duration::from_millis(self.progress_poll_ms.max(10))
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs.max(1))
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_clamps_dpi_and_temperature() {
        let c = ConversionConfig::builder()
            .dpi(10)
            .temperature(5.0)
            .build()
            .unwrap();
        assert_eq!(c.dpi, 72);
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn builder_rejects_bad_sheet_name() {
        let err = ConversionConfig::builder()
            .sheet_name("a/b")
            .build()
            .unwrap_err();
        assert!(matches!(err, Pdf2XlsxError::InvalidConfig(_)));
    }

    #[test]
    fn sheet_name_defaults_to_locale() {
        let c = ConversionConfig::builder().locale(Locale::En).build().unwrap();
        assert_eq!(c.sheet_name(), "Table");
        let c = ConversionConfig::default();
        assert_eq!(c.sheet_name(), "Tabela");
    }

    #[test]
    fn page_selection_to_indices() {
        assert_eq!(PageSelection::All.to_indices(3), vec![0, 1, 2]);
        assert_eq!(PageSelection::Single(3).to_indices(5), vec![2]);
        assert!(PageSelection::Single(6).to_indices(5).is_empty());
        assert_eq!(PageSelection::Range(2, 9).to_indices(4), vec![1, 2, 3]);
        assert_eq!(PageSelection::Set(vec![3, 1, 3]).to_indices(5), vec![0, 2]);
    }

    #[test]
    fn server_defaults_match_retention_window() {
        let s = ServerConfig::default();
        assert_eq!(s.job_ttl(), Duration::from_secs(1800));
        assert_eq!(s.sweep_interval(), Duration::from_secs(60));
        assert_eq!(s.progress_poll(), Duration::from_millis(500));
        assert_eq!(s.socket_addr().unwrap().port(), 3000);
    }
}
