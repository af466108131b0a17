use crate::config::{ConversionConfig, ServerConfig};
use crate::convert::Converter;
use crate::error::Pdf2XlsxError;
use crate::jobs::JobStore;
use crate::messages::Locale;
use std::sync::Arc;
use tracing::warn;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub jobs: JobStore,
    /// `Err` carries the reason no inference provider could be resolved.
    converter: Result<Arc<Converter>, String>,
    pub config: ServerConfig,
    pub locale: Locale,
}

impl AppState {
    pub fn new(converter: Arc<Converter>, config: ServerConfig) -> Self {
        Self {
            jobs: JobStore::new(config.job_ttl()),
            locale: converter.config().locale,
            converter: Ok(converter),
            config,
        }
    }

    /// State for a service that accepts requests but cannot convert.
    /// Uploads are answered with 500 until restarted with a provider.
    pub fn without_converter(reason: impl Into<String>, locale: Locale, config: ServerConfig) -> Self {
        Self {
            jobs: JobStore::new(config.job_ttl()),
            converter: Err(reason.into()),
            config,
            locale,
        }
    }

    /// Resolve the provider once at startup. A missing credential is not
    /// fatal: the service still serves health checks and reports the problem
    /// per upload.
    pub fn from_config(conversion: ConversionConfig, config: ServerConfig) -> Self {
        let locale = conversion.locale;
        match Converter::from_config(conversion) {
            Ok(converter) => Self::new(Arc::new(converter), config),
            Err(e) => {
                warn!("Conversions disabled: {}", e);
                Self::without_converter(e.to_string(), locale, config)
            }
        }
    }

    pub fn converter(&self) -> Result<Arc<Converter>, Pdf2XlsxError> {
        self.converter
            .as_ref()
            .map(Arc::clone)
            .map_err(|reason| Pdf2XlsxError::ProviderNotConfigured {
                provider: "auto".to_string(),
                hint: reason.clone(),
            })
    }

    pub fn can_convert(&self) -> bool {
        self.converter.is_ok()
    }
}
