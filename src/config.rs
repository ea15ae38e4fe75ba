//! Configuration for the order extraction pipeline.
//!
//! All behaviour is controlled through [`ExtractionConfig`], built once at
//! process start via its [`ExtractionConfigBuilder`] and passed by reference
//! to [`crate::process::process_order`]. The remote model client is part of
//! the configuration (either as a provider to wrap or as a ready
//! [`ExtractionService`]) rather than a process-wide global, so tests can
//! substitute a fake service and a fake PDF backend.

use crate::error::OrderError;
use crate::pipeline::backend::PdfBackend;
use crate::pipeline::service::ExtractionService;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Model used when neither the config nor the environment names one.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Provider used when only `ANTHROPIC_API_KEY` is available.
pub const DEFAULT_PROVIDER: &str = "anthropic";

/// Configuration for one or many order extraction runs.
///
/// # Example
/// ```rust
/// use edgequake_order2xml::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .dpi(200)
///     .include_page_text(true)
///     .model("claude-sonnet-4-20250514")
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 200);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Rendering DPI used when rasterising each PDF page. Range: 72–400. Default: 200.
    ///
    /// Order forms carry small print (article codes, postal codes) that
    /// vision models misread below ~150 DPI.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 4000.
    ///
    /// Caps oversized pages independently of DPI; the other dimension is
    /// scaled proportionally.
    pub max_rendered_pixels: u32,

    /// Also send the PDF's embedded text layer alongside the images. Default: false.
    pub include_page_text: bool,

    /// LLM model identifier. If None, [`DEFAULT_MODEL`] or `EDGEQUAKE_MODEL`.
    pub model: Option<String>,

    /// LLM provider name (e.g. "anthropic", "openai").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed extraction service. Takes precedence over every
    /// provider setting.
    pub service: Option<Arc<dyn ExtractionService>>,

    /// PDF backend. If None, pdfium is bound on each run.
    pub backend: Option<Arc<dyn PdfBackend>>,

    /// Maximum tokens the model may generate. Default: 4000.
    pub max_tokens: usize,

    /// Retry attempts on a transient service failure. Default: 2.
    ///
    /// Authentication failures are never retried.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 1000.
    pub retry_backoff_ms: u64,

    /// Timeout of a single model call in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Replacement for the built-in instruction document, sent verbatim.
    pub instructions: Option<String>,

    /// Receives stage events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            dpi: 200,
            max_rendered_pixels: 4000,
            include_page_text: false,
            model: None,
            provider_name: None,
            provider: None,
            service: None,
            backend: None,
            max_tokens: 4000,
            max_retries: 2,
            retry_backoff_ms: 1000,
            api_timeout_secs: 120,
            instructions: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("include_page_text", &self.include_page_text)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("service", &self.service.as_ref().map(|s| s.name()))
            .field("backend", &self.backend.as_ref().map(|_| "<dyn PdfBackend>"))
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("instructions", &self.instructions.as_ref().map(|s| s.len()))
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl fmt::Debug for ExtractionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ExtractionConfigBuilder")
            .field(&self.config)
            .finish()
    }
}

impl ExtractionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn include_page_text(mut self, v: bool) -> Self {
        self.config.include_page_text = v;
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

    pub fn service(mut self, service: Arc<dyn ExtractionService>) -> Self {
        self.config.service = Some(service);
        self
    }

    pub fn backend(mut self, backend: Arc<dyn PdfBackend>) -> Self {
        self.config.backend = Some(backend);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn instructions(mut self, text: impl Into<String>) -> Self {
        self.config.instructions = Some(text.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, OrderError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(OrderError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.max_tokens == 0 {
            return Err(OrderError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(OrderError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if let Some(ref text) = c.instructions {
            if text.trim().is_empty() {
                return Err(OrderError::InvalidConfig(
                    "instruction override is empty".into(),
                ));
            }
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = ExtractionConfig::default();
        assert_eq!(c.dpi, 200);
        assert_eq!(c.max_tokens, 4000);
        assert_eq!(c.max_retries, 2);
        assert!(!c.include_page_text);
        assert!(c.service.is_none());
    }

    #[test]
    fn builder_clamps_dpi() {
        let c = ExtractionConfig::builder().dpi(1200).build().unwrap();
        assert_eq!(c.dpi, 400);
        let c = ExtractionConfig::builder().dpi(10).build().unwrap();
        assert_eq!(c.dpi, 72);
    }

    #[test]
    fn zero_max_tokens_rejected() {
        let err = ExtractionConfig::builder().max_tokens(0).build().unwrap_err();
        assert!(matches!(err, OrderError::InvalidConfig(_)));
    }

    #[test]
    fn blank_instruction_override_rejected() {
        let err = ExtractionConfig::builder()
            .instructions("   \n")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("instruction"));
    }

    #[test]
    fn debug_redacts_trait_objects() {
        let c = ExtractionConfig::builder()
            .instructions("custom")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(dbg.contains("dpi: 200"));
        assert!(!dbg.contains("custom"), "instruction text leaked: {dbg}");
    }
}
