//! Extraction service: composed request → raw model text.
//!
//! [`ExtractionService`] is the seam between the pipeline and the remote
//! model. The production implementation, [`LlmExtractionService`], wraps an
//! `edgequake_llm` provider; tests plug in a fake.
//!
//! ## Retry Strategy
//!
//! Rate limits (429), overloads (529/503) and dropped connections are
//! transient. They are retried with exponential backoff
//! (`retry_backoff_ms * 2^(attempt-1)`): 1 s → 2 s with the defaults.
//! Authentication failures are permanent and returned immediately. An empty
//! reply is returned as [`OrderError::EmptyResponse`] without retrying, since
//! the model did answer.

use crate::config::{ExtractionConfig, DEFAULT_MODEL, DEFAULT_PROVIDER};
use crate::error::OrderError;
use crate::pipeline::compose::{ExtractionRequest, Segment};
use crate::prompts::PAGE_TEXT_HEADING;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use once_cell::sync::Lazy;
use regex::Regex;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// Raw answer of the remote model. Never modified after this point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionResult {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    /// Attempts made, including the successful one.
    pub attempts: u32,
}

/// Anything that can turn an [`ExtractionRequest`] into text.
#[async_trait]
pub trait ExtractionService: Send + Sync {
    async fn extract(&self, request: &ExtractionRequest) -> Result<ExtractionResult, OrderError>;

    /// Label used in logs and error messages.
    fn name(&self) -> String;
}

/// Bounded retry settings for one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub timeout_secs: u64,
}

impl RetryPolicy {
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_ms: config.retry_backoff_ms,
            timeout_secs: config.api_timeout_secs,
        }
    }

    /// Delay before attempt `attempt` (1-based retry counter).
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(
            self.backoff_ms
                .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1))),
        )
    }
}

/// How a failed call should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Auth,
    Transient,
}

/// Status-shaped 401/403 (`HTTP 401`, `status: 403`, `status code 401`),
/// so digits inside request ids or token counts do not match.
static RE_AUTH_STATUS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:http|status(?:[ _]?code)?)\s*[:=]?\s*40[13]\b").unwrap()
});

/// Classify a provider error message.
///
/// `edgequake_llm` surfaces HTTP failures as text, so the status and the
/// provider's wording are all there is to go on.
pub fn classify_failure(message: &str) -> FailureClass {
    let m = message.to_ascii_lowercase();
    const AUTH_MARKERS: &[&str] = &[
        "unauthorized",
        "forbidden",
        "invalid api key",
        "invalid x-api-key",
        "invalid_api_key",
        "authentication",
        "permission_error",
    ];
    if RE_AUTH_STATUS.is_match(&m) || AUTH_MARKERS.iter().any(|k| m.contains(k)) {
        FailureClass::Auth
    } else {
        FailureClass::Transient
    }
}

enum CallFailure {
    Timeout,
    Failed(String),
}

/// Run `call` until it succeeds, fails permanently, or retries run out.
///
/// Returns the value and the number of attempts made.
pub async fn call_with_retry<T, F, Fut>(
    provider: &str,
    policy: &RetryPolicy,
    mut call: F,
) -> Result<(T, u32), OrderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, String>>,
{
    let mut last: Option<CallFailure> = None;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            let wait = policy.backoff(attempt);
            warn!(
                "{}: retry {}/{} after {}ms",
                provider,
                attempt,
                policy.max_retries,
                wait.as_millis()
            );
            sleep(wait).await;
        }

        match timeout(Duration::from_secs(policy.timeout_secs), call()).await {
            Ok(Ok(value)) => return Ok((value, attempt + 1)),
            Ok(Err(message)) => {
                if classify_failure(&message) == FailureClass::Auth {
                    return Err(OrderError::AuthError {
                        provider: provider.to_string(),
                        detail: message,
                    });
                }
                warn!("{}: attempt {} failed: {}", provider, attempt + 1, message);
                last = Some(CallFailure::Failed(message));
            }
            Err(_) => {
                warn!(
                    "{}: attempt {} timed out after {}s",
                    provider,
                    attempt + 1,
                    policy.timeout_secs
                );
                last = Some(CallFailure::Timeout);
            }
        }
    }

    let attempts = policy.max_retries + 1;
    Err(match last {
        Some(CallFailure::Timeout) => OrderError::ApiTimeout {
            secs: policy.timeout_secs,
        },
        Some(CallFailure::Failed(message)) => OrderError::LlmApiError { attempts, message },
        None => OrderError::Internal("no extraction attempt was made".to_string()),
    })
}

/// [`ExtractionService`] backed by an `edgequake_llm` provider.
pub struct LlmExtractionService {
    provider: Arc<dyn LLMProvider>,
    label: String,
    max_tokens: usize,
    policy: RetryPolicy,
}

impl LlmExtractionService {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            label: label.into(),
            max_tokens: config.max_tokens,
            policy: RetryPolicy::from_config(config),
        }
    }

    /// Temperature is pinned to zero.
    pub fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(0.0),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

/// Translate segments into chat messages, preserving their order.
///
/// Leading instruction segments and every image form the first user turn;
/// page text and auxiliary content follow as separate user turns.
pub fn build_messages(request: &ExtractionRequest) -> Vec<ChatMessage> {
    let mut lead = Vec::new();
    let mut images = Vec::new();
    let mut trailing = Vec::new();

    for segment in &request.segments {
        match segment {
            Segment::Instruction(text) => lead.push(text.as_str()),
            Segment::Image(page) => images.push(page.to_image_data()),
            Segment::PageText(text) => trailing.push(format!("{PAGE_TEXT_HEADING}\n\n{text}")),
            Segment::Auxiliary { description, text } => {
                trailing.push(format!("{description}\n\n{text}"))
            }
        }
    }

    let mut messages = vec![
        ChatMessage::system(request.instructions.as_str()),
        ChatMessage::user_with_images(&lead.join("\n\n"), images),
    ];
    messages.extend(trailing.iter().map(|text| ChatMessage::user(text)));
    messages
}

#[async_trait]
impl ExtractionService for LlmExtractionService {
    async fn extract(&self, request: &ExtractionRequest) -> Result<ExtractionResult, OrderError> {
        let messages = build_messages(request);
        let options = self.options();
        let start = Instant::now();

        let provider = &self.provider;
        let (messages, options) = (&messages, &options);
        let (response, attempts) = call_with_retry(&self.label, &self.policy, || async move {
            provider
                .chat(messages, Some(options))
                .await
                .map_err(|e| e.to_string())
        })
        .await?;

        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            self.label,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        if response.content.trim().is_empty() {
            return Err(OrderError::EmptyResponse {
                provider: self.label.clone(),
            });
        }

        Ok(ExtractionResult {
            text: response.content,
            input_tokens: response.prompt_tokens,
            output_tokens: response.completion_tokens,
            attempts,
        })
    }

    fn name(&self) -> String {
        self.label.clone()
    }
}

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, OrderError> {
    ProviderFactory::create_llm_provider(name, model).map_err(|e| OrderError::ProviderNotConfigured {
        provider: name.to_string(),
        hint: format!("{e}"),
    })
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Resolve the extraction service, from most-specific to least-specific:
///
/// 1. `config.service`, used as-is
/// 2. `config.provider`, wrapped
/// 3. `config.provider_name` + model
/// 4. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`
/// 5. `ANTHROPIC_API_KEY` present → Anthropic with [`DEFAULT_MODEL`]
/// 6. `ProviderFactory::from_env` auto-detection
pub fn resolve_service(config: &ExtractionConfig) -> Result<Arc<dyn ExtractionService>, OrderError> {
    if let Some(ref service) = config.service {
        return Ok(Arc::clone(service));
    }

    let model = config
        .model
        .clone()
        .or_else(|| non_empty_env("EDGEQUAKE_MODEL"))
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    let (provider, label) = if let Some(ref provider) = config.provider {
        (Arc::clone(provider), format!("custom/{model}"))
    } else if let Some(ref name) = config.provider_name {
        (create_provider(name, &model)?, format!("{name}/{model}"))
    } else if let (Some(name), Some(env_model)) = (
        non_empty_env("EDGEQUAKE_LLM_PROVIDER"),
        non_empty_env("EDGEQUAKE_MODEL"),
    ) {
        let model = config.model.clone().unwrap_or(env_model);
        (create_provider(&name, &model)?, format!("{name}/{model}"))
    } else if non_empty_env("ANTHROPIC_API_KEY").is_some() {
        (
            create_provider(DEFAULT_PROVIDER, &model)?,
            format!("{DEFAULT_PROVIDER}/{model}"),
        )
    } else {
        let (llm, _embedding) =
            ProviderFactory::from_env().map_err(|e| OrderError::ProviderNotConfigured {
                provider: "auto".to_string(),
                hint: format!(
                    "No LLM provider could be auto-detected from environment.\n\
                     Set ANTHROPIC_API_KEY, or name a provider with --provider.\n\
                     Error: {}",
                    e
                ),
            })?;
        (llm, "auto".to_string())
    };

    info!("Using extraction service {}", label);
    Ok(Arc::new(LlmExtractionService::new(provider, label, config)))
}
