//! Completion capability: the seam between the pipeline and an LLM.
//!
//! The structurer and the recommender only see the [`Completer`] trait. Each
//! [`crate::ingest::Pipeline`] is handed its own `Arc<dyn Completer>`, so
//! there is no process-wide client and tests can script responses.
//!
//! [`LlmCompleter`] is the production implementation over an
//! `edgequake-llm` provider. It applies the configured deadline to every
//! call and keeps the two failure modes apart: the deadline passing is
//! [`LarderError::Timeout`], the provider answering with an error is
//! [`LarderError::Completion`]. Nothing is retried here; retry policy
//! belongs to the caller.

use crate::config::LarderConfig;
use crate::error::LarderError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// A two-part text prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Anything that turns a prompt into free-form text.
///
/// An `Ok` with empty text is possible and means "answered with nothing";
/// callers classify that themselves.
#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(&self, prompt: &Prompt) -> Result<String, LarderError>;
}

/// [`Completer`] backed by an `edgequake-llm` provider.
#[derive(Clone)]
pub struct LlmCompleter {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    timeout_secs: u64,
}

impl LlmCompleter {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &LarderConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
            timeout_secs: config.completion_timeout_secs,
        }
    }

    pub fn provider(&self) -> &Arc<dyn LLMProvider> {
        &self.provider
    }
}

#[async_trait]
impl Completer for LlmCompleter {
    async fn complete(&self, prompt: &Prompt) -> Result<String, LarderError> {
        let messages = vec![
            ChatMessage::system(prompt.system.as_str()),
            ChatMessage::user(prompt.user.as_str()),
        ];

        let start = Instant::now();
        let response = with_timeout("completion", self.timeout_secs, async {
            self.provider
                .chat(&messages, Some(&self.options))
                .await
                .map_err(|e| LarderError::Completion {
                    detail: e.to_string(),
                })
        })
        .await?;

        debug!(
            "Completion: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        Ok(response.content)
    }
}

/// Run `fut` under a deadline, mapping expiry to [`LarderError::Timeout`].
pub async fn with_timeout<T, F>(operation: &str, secs: u64, fut: F) -> Result<T, LarderError>
where
    F: Future<Output = Result<T, LarderError>>,
{
    match tokio::time::timeout(Duration::from_secs(secs), fut).await {
        Ok(result) => result,
        Err(_) => Err(LarderError::Timeout {
            operation: operation.to_string(),
            secs,
        }),
    }
}

/// Build `CompletionOptions` from the config.
pub(crate) fn build_options(config: &LarderConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`); the factory reads
///    the matching API key from the environment.
/// 3. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`.
/// 4. **OpenAI** when `OPENAI_API_KEY` is set.
/// 5. **Full auto-detection** via `ProviderFactory::from_env`.
pub fn resolve_provider(config: &LarderConfig) -> Result<Arc<dyn LLMProvider>, LarderError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| LarderError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {e}"
            ),
        })?;

    Ok(llm_provider)
}

/// Model used when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, LarderError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        LarderError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}
