//! Configuration for the ingestion and recommendation pipelines.
//!
//! All behaviour is controlled through [`LarderConfig`], built via its
//! [`LarderConfigBuilder`]. One struct holds every knob so a config can be
//! cloned into concurrent batch workers and printed for debugging.

use crate::error::LarderError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Characters the recognizer may emit: letters, digits, space, period, comma.
pub const DEFAULT_CHAR_WHITELIST: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789 .,";

/// Configuration for a [`crate::ingest::Pipeline`].
///
/// Built via [`LarderConfig::builder()`] or using [`LarderConfig::default()`].
///
/// # Example
/// ```rust
/// use larder::LarderConfig;
///
/// let config = LarderConfig::builder()
///     .model("gpt-4.1-nano")
///     .concurrency(2)
///     .archive_path("recipes.txt")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct LarderConfig {
    /// LLM model identifier. If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    ///
    /// Structuring is transcription, not writing; low temperature keeps the
    /// model from inventing fields the card does not contain.
    pub temperature: f32,

    /// Maximum tokens per completion. Default: 2048.
    pub max_tokens: usize,

    /// Per-completion timeout in seconds. Default: 60.
    pub completion_timeout_secs: u64,

    /// Image download timeout in seconds. Default: 30.
    pub fetch_timeout_secs: u64,

    /// Items in flight during batch reprocessing. Default: 4.
    pub concurrency: usize,

    /// Characters the recognizer is allowed to emit.
    pub char_whitelist: String,

    /// Which OCR engine turns a normalized image into text. Default: Tesseract.
    pub ocr_engine: OcrEngine,

    /// Path or name of the tesseract executable. Default: "tesseract".
    pub tesseract_binary: PathBuf,

    /// Tesseract language pack. Default: "eng".
    pub ocr_language: String,

    /// Append-only recipe archive. Default: "my_fav_recipes.txt".
    pub archive_path: PathBuf,

    /// Directory uploaded images are written to. Default: "data/image".
    pub image_dir: PathBuf,

    /// Base URL used to build public image references.
    pub public_base_url: String,

    /// Override for the structuring system prompt.
    pub structure_prompt: Option<String>,

    /// Override for the recommendation system prompt.
    pub recommend_prompt: Option<String>,

    /// Per-item events during batch reprocessing.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for LarderConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 2048,
            completion_timeout_secs: 60,
            fetch_timeout_secs: 30,
            concurrency: 4,
            char_whitelist: DEFAULT_CHAR_WHITELIST.to_string(),
            ocr_engine: OcrEngine::default(),
            tesseract_binary: PathBuf::from("tesseract"),
            ocr_language: "eng".to_string(),
            archive_path: PathBuf::from("my_fav_recipes.txt"),
            image_dir: PathBuf::from("data/image"),
            public_base_url: "http://localhost:5000".to_string(),
            structure_prompt: None,
            recommend_prompt: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for LarderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LarderConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("completion_timeout_secs", &self.completion_timeout_secs)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("concurrency", &self.concurrency)
            .field("ocr_engine", &self.ocr_engine)
            .field("archive_path", &self.archive_path)
            .field("image_dir", &self.image_dir)
            .field("public_base_url", &self.public_base_url)
            .finish()
    }
}

impl LarderConfig {
    /// Create a new builder for `LarderConfig`.
    pub fn builder() -> LarderConfigBuilder {
        LarderConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`LarderConfig`].
#[derive(Debug)]
pub struct LarderConfigBuilder {
    config: LarderConfig,
}

impl LarderConfigBuilder {
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

    pub fn completion_timeout_secs(mut self, secs: u64) -> Self {
        self.config.completion_timeout_secs = secs;
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn char_whitelist(mut self, chars: impl Into<String>) -> Self {
        self.config.char_whitelist = chars.into();
        self
    }

    pub fn ocr_engine(mut self, engine: OcrEngine) -> Self {
        self.config.ocr_engine = engine;
        self
    }

    pub fn tesseract_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tesseract_binary = path.into();
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn archive_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.archive_path = path.into();
        self
    }

    pub fn image_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.image_dir = path.into();
        self
    }

    pub fn public_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.public_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn structure_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.structure_prompt = Some(prompt.into());
        self
    }

    pub fn recommend_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.recommend_prompt = Some(prompt.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<LarderConfig, LarderError> {
        let c = &self.config;
        if c.completion_timeout_secs == 0 || c.fetch_timeout_secs == 0 {
            return Err(LarderError::InvalidConfig("Timeouts must be ≥ 1s".into()));
        }
        if c.char_whitelist.is_empty() {
            return Err(LarderError::InvalidConfig(
                "Character whitelist must not be empty".into(),
            ));
        }
        if c.ocr_language.trim().is_empty() {
            return Err(LarderError::InvalidConfig("OCR language must be set".into()));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// OCR engine used by the ingestion pipeline.
///
/// | Engine | Needs | Notes |
/// |--------|-------|-------|
/// | `Tesseract` | `tesseract` on PATH | Local, free, whitelist enforced by the engine |
/// | `Vision` | a vision-capable LLM | Better on handwriting; whitelist enforced afterwards |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrEngine {
    #[default]
    Tesseract,
    Vision,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = LarderConfig::default();
        assert_eq!(c.concurrency, 4);
        assert_eq!(c.char_whitelist, DEFAULT_CHAR_WHITELIST);
        assert_eq!(c.archive_path, PathBuf::from("my_fav_recipes.txt"));
        assert_eq!(c.ocr_engine, OcrEngine::Tesseract);
    }

    #[test]
    fn builder_clamps_concurrency() {
        let c = LarderConfig::builder().concurrency(0).build().unwrap();
        assert_eq!(c.concurrency, 1);
    }

    #[test]
    fn builder_rejects_zero_timeout() {
        let err = LarderConfig::builder()
            .completion_timeout_secs(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, LarderError::InvalidConfig(_)));
    }

    #[test]
    fn builder_trims_base_url() {
        let c = LarderConfig::builder()
            .public_base_url("https://cdn.example.org/")
            .build()
            .unwrap();
        assert_eq!(c.public_base_url, "https://cdn.example.org");
    }

    #[test]
    fn debug_hides_provider() {
        let dbg = format!("{:?}", LarderConfig::default());
        assert!(dbg.contains("LarderConfig"));
        assert!(!dbg.contains("char_whitelist"));
    }
}
