//! Text recognition: normalized image → whitelisted text.
//!
//! Two engines sit behind [`TextRecognizer`]:
//!
//! * [`TesseractRecognizer`] shells out to the `tesseract` binary. The engine
//!   is started per call and exits when the call returns, so no recognizer
//!   state is shared between concurrent ingestions.
//! * [`VisionRecognizer`] asks a vision-capable LLM to transcribe the image.
//!
//! Either way the output passes through [`CharWhitelist::filter`], so the
//! text contract is the same regardless of engine: only whitelisted
//! characters, whitespace collapsed to single spaces, trimmed.
//!
//! Recognition failure is a *result*, not an error: an unreadable image
//! yields empty text. Only an engine that cannot be started at all is
//! reported as [`LarderError::RecognizerUnavailable`].

use crate::config::{LarderConfig, OcrEngine};
use crate::error::LarderError;
use crate::model::{NormalizedImage, RecognizedText};
use crate::pipeline::encode::encode_image;
use crate::pipeline::llm::{build_options, with_timeout};
use crate::prompts::OCR_SYSTEM_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// The set of characters a recognizer may emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharWhitelist {
    chars: BTreeSet<char>,
}

impl CharWhitelist {
    pub fn new(chars: &str) -> Self {
        Self {
            chars: chars.chars().collect(),
        }
    }

    pub fn contains(&self, c: char) -> bool {
        self.chars.contains(&c)
    }

    /// The whitelist as a string, in code-point order.
    pub fn as_string(&self) -> String {
        self.chars.iter().collect()
    }

    /// Restrict `raw` to the whitelist.
    ///
    /// Line breaks and tabs become spaces before filtering so words on
    /// adjacent lines do not fuse; everything else outside the set is
    /// dropped. Runs of spaces collapse to one and the result is trimmed.
    pub fn filter(&self, raw: &str) -> String {
        let mut out = String::with_capacity(raw.len());
        let mut pending_space = false;
        for c in raw.chars() {
            let c = if c.is_whitespace() { ' ' } else { c };
            if c == ' ' {
                pending_space = self.contains(' ');
                continue;
            }
            if !self.contains(c) {
                continue;
            }
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c);
        }
        out
    }
}

impl From<&LarderConfig> for CharWhitelist {
    fn from(config: &LarderConfig) -> Self {
        Self::new(&config.char_whitelist)
    }
}

/// Anything that turns a normalized image into text.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(
        &self,
        image: &NormalizedImage,
        whitelist: &CharWhitelist,
    ) -> Result<RecognizedText, LarderError>;
}

/// Build the recognizer selected by `config.ocr_engine`.
///
/// The vision engine needs a provider; pass the one the pipeline resolved.
pub fn recognizer_for(
    config: &LarderConfig,
    provider: Option<Arc<dyn LLMProvider>>,
) -> Result<Arc<dyn TextRecognizer>, LarderError> {
    match config.ocr_engine {
        OcrEngine::Tesseract => Ok(Arc::new(TesseractRecognizer::new(
            config.tesseract_binary.clone(),
            config.ocr_language.clone(),
        ))),
        OcrEngine::Vision => {
            let provider = provider.ok_or_else(|| LarderError::RecognizerUnavailable {
                detail: "vision OCR needs an LLM provider".to_string(),
            })?;
            Ok(Arc::new(VisionRecognizer::new(provider, config)))
        }
    }
}

// ── Tesseract ────────────────────────────────────────────────────────────

/// Local OCR via the `tesseract` command-line tool.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    binary: PathBuf,
    language: String,
}

impl TesseractRecognizer {
    pub fn new(binary: impl Into<PathBuf>, language: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            language: language.into(),
        }
    }
}

#[async_trait]
impl TextRecognizer for TesseractRecognizer {
    async fn recognize(
        &self,
        image: &NormalizedImage,
        whitelist: &CharWhitelist,
    ) -> Result<RecognizedText, LarderError> {
        // tesseract reads from a path; the temp file is removed on drop.
        let mut tmp = tempfile::Builder::new()
            .prefix("larder-ocr-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| LarderError::Internal(format!("Cannot create OCR temp file: {e}")))?;
        tmp.write_all(image.png())
            .and_then(|_| tmp.flush())
            .map_err(|e| LarderError::Internal(format!("Cannot write OCR temp file: {e}")))?;

        let output = tokio::process::Command::new(&self.binary)
            .arg(tmp.path())
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .arg("-c")
            .arg(format!("tessedit_char_whitelist={}", whitelist.as_string()))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| LarderError::RecognizerUnavailable {
                detail: format!("cannot run '{}': {e}", self.binary.display()),
            })?;

        if !output.status.success() {
            warn!(
                "tesseract exited with {} on {}: {}",
                output.status,
                image.source(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Ok(RecognizedText::default());
        }

        let text = whitelist.filter(&String::from_utf8_lossy(&output.stdout));
        debug!("tesseract: {} chars from {}", text.len(), image.source());
        Ok(RecognizedText { text })
    }
}

// ── Vision LLM ───────────────────────────────────────────────────────────

/// OCR via a vision-capable LLM.
#[derive(Clone)]
pub struct VisionRecognizer {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    timeout_secs: u64,
}

impl VisionRecognizer {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &LarderConfig) -> Self {
        let mut options = build_options(config);
        options.temperature = Some(0.0);
        Self {
            provider,
            options,
            timeout_secs: config.completion_timeout_secs,
        }
    }
}

#[async_trait]
impl TextRecognizer for VisionRecognizer {
    async fn recognize(
        &self,
        image: &NormalizedImage,
        whitelist: &CharWhitelist,
    ) -> Result<RecognizedText, LarderError> {
        let messages = vec![
            ChatMessage::system(OCR_SYSTEM_PROMPT),
            ChatMessage::user_with_images("", vec![encode_image(image)]),
        ];

        let response = with_timeout("vision OCR", self.timeout_secs, async {
            self.provider
                .chat(&messages, Some(&self.options))
                .await
                .map_err(|e| LarderError::Completion {
                    detail: e.to_string(),
                })
        })
        .await?;

        let text = whitelist.filter(&response.content);
        debug!("vision OCR: {} chars from {}", text.len(), image.source());
        Ok(RecognizedText { text })
    }
}
