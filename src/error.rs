//! Error types for the larder library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`LarderError`]: a single call failed (fetch, decode, completion,
//!   persistence …). Returned as `Err(LarderError)` from every fallible
//!   operation, with the failure kind preserved so the caller can decide
//!   whether to retry, discard, or flag the item for manual review.
//!
//! * [`ItemError`] is **non-fatal**: one item of a batch failed but its
//!   siblings are fine. Stored inside [`crate::model::BatchReport`] so a
//!   batch run always completes and reports every failure.
//!
//! Nothing in the library retries automatically. [`ErrorKind::is_transient`]
//! is advisory only.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All errors returned by the larder library.
#[derive(Debug, Error)]
pub enum LarderError {
    // ── Image source errors ──────────────────────────────────────────────
    /// Network or filesystem failure while fetching an image source.
    #[error("Failed to fetch '{source_ref}': {reason}")]
    Fetch { source_ref: String, reason: String },

    /// The image source does not exist (HTTP 404 or missing local file).
    #[error("Image source not found: '{source_ref}'")]
    NotFound { source_ref: String },

    /// Bytes were fetched but could not be decoded as an image.
    #[error("Could not decode image: {detail}")]
    Decode { detail: String },

    // ── Recognition errors ───────────────────────────────────────────────
    /// The OCR engine could not be started at all (binary missing etc.).
    ///
    /// A recognition *failure* is not an error: it yields empty text.
    #[error("Text recognizer unavailable: {detail}\nInstall tesseract or use --ocr-engine vision.")]
    RecognizerUnavailable { detail: String },

    // ── Completion errors ────────────────────────────────────────────────
    /// The completion capability failed or returned no text.
    #[error("Completion failed: {detail}")]
    Completion { detail: String },

    /// The completion returned text that is not well-formed structured data.
    #[error("Completion response is not a recipe payload: {detail}\nResponse starts with: {excerpt:?}")]
    SchemaParse { detail: String, excerpt: String },

    /// Well-formed data that violates the record invariants.
    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    /// The recommender could not produce a usable answer.
    #[error("Recommendation failed: {detail}")]
    Recommendation { detail: String },

    /// An external call exceeded its deadline.
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    // ── Storage errors ───────────────────────────────────────────────────
    /// Archive, image store or record store could not be written or read.
    #[error("Failed to persist to '{target}': {detail}")]
    Persistence { target: String, detail: String },

    /// A store lookup by id found nothing.
    #[error("{entity} {id} does not exist")]
    RecordNotFound { entity: &'static str, id: u64 },

    // ── Config errors ────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// The failure kind of a [`LarderError`], detached from its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Fetch,
    NotFound,
    Decode,
    RecognizerUnavailable,
    Completion,
    SchemaParse,
    Validation,
    Recommendation,
    Timeout,
    Persistence,
    RecordNotFound,
    Config,
    Internal,
}

impl ErrorKind {
    /// Whether a retry by the caller has a reasonable chance of succeeding.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Fetch | Self::Completion | Self::Timeout)
    }
}

impl LarderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Fetch { .. } => ErrorKind::Fetch,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Decode { .. } => ErrorKind::Decode,
            Self::RecognizerUnavailable { .. } => ErrorKind::RecognizerUnavailable,
            Self::Completion { .. } => ErrorKind::Completion,
            Self::SchemaParse { .. } => ErrorKind::SchemaParse,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Recommendation { .. } => ErrorKind::Recommendation,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Persistence { .. } => ErrorKind::Persistence,
            Self::RecordNotFound { .. } => ErrorKind::RecordNotFound,
            Self::ProviderNotConfigured { .. } | Self::InvalidConfig(_) => ErrorKind::Config,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn persistence(target: impl std::fmt::Display, detail: impl std::fmt::Display) -> Self {
        Self::Persistence {
            target: target.to_string(),
            detail: detail.to_string(),
        }
    }
}

/// A non-fatal error for a single batch item.
///
/// Stored in [`crate::model::BatchReport::failed`]; the rest of the batch
/// continues regardless.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("Item {index} ({source_ref}): {message}")]
pub struct ItemError {
    /// 0-based position of the item in the batch input.
    pub index: usize,
    /// The recipe name or image reference identifying the item.
    pub source_ref: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl ItemError {
    pub fn new(index: usize, source_ref: impl Into<String>, err: &LarderError) -> Self {
        Self {
            index,
            source_ref: source_ref.into(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
