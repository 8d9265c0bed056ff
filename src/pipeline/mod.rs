//! Pipeline stages for recipe ingestion.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested alone and an engine can be swapped (Tesseract vs. vision OCR, a
//! scripted completer in tests) without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ normalize ──▶ recognize ──▶ structure ──▶ (archive / store)
//! (URL/path)  (greyscale,   (OCR +        (LLM → JSON
//!              Otsu)         whitelist)    → recipe)
//! ```
//!
//! 1. [`input`]: fetch the bytes behind a URL or local path
//! 2. [`normalize`]: greyscale, contrast stretch, binarize, orient; runs in
//!    `spawn_blocking` because it is pure CPU work
//! 3. [`recognize`]: OCR behind the [`recognize::TextRecognizer`] trait
//! 4. [`structure`]: one completion call plus strict parsing into a
//!    [`crate::model::StructuredRecipe`]
//!
//! [`llm`] holds the completion seam shared by the structurer and the
//! recommender; [`encode`] and [`postprocess`] are helpers for the vision
//! engine and for completion output respectively.

pub mod encode;
pub mod input;
pub mod llm;
pub mod normalize;
pub mod postprocess;
pub mod recognize;
pub mod structure;
