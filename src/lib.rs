//! # larder
//!
//! Turn recipe cards and typed recipes into structured records, and ask which
//! of them you can cook with what is in the pantry.
//!
//! ## Why this crate?
//!
//! Photographed recipe cards are noisy: uneven lighting, rotated phones,
//! handwriting. Plain OCR output is not a recipe. This crate cleans the photo
//! up deterministically, recognizes a constrained character set, and lets an
//! LLM map the text onto a fixed schema, then validates the result strictly
//! before anything is persisted. The same LLM seam then ranks stored recipes
//! against the available pantry items.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Ingestion                                  Query
//!  │                                          │
//!  ├─ 1. Input      URL or local path         ├─ 1. Snapshot  pantry items with qty > 0
//!  ├─ 2. Normalize  greyscale, stretch, Otsu  ├─ 2. Prompt    snapshot + corpus + request
//!  ├─ 3. Recognize  tesseract / vision LLM    ├─ 3. Complete  one LLM call
//!  ├─ 4. Structure  LLM → strict JSON parse   └─ 4. Reconcile drop unknown recipes, clamp,
//!  └─ 5. Persist    store, then archive                       sort by coverage
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use larder::{LarderConfig, MemoryStore, Pipeline};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = LarderConfig::default();
//!     let store = Arc::new(MemoryStore::new());
//!     let pipeline = Pipeline::from_config(config, store.clone())?;
//!
//!     let stored = pipeline.ingest_image("grandmas-scones.jpg").await?;
//!     println!("saved {} as #{}", stored.recipe.name, stored.id);
//!
//!     let answer = pipeline.recommend("something quick", store.as_ref()).await?;
//!     for m in &answer.matches {
//!         println!("{:>5.1}%  {}", m.coverage, m.recipe);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `larder` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod archive;
pub mod config;
pub mod error;
pub mod images;
pub mod ingest;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod recommend;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use archive::{parse_archive, ArchiveWriter, CorpusSink};
pub use config::{LarderConfig, LarderConfigBuilder, OcrEngine};
pub use error::{ErrorKind, ItemError, LarderError};
pub use images::{ImageStore, LocalImageStore};
pub use ingest::Pipeline;
pub use model::{
    BatchReport, Ingredient, IngredientPatch, InventorySnapshot, NewIngredient, RawImage,
    RecipeMatch, RecognizedText, RecommendationResult, StoredRecipe, StructuredRecipe,
};
pub use pipeline::llm::{Completer, LlmCompleter, Prompt};
pub use pipeline::recognize::{CharWhitelist, TesseractRecognizer, TextRecognizer, VisionRecognizer};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use store::{IngredientStore, MemoryStore, RecipeStore};
