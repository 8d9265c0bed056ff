//! Pipeline orchestration: ingestion, batch reprocessing and recommendation.
//!
//! A [`Pipeline`] owns its collaborators as trait objects: completion,
//! recognition, the corpus archive and the recipe store. Nothing is global,
//! so two pipelines with different providers can run side by side and tests
//! can plug in scripted fakes.
//!
//! Persistence order on the ingestion path is fixed: nothing is written until
//! structuring fully succeeded, then the record is appended to the archive and
//! only after that created in the recipe store. The archive is a log that
//! tolerates repeats, so a caller retrying after a failed append never leaves
//! duplicate rows in the keyed store.

use crate::archive::{ArchiveWriter, CorpusSink};
use crate::config::LarderConfig;
use crate::error::{ItemError, LarderError};
use crate::images::{ImageStore, LocalImageStore};
use crate::model::{
    BatchReport, InventorySnapshot, RawImage, RecognizedText, RecommendationResult,
    StoredRecipe, StructuredRecipe,
};
use crate::pipeline::llm::{resolve_provider, Completer, LlmCompleter};
use crate::pipeline::recognize::{recognizer_for, CharWhitelist, TextRecognizer};
use crate::pipeline::{input, normalize, structure};
use crate::prompts::RECIPE_SCHEMA;
use crate::recommend;
use crate::store::{IngredientStore, RecipeStore};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// The ingestion and query paths, wired to their collaborators.
pub struct Pipeline {
    config: LarderConfig,
    completer: Arc<dyn Completer>,
    recognizer: Arc<dyn TextRecognizer>,
    corpus: Arc<dyn CorpusSink>,
    recipes: Arc<dyn RecipeStore>,
    local_images: Option<LocalImageStore>,
    whitelist: CharWhitelist,
}

impl Pipeline {
    pub fn new(
        config: LarderConfig,
        completer: Arc<dyn Completer>,
        recognizer: Arc<dyn TextRecognizer>,
        corpus: Arc<dyn CorpusSink>,
        recipes: Arc<dyn RecipeStore>,
    ) -> Self {
        let whitelist = CharWhitelist::from(&config);
        Self {
            config,
            completer,
            recognizer,
            corpus,
            recipes,
            local_images: None,
            whitelist,
        }
    }

    /// Wire a pipeline from configuration alone: resolve the LLM provider,
    /// pick the OCR engine and open the archive at `config.archive_path`.
    pub fn from_config(
        config: LarderConfig,
        recipes: Arc<dyn RecipeStore>,
    ) -> Result<Self, LarderError> {
        let provider = resolve_provider(&config)?;
        let completer = Arc::new(LlmCompleter::new(Arc::clone(&provider), &config));
        let recognizer = recognizer_for(&config, Some(provider))?;
        let corpus = Arc::new(ArchiveWriter::new(config.archive_path.clone()));
        let images = LocalImageStore::new(config.image_dir.clone(), config.public_base_url.clone());

        Ok(Self::new(config, completer, recognizer, corpus, recipes).with_local_images(images))
    }

    /// Let image references produced by `images` be read straight from disk.
    pub fn with_local_images(mut self, images: LocalImageStore) -> Self {
        self.local_images = Some(images);
        self
    }

    pub fn config(&self) -> &LarderConfig {
        &self.config
    }

    // ── Ingestion ────────────────────────────────────────────────────────

    /// Fetch, normalize and recognize the image behind `source`.
    pub async fn extract_text(&self, source: &str) -> Result<RecognizedText, LarderError> {
        let location = match self.local_images {
            Some(ref images) => images.resolve(source),
            None => source.to_string(),
        };
        let raw = input::fetch_image(&location, self.config.fetch_timeout_secs).await?;
        self.recognize_raw(raw).await
    }

    async fn recognize_raw(&self, raw: RawImage) -> Result<RecognizedText, LarderError> {
        let start = Instant::now();
        let normalized = normalize::normalize_image(raw).await?;
        let text = self
            .recognizer
            .recognize(&normalized, &self.whitelist)
            .await?;
        debug!(
            "Recognized {} chars from {} in {:?}",
            text.as_str().len(),
            normalized.source(),
            start.elapsed()
        );
        Ok(text)
    }

    /// Structure recognized text, refusing text too short to be a recipe.
    async fn structure_recognized(
        &self,
        text: &RecognizedText,
        image_reference: &str,
    ) -> Result<StructuredRecipe, LarderError> {
        if text.needs_manual_entry() {
            return Err(LarderError::validation(
                "sourceText",
                format!("recognized text is too short; enter the recipe for {image_reference} manually"),
            ));
        }
        let recipe = self.structure_text(text.as_str()).await?;
        Ok(recipe.with_image_reference(image_reference))
    }

    async fn structure_text(&self, text: &str) -> Result<StructuredRecipe, LarderError> {
        structure::structure(
            self.completer.as_ref(),
            text,
            RECIPE_SCHEMA,
            self.config.structure_prompt.as_deref(),
        )
        .await
    }

    /// Archive, then store, a fully structured recipe.
    async fn persist(&self, recipe: StructuredRecipe) -> Result<StoredRecipe, LarderError> {
        self.corpus.append(&recipe).await?;
        let stored = self.recipes.create(recipe).await?;
        info!("Ingested recipe {} '{}'", stored.id, stored.recipe.name);
        Ok(stored)
    }

    /// Ingest a photographed recipe card from a URL or local path.
    pub async fn ingest_image(&self, source: &str) -> Result<StoredRecipe, LarderError> {
        info!("Ingesting image: {}", source);
        let text = self.extract_text(source).await?;
        let recipe = self.structure_recognized(&text, source).await?;
        self.persist(recipe).await
    }

    /// Store an uploaded image, then ingest it with the stored reference.
    pub async fn ingest_upload(
        &self,
        bytes: Vec<u8>,
        original_filename: &str,
        images: &dyn ImageStore,
    ) -> Result<StoredRecipe, LarderError> {
        let reference = images.save(&bytes, original_filename).await?;
        info!("Ingesting upload {} as {}", original_filename, reference);
        let text = self.recognize_raw(RawImage::new(reference.clone(), bytes)).await?;
        let recipe = self.structure_recognized(&text, &reference).await?;
        self.persist(recipe).await
    }

    /// Ingest recipe text typed or pasted by the user.
    pub async fn ingest_text(
        &self,
        text: &str,
        image_reference: Option<&str>,
    ) -> Result<StoredRecipe, LarderError> {
        let mut recipe = self.structure_text(text).await?;
        if let Some(reference) = image_reference.filter(|r| !r.trim().is_empty()) {
            recipe = recipe.with_image_reference(reference);
        }
        self.persist(recipe).await
    }

    // ── Batch ────────────────────────────────────────────────────────────

    /// Re-extract every stored recipe that has an image and append the fresh
    /// records to the archive.
    ///
    /// Always completes: per-item failures are collected in
    /// [`BatchReport::failed`] with their kind, in store order.
    pub async fn reprocess_corpus(&self) -> Result<BatchReport, LarderError> {
        let stored = self.recipes.list().await?;
        let total = stored.len();
        let work: Vec<(usize, String)> = stored
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.recipe.image_reference.clone().map(|r| (i, r)))
            .collect();
        let skipped = total - work.len();
        let to_run = work.len();
        info!("Reprocessing {} of {} recipes ({} without image)", to_run, total, skipped);

        let cb = self.config.progress_callback.clone();
        if let Some(ref cb) = cb {
            cb.on_batch_start(to_run);
        }

        let mut outcomes: Vec<(usize, String, Result<StructuredRecipe, LarderError>)> =
            stream::iter(work.into_iter().enumerate().map(|(pos, (index, reference))| {
                let cb = cb.clone();
                async move {
                    if let Some(ref cb) = cb {
                        cb.on_item_start(pos, to_run);
                    }
                    let result = self.reprocess_one(&reference).await;
                    if let Some(ref cb) = cb {
                        match &result {
                            Ok(recipe) => cb.on_item_complete(pos, to_run, &recipe.name),
                            Err(e) => cb.on_item_error(pos, to_run, &e.to_string()),
                        }
                    }
                    (index, reference, result)
                }
            }))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;
        outcomes.sort_by_key(|(index, _, _)| *index);

        let mut report = BatchReport {
            total,
            skipped,
            ..Default::default()
        };
        for (index, reference, result) in outcomes {
            match result {
                Ok(recipe) => report.succeeded.push(recipe),
                Err(e) => {
                    warn!("Item {} ({}) failed: {}", index, reference, e);
                    report.failed.push(ItemError::new(index, reference, &e));
                }
            }
        }

        if let Some(ref cb) = cb {
            cb.on_batch_complete(to_run, report.succeeded.len());
        }
        info!(
            "Reprocessed {} recipes: {} ok, {} failed",
            to_run,
            report.succeeded.len(),
            report.failed.len()
        );
        Ok(report)
    }

    async fn reprocess_one(&self, reference: &str) -> Result<StructuredRecipe, LarderError> {
        let text = self.extract_text(reference).await?;
        let recipe = self.structure_recognized(&text, reference).await?;
        self.corpus.append(&recipe).await?;
        Ok(recipe)
    }

    // ── Query ────────────────────────────────────────────────────────────

    /// Answer `request` from the current pantry and the stored recipes.
    pub async fn recommend(
        &self,
        request: &str,
        ingredients: &dyn IngredientStore,
    ) -> Result<RecommendationResult, LarderError> {
        let inventory = InventorySnapshot::from_ingredients(ingredients.list().await?);
        let corpus: Vec<StructuredRecipe> = self
            .recipes
            .list()
            .await?
            .into_iter()
            .map(|s| s.recipe)
            .collect();

        recommend::recommend(
            self.completer.as_ref(),
            request,
            &inventory,
            &corpus,
            self.config.recommend_prompt.as_deref(),
        )
        .await
    }
}
