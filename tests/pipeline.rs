//! Hermetic integration tests for the ingestion and recommendation paths.
//!
//! The LLM and the OCR engine are replaced by scripted fakes, and every
//! file lives in a temp directory, so these run offline and in parallel.

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use larder::{
    ArchiveWriter, BatchProgressCallback, CharWhitelist, Completer, CorpusSink, ErrorKind,
    ImageStore,
    IngredientStore, LarderConfig, LarderError, LocalImageStore, MemoryStore, NewIngredient,
    Pipeline, Prompt, RecipeStore, RecognizedText, StructuredRecipe, TextRecognizer,
};
use larder::model::NormalizedImage;
use std::collections::VecDeque;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Test doubles ─────────────────────────────────────────────────────────

/// Replies from a queue; records every prompt it receives.
#[derive(Default)]
struct ScriptedCompleter {
    replies: Mutex<VecDeque<Result<String, LarderError>>>,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedCompleter {
    fn replying(replies: impl IntoIterator<Item = &'static str>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.to_string())).collect()),
            prompts: Mutex::default(),
        })
    }

    fn failing(err: LarderError) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::from([Err(err)])),
            prompts: Mutex::default(),
        })
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn last_prompt(&self) -> Prompt {
        self.prompts.lock().unwrap().last().cloned().expect("no prompt recorded")
    }
}

#[async_trait]
impl Completer for ScriptedCompleter {
    async fn complete(&self, prompt: &Prompt) -> Result<String, LarderError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()))
    }
}

/// "Recognizes" a fixed text, still filtered through the whitelist.
struct FakeRecognizer {
    text: String,
    calls: AtomicUsize,
}

impl FakeRecognizer {
    fn reading(text: &str) -> Arc<Self> {
        Arc::new(Self {
            text: text.to_string(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl TextRecognizer for FakeRecognizer {
    async fn recognize(
        &self,
        image: &NormalizedImage,
        whitelist: &CharWhitelist,
    ) -> Result<RecognizedText, LarderError> {
        assert!(!image.png().is_empty());
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(RecognizedText {
            text: whitelist.filter(&self.text),
        })
    }
}

#[derive(Default)]
struct CountingProgress {
    started: AtomicUsize,
    completed: AtomicUsize,
    errored: AtomicUsize,
    batch_total: AtomicUsize,
}

impl BatchProgressCallback for CountingProgress {
    fn on_batch_start(&self, total: usize) {
        self.batch_total.store(total, Ordering::SeqCst);
    }
    fn on_item_start(&self, _index: usize, _total: usize) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }
    fn on_item_complete(&self, _index: usize, _total: usize, _name: &str) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_item_error(&self, _index: usize, _total: usize, _error: &str) {
        self.errored.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────

struct Fixture {
    dir: tempfile::TempDir,
    store: Arc<MemoryStore>,
    pipeline: Pipeline,
    completer: Arc<ScriptedCompleter>,
    recognizer: Arc<FakeRecognizer>,
}

impl Fixture {
    fn new(completer: Arc<ScriptedCompleter>, ocr_text: &str) -> Self {
        Self::with_config(completer, ocr_text, LarderConfig::default())
    }

    fn with_config(completer: Arc<ScriptedCompleter>, ocr_text: &str, config: LarderConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let recognizer = FakeRecognizer::reading(ocr_text);
        let archive = Arc::new(ArchiveWriter::new(dir.path().join("recipes.txt")));
        let pipeline = Pipeline::new(
            config,
            completer.clone(),
            recognizer.clone(),
            archive,
            store.clone(),
        );
        Self {
            dir,
            store,
            pipeline,
            completer,
            recognizer,
        }
    }

    fn archive_path(&self) -> PathBuf {
        self.dir.path().join("recipes.txt")
    }

    fn archive_text(&self) -> String {
        std::fs::read_to_string(self.archive_path()).unwrap_or_default()
    }

    fn write_card(&self, name: &str) -> String {
        let path = self.dir.path().join(name);
        std::fs::write(&path, card_png()).unwrap();
        path.to_string_lossy().into_owned()
    }
}

fn card_png() -> Vec<u8> {
    let img = RgbImage::from_fn(32, 20, |x, y| {
        if (6..12).contains(&y) && x % 2 == 0 {
            Rgb([40, 40, 40])
        } else {
            Rgb([230, 225, 210])
        }
    });
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

const PANCAKES_JSON: &str = r#"{"name":"Pancakes","description":"Fluffy","prepTimeMinutes":"20 minutes","difficultyLevel":"Easy"}"#;

// ── Ingestion ────────────────────────────────────────────────────────────

#[tokio::test]
async fn image_ingestion_archives_then_stores() {
    let fx = Fixture::new(
        ScriptedCompleter::replying([PANCAKES_JSON]),
        "Pancakes\nflour, eggs, milk",
    );
    let source = fx.write_card("card.png");

    let stored = fx.pipeline.ingest_image(&source).await.unwrap();
    assert_eq!(stored.id, 1);
    assert_eq!(stored.recipe.name, "Pancakes");
    assert_eq!(stored.recipe.prep_time_minutes, Some(20));
    assert_eq!(stored.recipe.image_reference.as_deref(), Some(source.as_str()));

    // The whitelist-filtered OCR text is what reaches the structurer.
    assert!(fx
        .completer
        .last_prompt()
        .user
        .contains("Pancakes flour, eggs, milk"));

    let archive = fx.archive_text();
    assert!(archive.contains("=== Recipe: Pancakes ==="));
    assert!(archive.contains("Preparation Time: 20 minutes"));
}

#[tokio::test]
async fn too_little_text_skips_completion_and_persists_nothing() {
    let fx = Fixture::new(ScriptedCompleter::replying([PANCAKES_JSON]), "~~ ab ~~");
    let source = fx.write_card("blurry.png");

    let err = fx.pipeline.ingest_image(&source).await.unwrap_err();
    assert!(
        matches!(err, LarderError::Validation { ref field, .. } if field == "sourceText"),
        "got {err:?}"
    );
    assert_eq!(fx.completer.calls(), 0);
    assert!(RecipeStore::list(fx.store.as_ref()).await.unwrap().is_empty());
    assert!(!fx.archive_path().exists());
}

#[tokio::test]
async fn malformed_reply_persists_nothing() {
    let fx = Fixture::new(
        ScriptedCompleter::replying(["Sorry, that card is unreadable."]),
        "Pancakes flour eggs milk",
    );
    let source = fx.write_card("card.png");

    let err = fx.pipeline.ingest_image(&source).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaParse);
    assert!(RecipeStore::list(fx.store.as_ref()).await.unwrap().is_empty());
    assert!(!fx.archive_path().exists());
}

#[tokio::test]
async fn nameless_reply_is_validation_and_persists_nothing() {
    let fx = Fixture::new(
        ScriptedCompleter::replying([r#"{"description":"something tasty"}"#]),
        "Pancakes flour eggs milk",
    );
    let err = fx
        .pipeline
        .ingest_text("something tasty with flour", None)
        .await
        .unwrap_err();
    assert!(matches!(err, LarderError::Validation { ref field, .. } if field == "name"));
    assert!(!fx.archive_path().exists());
}

#[tokio::test]
async fn missing_image_is_not_found() {
    let fx = Fixture::new(ScriptedCompleter::replying([]), "unused text here");
    let missing = fx.dir.path().join("nope.jpg");
    let err = fx
        .pipeline
        .ingest_image(&missing.to_string_lossy())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(fx.recognizer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn corrupt_image_is_decode_error() {
    let fx = Fixture::new(ScriptedCompleter::replying([]), "unused text here");
    let path = fx.dir.path().join("broken.jpg");
    std::fs::write(&path, b"\xFF\xD8\xFF garbage").unwrap();
    let err = fx
        .pipeline
        .ingest_image(&path.to_string_lossy())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Decode);
}

#[tokio::test]
async fn text_ingestion_renders_placeholders_for_name_only_recipe() {
    let fx = Fixture::new(ScriptedCompleter::replying([r#"{"name":"Tea"}"#]), "");
    let stored = fx
        .pipeline
        .ingest_text("Tea. Boil water, add leaves.", None)
        .await
        .unwrap();
    assert_eq!(stored.recipe.name, "Tea");
    assert_eq!(stored.recipe.image_reference, None);

    let archive = fx.archive_text();
    assert!(archive.contains("Preparation Time: Not specified"));
    assert!(archive.contains("Difficulty Level: Not specified"));
}

#[tokio::test]
async fn upload_is_stored_and_referenced() {
    let fx = Fixture::new(
        ScriptedCompleter::replying([PANCAKES_JSON]),
        "Pancakes flour eggs milk",
    );
    let images = LocalImageStore::new(fx.dir.path().join("image"), "http://localhost:5000");

    let stored = fx
        .pipeline
        .ingest_upload(card_png(), "IMG_0042.PNG", &images)
        .await
        .unwrap();
    let reference = stored.recipe.image_reference.clone().unwrap();
    assert!(reference.starts_with("http://localhost:5000/image/"));
    assert!(reference.ends_with(".png"));

    let on_disk = images.resolve(&reference);
    assert!(Path::new(&on_disk).exists());
}

#[tokio::test]
async fn failing_image_store_is_persistence_error() {
    struct Broken;
    #[async_trait]
    impl ImageStore for Broken {
        async fn save(&self, _: &[u8], _: &str) -> Result<String, LarderError> {
            Err(LarderError::Persistence {
                target: "image".into(),
                detail: "disk full".into(),
            })
        }
    }

    let fx = Fixture::new(ScriptedCompleter::replying([PANCAKES_JSON]), "Pancakes flour");
    let err = fx
        .pipeline
        .ingest_upload(card_png(), "card.png", &Broken)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Persistence);
    assert_eq!(fx.completer.calls(), 0);
}

#[tokio::test]
async fn failed_archive_append_leaves_store_untouched() {
    struct FullDisk;
    #[async_trait]
    impl CorpusSink for FullDisk {
        async fn append(&self, _: &StructuredRecipe) -> Result<(), LarderError> {
            Err(LarderError::Persistence {
                target: "archive".into(),
                detail: "disk full".into(),
            })
        }
    }

    let store = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::new(
        LarderConfig::default(),
        ScriptedCompleter::replying([r#"{"name":"Tea"}"#, r#"{"name":"Tea"}"#]),
        FakeRecognizer::reading(""),
        Arc::new(FullDisk),
        store.clone(),
    );

    // A caller retrying after the failure must not pile up store rows.
    for _ in 0..2 {
        let err = pipeline
            .ingest_text("Tea. Boil water.", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Persistence);
    }
    assert!(RecipeStore::list(store.as_ref()).await.unwrap().is_empty());
}

// ── Batch reprocessing ───────────────────────────────────────────────────

#[tokio::test]
async fn reprocess_continues_past_failures_and_reports_every_item() {
    let progress = Arc::new(CountingProgress::default());
    let config = LarderConfig::builder()
        .concurrency(2)
        .progress_callback(progress.clone())
        .build()
        .unwrap();
    let fx = Fixture::with_config(
        ScriptedCompleter::replying([PANCAKES_JSON]),
        "Pancakes flour eggs milk",
        config,
    );

    let good = fx.write_card("good.png");
    let gone = fx.dir.path().join("gone.png").to_string_lossy().into_owned();
    for recipe in [
        StructuredRecipe::named("Pancakes").unwrap().with_image_reference(&good),
        StructuredRecipe::named("Lost").unwrap().with_image_reference(&gone),
        StructuredRecipe::named("Typed").unwrap(),
    ] {
        RecipeStore::create(fx.store.as_ref(), recipe).await.unwrap();
    }

    let report = fx.pipeline.reprocess_corpus().await.unwrap();
    assert_eq!(report.total, 3);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(report.succeeded[0].image_reference.as_deref(), Some(good.as_str()));
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].index, 1);
    assert_eq!(report.failed[0].kind, ErrorKind::NotFound);
    assert!(!report.is_clean());

    assert_eq!(progress.batch_total.load(Ordering::SeqCst), 2);
    assert_eq!(progress.started.load(Ordering::SeqCst), 2);
    assert_eq!(progress.completed.load(Ordering::SeqCst), 1);
    assert_eq!(progress.errored.load(Ordering::SeqCst), 1);

    let archived = ArchiveWriter::new(fx.archive_path()).read_all().await.unwrap();
    assert_eq!(archived.len(), 1);
}

#[tokio::test]
async fn reprocess_with_zero_concurrency_still_runs_items() {
    let config = LarderConfig {
        concurrency: 0,
        ..LarderConfig::default()
    };
    let fx = Fixture::with_config(
        ScriptedCompleter::replying([PANCAKES_JSON]),
        "Pancakes flour eggs milk",
        config,
    );
    let card = fx.write_card("card.png");
    RecipeStore::create(
        fx.store.as_ref(),
        StructuredRecipe::named("Pancakes").unwrap().with_image_reference(&card),
    )
    .await
    .unwrap();

    let report = fx.pipeline.reprocess_corpus().await.unwrap();
    assert_eq!(report.succeeded.len(), 1);
    assert!(report.failed.is_empty());
}

// ── Recommendation ───────────────────────────────────────────────────────

async fn stock(store: &MemoryStore, items: &[(&str, f64)]) {
    let batch = items
        .iter()
        .map(|(n, q)| NewIngredient::new(*n, *q, "g"))
        .collect();
    store.create_batch(batch).await.unwrap();
}

#[tokio::test]
async fn bread_with_flour_but_no_water() {
    let fx = Fixture::new(
        ScriptedCompleter::replying([r#"```json
{"summary":"Bread is within reach.","recommendations":[
  {"recipe":"Bread","coverage":"50%","missingIngredients":["water"],"substitutions":["milk for water"]},
  {"recipe":"Cake","coverage":10,"missingIngredients":["eggs","sugar"]}
]}
```"#]),
        "",
    );
    stock(&fx.store, &[("flour", 2000.0)]).await;
    let mut bread = StructuredRecipe::named("Bread").unwrap();
    bread.instructions = Some("Mix flour and water, knead, rest, then bake.".into());
    RecipeStore::create(fx.store.as_ref(), bread).await.unwrap();

    let answer = fx
        .pipeline
        .recommend("what can I make?", fx.store.as_ref())
        .await
        .unwrap();

    let prompt = fx.completer.last_prompt().user;
    assert!(prompt.contains("flour"));
    assert!(prompt.contains("Mix flour and water, knead, rest, then bake."));
    assert!(prompt.contains("what can I make?"));

    assert_eq!(answer.inventory.len(), 1);
    assert_eq!(answer.summary, "Bread is within reach.");
    // "Cake" is not in the corpus and is dropped.
    assert_eq!(answer.matches.len(), 1);
    assert_eq!(answer.matches[0].recipe, "Bread");
    assert!(answer.matches[0].coverage < 100.0);
    assert!(answer.matches[0]
        .missing_ingredients
        .iter()
        .any(|m| m == "water"));
}

#[tokio::test]
async fn zero_quantity_items_stay_out_of_the_prompt() {
    let fx = Fixture::new(
        ScriptedCompleter::replying([
            r#"{"summary":"ok","recommendations":[{"recipe":"Bread","coverage":50,"missingIngredients":["yeast"]}]}"#,
        ]),
        "",
    );
    stock(&fx.store, &[("flour", 500.0), ("saffron", 0.0)]).await;
    RecipeStore::create(fx.store.as_ref(), StructuredRecipe::named("Bread").unwrap())
        .await
        .unwrap();

    let answer = fx
        .pipeline
        .recommend("what can I bake?", fx.store.as_ref())
        .await
        .unwrap();

    let prompt = fx.completer.last_prompt().user;
    assert!(!prompt.contains("saffron"), "zero-quantity item leaked: {prompt}");
    assert_eq!(answer.inventory.len(), 1);
    assert_eq!(answer.matches[0].missing_ingredients, ["yeast"]);
}

#[tokio::test]
async fn empty_corpus_answers_without_calling_the_model() {
    let fx = Fixture::new(ScriptedCompleter::replying([]), "");
    stock(&fx.store, &[("flour", 500.0)]).await;

    let answer = fx
        .pipeline
        .recommend("anything", fx.store.as_ref())
        .await
        .unwrap();
    assert_eq!(answer.summary, "No recipes available.");
    assert!(answer.matches.is_empty());
    assert_eq!(fx.completer.calls(), 0);
}

#[tokio::test]
async fn empty_pantry_reports_zero_coverage() {
    let fx = Fixture::new(
        ScriptedCompleter::replying([
            r#"{"summary":"You need to shop.","recommendations":[{"recipe":"Bread","coverage":80,"missingIngredients":["flour"]}]}"#,
        ]),
        "",
    );
    RecipeStore::create(fx.store.as_ref(), StructuredRecipe::named("Bread").unwrap())
        .await
        .unwrap();

    let answer = fx
        .pipeline
        .recommend("bread", fx.store.as_ref())
        .await
        .unwrap();
    assert!(fx.completer.last_prompt().user.contains("(empty: nothing is available)"));
    assert_eq!(answer.matches[0].coverage, 0.0);
}

#[tokio::test]
async fn empty_reply_is_recommendation_error_not_empty_list() {
    let fx = Fixture::new(ScriptedCompleter::replying(["   "]), "");
    RecipeStore::create(fx.store.as_ref(), StructuredRecipe::named("Bread").unwrap())
        .await
        .unwrap();
    let err = fx
        .pipeline
        .recommend("bread", fx.store.as_ref())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Recommendation);
}

#[tokio::test]
async fn completion_timeout_stays_a_timeout() {
    let fx = Fixture::new(
        ScriptedCompleter::failing(LarderError::Timeout {
            operation: "completion".into(),
            secs: 60,
        }),
        "",
    );
    RecipeStore::create(fx.store.as_ref(), StructuredRecipe::named("Bread").unwrap())
        .await
        .unwrap();
    let err = fx
        .pipeline
        .recommend("bread", fx.store.as_ref())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
}

#[test]
fn provider_failure_becomes_recommendation_error() {
    let fx = Fixture::new(
        ScriptedCompleter::failing(LarderError::Completion {
            detail: "HTTP 503".into(),
        }),
        "",
    );
    let err = tokio_test::block_on(async {
        RecipeStore::create(fx.store.as_ref(), StructuredRecipe::named("Bread").unwrap())
            .await
            .unwrap();
        fx.pipeline.recommend("bread", fx.store.as_ref()).await
    })
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Recommendation);
    assert!(err.to_string().contains("HTTP 503"));
}
