//! CLI binary for larder.
//!
//! A thin shim over the library crate: flags map onto `LarderConfig`, the
//! pantry and recipe records live in one JSON snapshot (`--store`), and
//! results print as text or, with `--json`, as JSON.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use larder::pipeline::recognize::recognizer_for;
use larder::pipeline::{input, llm, normalize};
use larder::{
    ArchiveWriter, BatchProgressCallback, CharWhitelist, IngredientPatch, IngredientStore,
    LarderConfig, LocalImageStore, MemoryStore, NewIngredient, OcrEngine, Pipeline, RecipeStore,
};
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────

/// Progress bar for `recipe reprocess`. Items finish out of order, so
/// per-item start times are keyed by index.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} recipes  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
        bar.set_style(style);
        bar.set_prefix("Reprocessing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Re-extracting {total} recipes…"))
        ));
    }

    fn on_item_start(&self, index: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
    }

    fn on_item_complete(&self, index: usize, total: usize, recipe_name: &str) {
        let secs = self.elapsed_secs(index);
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {:<32}  {}",
            green("✓"),
            index + 1,
            total,
            recipe_name,
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_item_error(&self, index: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(index);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            let mut s: String = error.chars().take(79).collect();
            s.push('…');
            s
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            red("✗"),
            index + 1,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let failed = total.saturating_sub(success_count);
        self.bar.finish_and_clear();
        if failed == 0 {
            eprintln!("{} {} recipes re-extracted", green("✔"), bold(&success_count.to_string()));
        } else {
            eprintln!(
                "{} {}/{} recipes re-extracted  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Stock the pantry
  larder pantry add flour 500 g --category baking --expiry 2026-12-01
  larder pantry import groceries.json

  # Ingest a photographed recipe card, a pasted recipe, or an upload
  larder recipe ingest-image card.jpg
  larder recipe ingest-text "Pancakes: flour, eggs, milk. Whisk and fry. 20 minutes."
  larder recipe upload ~/Downloads/IMG_0042.jpg

  # Just run OCR (no API key needed with tesseract)
  larder ocr card.jpg

  # Ask what to cook
  larder recommend something quick and sweet
  larder --json recommend dinner for two > answer.json

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  RUST_LOG                Override log filter
"#;

/// Ingest recipe cards and recommend what to cook from your pantry.
#[derive(Parser, Debug)]
#[command(
    name = "larder",
    version,
    about = "Ingest recipe cards and recommend what to cook from your pantry",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// JSON snapshot holding pantry and recipe records.
    #[arg(long, global = true, env = "LARDER_STORE", default_value = "larder.json")]
    store: PathBuf,

    /// Append-only recipe archive.
    #[arg(long, global = true, env = "LARDER_ARCHIVE", default_value = "my_fav_recipes.txt")]
    archive: PathBuf,

    /// Directory for uploaded images.
    #[arg(long, global = true, env = "LARDER_IMAGE_DIR", default_value = "data/image")]
    image_dir: PathBuf,

    /// Base URL used in stored image references.
    #[arg(long, global = true, env = "SERVER_URL", default_value = "http://localhost:5000")]
    public_url: String,

    /// LLM model ID (e.g. gpt-4.1-nano, claude-sonnet-4-20250514).
    #[arg(long, global = true, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, global = true, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// OCR engine.
    #[arg(long, global = true, env = "LARDER_OCR_ENGINE", value_enum, default_value = "tesseract")]
    ocr_engine: OcrEngineArg,

    /// Tesseract language code.
    #[arg(long, global = true, env = "LARDER_OCR_LANGUAGE", default_value = "eng")]
    ocr_language: String,

    /// Recipes re-extracted at once by `recipe reprocess`.
    #[arg(short, long, global = true, env = "LARDER_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Per-call LLM timeout in seconds.
    #[arg(long, global = true, env = "LARDER_COMPLETION_TIMEOUT", default_value_t = 60)]
    completion_timeout: u64,

    /// Image download timeout in seconds.
    #[arg(long, global = true, env = "LARDER_FETCH_TIMEOUT", default_value_t = 30)]
    fetch_timeout: u64,

    /// Print JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "LARDER_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "LARDER_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum OcrEngineArg {
    Tesseract,
    Vision,
}

impl From<OcrEngineArg> for OcrEngine {
    fn from(v: OcrEngineArg) -> Self {
        match v {
            OcrEngineArg::Tesseract => OcrEngine::Tesseract,
            OcrEngineArg::Vision => OcrEngine::Vision,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage pantry ingredients.
    #[command(subcommand)]
    Pantry(PantryCommand),

    /// Ingest, list and reprocess recipes.
    #[command(subcommand)]
    Recipe(RecipeCommand),

    /// Run OCR on an image and print the recognized text.
    Ocr {
        /// Local image path or HTTP/HTTPS URL.
        source: String,
    },

    /// Recommend recipes for a free-form request.
    Recommend {
        #[arg(required = true, num_args = 1..)]
        request: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
enum PantryCommand {
    /// Add one ingredient.
    Add {
        name: String,
        quantity: f64,
        unit: Option<String>,
        #[arg(long)]
        category: Option<String>,
        /// YYYY-MM-DD or RFC 3339.
        #[arg(long)]
        expiry: Option<String>,
    },
    /// Add every ingredient in a JSON array file, all or nothing.
    Import { file: PathBuf },
    /// Change quantity, unit or expiry of an ingredient.
    Update {
        id: u64,
        #[arg(long, allow_hyphen_values = true)]
        quantity: Option<f64>,
        #[arg(long)]
        unit: Option<String>,
        /// YYYY-MM-DD or RFC 3339; empty string clears it.
        #[arg(long)]
        expiry: Option<String>,
    },
    /// List ingredients.
    List {
        /// Include items with zero or negative quantity.
        #[arg(long)]
        all: bool,
    },
}

#[derive(Subcommand, Debug)]
enum RecipeCommand {
    /// OCR and structure a recipe card from a path or URL.
    IngestImage { source: String },
    /// Structure typed recipe text (from arguments or --file).
    IngestText {
        #[arg(conflicts_with = "file")]
        text: Vec<String>,
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long)]
        image_reference: Option<String>,
    },
    /// Store an image under the image directory, then ingest it.
    Upload { path: PathBuf },
    /// List stored recipes.
    List,
    /// Print the records in the recipe archive.
    Archive,
    /// Re-extract every stored recipe that has an image.
    Reprocess {
        /// Disable the progress bar.
        #[arg(long)]
        no_progress: bool,
    },
}

/// True when the command draws a progress bar.
fn shows_progress(cli: &Cli) -> bool {
    match &cli.command {
        Command::Recipe(RecipeCommand::Reprocess { no_progress }) => {
            !cli.global.quiet && !no_progress && !cli.global.json
        }
        _ => false,
    }
}

/// Default log level. Library INFO logs are held back while the progress
/// bar is drawn; `--verbose` always wins.
fn log_filter(cli: &Cli) -> &'static str {
    if cli.global.verbose {
        "debug"
    } else if cli.global.quiet || shows_progress(cli) {
        "error"
    } else {
        "info"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let g = &cli.global;

    // ── Logging setup ────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(log_filter(&cli))),
        )
        .with_writer(io::stderr)
        .init();

    let store = Arc::new(
        MemoryStore::open(&g.store)
            .await
            .with_context(|| format!("Cannot open store {}", g.store.display()))?,
    );

    match &cli.command {
        Command::Pantry(cmd) => pantry(cmd, g, &store).await?,
        Command::Recipe(cmd) => recipe(cmd, g, &store).await?,
        Command::Ocr { source } => ocr(source, g).await?,
        Command::Recommend { request } => {
            let pipeline = build_pipeline(g, &store, None)?;
            let answer = pipeline
                .recommend(&request.join(" "), store.as_ref())
                .await
                .context("Recommendation failed")?;
            if g.json {
                print_json(&answer)?;
            } else {
                println!("{}\n", bold(&answer.summary));
                for m in &answer.matches {
                    println!("{:>5.1}%  {}", m.coverage, bold(&m.recipe));
                    if !m.missing_ingredients.is_empty() {
                        println!("        missing: {}", m.missing_ingredients.join(", "));
                    }
                    for s in &m.substitutions {
                        println!("        {}", dim(s));
                    }
                }
            }
        }
    }
    Ok(())
}

fn config_from(g: &GlobalArgs, progress: Option<Arc<CliProgressCallback>>) -> Result<LarderConfig> {
    let mut builder = LarderConfig::builder()
        .ocr_engine(g.ocr_engine.into())
        .ocr_language(g.ocr_language.clone())
        .concurrency(g.concurrency)
        .completion_timeout_secs(g.completion_timeout)
        .fetch_timeout_secs(g.fetch_timeout)
        .archive_path(g.archive.clone())
        .image_dir(g.image_dir.clone())
        .public_base_url(g.public_url.clone());
    if let Some(ref m) = g.model {
        builder = builder.model(m.clone());
    }
    if let Some(ref p) = g.provider {
        builder = builder.provider_name(p.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    Ok(builder.build()?)
}

fn build_pipeline(
    g: &GlobalArgs,
    store: &Arc<MemoryStore>,
    progress: Option<Arc<CliProgressCallback>>,
) -> Result<Pipeline> {
    let config = config_from(g, progress)?;
    let recipes: Arc<dyn RecipeStore> = store.clone();
    Pipeline::from_config(config, recipes).context("Cannot set up the LLM pipeline")
}

async fn save(store: &MemoryStore, g: &GlobalArgs) -> Result<()> {
    store
        .save(&g.store)
        .await
        .with_context(|| format!("Cannot save store {}", g.store.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn pantry(cmd: &PantryCommand, g: &GlobalArgs, store: &Arc<MemoryStore>) -> Result<()> {
    match cmd {
        PantryCommand::Add {
            name,
            quantity,
            unit,
            category,
            expiry,
        } => {
            let mut item = NewIngredient::new(name.clone(), *quantity, unit.clone().unwrap_or_default());
            if let Some(c) = category {
                item = item.with_category(c.clone());
            }
            if let Some(e) = expiry {
                item = item.with_expiry(e.clone());
            }
            let created = IngredientStore::create(store.as_ref(), item).await?;
            save(store, g).await?;
            if g.json {
                print_json(&created)?;
            } else if !g.quiet {
                eprintln!("{} added #{} {}", green("✔"), created.id, created.name);
            }
        }
        PantryCommand::Import { file } => {
            let text = tokio::fs::read_to_string(file)
                .await
                .with_context(|| format!("Cannot read {}", file.display()))?;
            let items: Vec<NewIngredient> = serde_json::from_str(&text)
                .with_context(|| format!("{} is not a JSON array of ingredients", file.display()))?;
            let created = store.create_batch(items).await?;
            save(store, g).await?;
            if g.json {
                print_json(&created)?;
            } else if !g.quiet {
                eprintln!("{} imported {} ingredients", green("✔"), created.len());
            }
        }
        PantryCommand::Update {
            id,
            quantity,
            unit,
            expiry,
        } => {
            let patch = IngredientPatch {
                quantity: *quantity,
                unit: unit.clone(),
                expiry_date: expiry.clone(),
            };
            if patch.is_empty() {
                bail!("Nothing to update: pass --quantity, --unit or --expiry");
            }
            let updated = store.update(*id, patch).await?;
            save(store, g).await?;
            if g.json {
                print_json(&updated)?;
            } else if !g.quiet {
                eprintln!("{} updated #{} {}", green("✔"), updated.id, updated.name);
            }
        }
        PantryCommand::List { all } => {
            let items: Vec<_> = IngredientStore::list(store.as_ref())
                .await?
                .into_iter()
                .filter(|i| *all || i.is_available())
                .collect();
            if g.json {
                print_json(&items)?;
            } else {
                for i in &items {
                    let expiry = i
                        .expiry_date
                        .map(|d| format!("  expires {d}"))
                        .unwrap_or_default();
                    println!(
                        "{:>4}  {:<24} {:>8} {:<6}{}",
                        i.id,
                        i.name,
                        i.quantity,
                        i.unit,
                        dim(&expiry)
                    );
                }
            }
        }
    }
    Ok(())
}

async fn recipe(cmd: &RecipeCommand, g: &GlobalArgs, store: &Arc<MemoryStore>) -> Result<()> {
    match cmd {
        RecipeCommand::IngestImage { source } => {
            let pipeline = build_pipeline(g, store, None)?;
            let stored = pipeline.ingest_image(source).await?;
            save(store, g).await?;
            report_stored(g, &stored)?;
        }
        RecipeCommand::IngestText {
            text,
            file,
            image_reference,
        } => {
            let body = match file {
                Some(path) => tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Cannot read {}", path.display()))?,
                None => text.join(" "),
            };
            if body.trim().is_empty() {
                bail!("No recipe text given");
            }
            let pipeline = build_pipeline(g, store, None)?;
            let stored = pipeline
                .ingest_text(&body, image_reference.as_deref())
                .await?;
            save(store, g).await?;
            report_stored(g, &stored)?;
        }
        RecipeCommand::Upload { path } => {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("Cannot read {}", path.display()))?;
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let pipeline = build_pipeline(g, store, None)?;
            let images = LocalImageStore::new(g.image_dir.clone(), g.public_url.clone());
            let stored = pipeline.ingest_upload(bytes, &filename, &images).await?;
            save(store, g).await?;
            report_stored(g, &stored)?;
        }
        RecipeCommand::List => {
            let recipes = RecipeStore::list(store.as_ref()).await?;
            if g.json {
                print_json(&recipes)?;
            } else {
                for r in &recipes {
                    let prep = r
                        .recipe
                        .prep_time_minutes
                        .map(|m| format!("{m} min"))
                        .unwrap_or_default();
                    println!("{:>4}  {:<32} {}", r.id, r.recipe.name, dim(&prep));
                }
            }
        }
        RecipeCommand::Archive => {
            let records = ArchiveWriter::new(g.archive.clone()).read_all().await?;
            if g.json {
                print_json(&records)?;
            } else {
                for r in &records {
                    println!("{}  {}", bold(&r.name), dim(&r.description));
                }
            }
        }
        RecipeCommand::Reprocess { no_progress } => {
            let show_progress = !g.quiet && !no_progress && !g.json;
            let cb = show_progress.then(CliProgressCallback::new);
            let pipeline = build_pipeline(g, store, cb.clone())?;
            let report = pipeline.reprocess_corpus().await?;
            if g.json {
                print_json(&report)?;
            } else if !g.quiet {
                for f in &report.failed {
                    eprintln!("{} {}", red("✗"), f);
                }
                if report.skipped > 0 {
                    eprintln!("{}", dim(&format!("{} recipes have no image", report.skipped)));
                }
            }
            if let Some(cb) = cb {
                let errors = cb.errors.load(Ordering::SeqCst);
                if errors > 0 && errors == report.total - report.skipped {
                    bail!("Every recipe failed to reprocess");
                }
            }
        }
    }
    Ok(())
}

fn report_stored(g: &GlobalArgs, stored: &larder::StoredRecipe) -> Result<()> {
    if g.json {
        print_json(stored)?;
    } else if !g.quiet {
        eprintln!(
            "{} saved #{} {}",
            green("✔"),
            stored.id,
            bold(&stored.recipe.name)
        );
    }
    Ok(())
}

async fn ocr(source: &str, g: &GlobalArgs) -> Result<()> {
    let config = config_from(g, None)?;
    // Tesseract needs no LLM; only resolve a provider for the vision engine.
    let provider = match config.ocr_engine {
        OcrEngine::Vision => Some(llm::resolve_provider(&config)?),
        OcrEngine::Tesseract => None,
    };
    let recognizer = recognizer_for(&config, provider)?;

    let raw = input::fetch_image(source, config.fetch_timeout_secs).await?;
    let normalized = normalize::normalize_image(raw).await?;
    let text = recognizer
        .recognize(&normalized, &CharWhitelist::from(&config))
        .await?;

    if g.json {
        print_json(&text)?;
    } else {
        println!("{}", text.as_str());
        if text.needs_manual_entry() && !g.quiet {
            eprintln!("{} too little text recognized; enter this recipe manually", cyan("⚠"));
        }
    }
    Ok(())
}
