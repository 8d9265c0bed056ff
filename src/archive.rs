//! Recipe corpus archive: an append-only, human-readable text ledger.
//!
//! Each record is a banner block:
//!
//! ```text
//! === Recipe: Tea ===
//! Description: Hot and simple
//! Cuisine Type: Not specified
//! Preparation Time: 5 minutes
//! Difficulty Level: Not specified
//!
//! ===================================
//!
//! ```
//!
//! The archive is a log, not a keyed store: appending the same recipe twice
//! yields two blocks, and readers must cope with that.

use crate::error::LarderError;
use crate::model::StructuredRecipe;
use crate::pipeline::structure::parse_duration_text;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// Placeholder for an absent optional field.
pub const NOT_SPECIFIED: &str = "Not specified";

const FOOTER: &str = "===================================";

/// Anything that durably records structured recipes.
#[async_trait]
pub trait CorpusSink: Send + Sync {
    async fn append(&self, recipe: &StructuredRecipe) -> Result<(), LarderError>;
}

/// [`CorpusSink`] writing banner blocks to a text file.
///
/// Appends within one process are serialised by an internal lock, and each
/// record goes out in a single write so blocks never interleave.
#[derive(Debug)]
pub struct ArchiveWriter {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ArchiveWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the whole archive. A missing file is an empty archive.
    pub async fn read_all(&self) -> Result<Vec<StructuredRecipe>, LarderError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => Ok(parse_archive(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(LarderError::persistence(self.path.display(), e)),
        }
    }
}

#[async_trait]
impl CorpusSink for ArchiveWriter {
    async fn append(&self, recipe: &StructuredRecipe) -> Result<(), LarderError> {
        recipe.validate()?;
        let block = render_record(recipe);

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LarderError::persistence(parent.display(), e))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| LarderError::persistence(self.path.display(), e))?;
        file.write_all(block.as_bytes())
            .await
            .map_err(|e| LarderError::persistence(self.path.display(), e))?;
        file.flush()
            .await
            .map_err(|e| LarderError::persistence(self.path.display(), e))?;

        debug!("Archived '{}' to {}", recipe.name, self.path.display());
        Ok(())
    }
}

/// Render one banner block, including its trailing blank line.
pub fn render_record(recipe: &StructuredRecipe) -> String {
    let prep = recipe
        .prep_time_minutes
        .map(|m| format!("{m} minutes"))
        .unwrap_or_else(|| NOT_SPECIFIED.to_string());

    format!(
        "=== Recipe: {} ===\n\
         Description: {}\n\
         Cuisine Type: {}\n\
         Preparation Time: {}\n\
         Difficulty Level: {}\n\
         \n\
         {FOOTER}\n\
         \n",
        one_line(&recipe.name),
        one_line(&recipe.description),
        or_placeholder(recipe.cuisine_type.as_deref()),
        prep,
        or_placeholder(recipe.difficulty_level.as_deref()),
    )
}

/// Newlines inside a value would break the line-oriented format.
fn one_line(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn or_placeholder(value: Option<&str>) -> String {
    match value.map(one_line) {
        Some(v) if !v.is_empty() => v,
        _ => NOT_SPECIFIED.to_string(),
    }
}

/// Parse every banner block in `text`.
///
/// Leading indentation, missing optional lines and the `Not specified`
/// placeholder (including the older `Not specified minutes`) are tolerated.
/// A header without a footer at end of input still yields its record.
pub fn parse_archive(text: &str) -> Vec<StructuredRecipe> {
    let mut out = Vec::new();
    let mut current: Option<StructuredRecipe> = None;

    for line in text.lines().map(str::trim) {
        if let Some(name) = header_name(line) {
            out.extend(current.take());
            current = StructuredRecipe::named(name).ok();
            continue;
        }
        if is_footer(line) {
            out.extend(current.take());
            continue;
        }
        let Some(recipe) = current.as_mut() else {
            continue;
        };
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match label.trim() {
            "Description" => recipe.description = value.to_string(),
            "Cuisine Type" => recipe.cuisine_type = specified(value),
            "Preparation Time" => {
                recipe.prep_time_minutes = specified(value).and_then(|v| parse_duration_text(&v))
            }
            "Difficulty Level" => recipe.difficulty_level = specified(value),
            _ => {}
        }
    }
    out.extend(current);
    out
}

fn header_name(line: &str) -> Option<&str> {
    line.strip_prefix("=== Recipe:")
        .and_then(|rest| rest.strip_suffix("==="))
        .map(str::trim)
}

fn is_footer(line: &str) -> bool {
    line.len() >= 3 && line.chars().all(|c| c == '=')
}

fn specified(value: &str) -> Option<String> {
    if value.is_empty() || value.starts_with(NOT_SPECIFIED) {
        None
    } else {
        Some(value.to_string())
    }
}
