//! Record stores for pantry ingredients and structured recipes.
//!
//! The pipeline talks to storage only through the [`IngredientStore`] and
//! [`RecipeStore`] traits. [`MemoryStore`] implements both in memory and can
//! snapshot itself to a JSON file, which is all the CLI needs to keep state
//! between runs.
//!
//! Batch ingredient creation is atomic: every item is validated before any
//! is inserted, and insertion happens under one write lock, so a bad item
//! leaves the store untouched.

use crate::error::LarderError;
use crate::model::{Ingredient, IngredientPatch, NewIngredient, StoredRecipe, StructuredRecipe};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Pantry persistence.
#[async_trait]
pub trait IngredientStore: Send + Sync {
    async fn create(&self, item: NewIngredient) -> Result<Ingredient, LarderError>;

    /// All or nothing: on error no item of the batch is stored.
    async fn create_batch(&self, items: Vec<NewIngredient>) -> Result<Vec<Ingredient>, LarderError>;

    async fn update(&self, id: u64, patch: IngredientPatch) -> Result<Ingredient, LarderError>;

    /// Every stored ingredient, including ones with zero quantity.
    async fn list(&self) -> Result<Vec<Ingredient>, LarderError>;
}

/// Recipe persistence.
#[async_trait]
pub trait RecipeStore: Send + Sync {
    async fn create(&self, recipe: StructuredRecipe) -> Result<StoredRecipe, LarderError>;

    async fn find_by_id(&self, id: u64) -> Result<Option<StoredRecipe>, LarderError>;

    async fn list(&self) -> Result<Vec<StoredRecipe>, LarderError>;
}

// ── Validation ───────────────────────────────────────────────────────────

/// Parse an expiry date given as `YYYY-MM-DD` or an RFC 3339 timestamp.
pub fn parse_expiry(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

fn expiry_field(raw: Option<&str>, field: &str) -> Result<Option<NaiveDate>, LarderError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => parse_expiry(s).map(Some).ok_or_else(|| {
            LarderError::validation(field, format!("'{s}' is not a date (expected YYYY-MM-DD)"))
        }),
    }
}

fn quantity_field(quantity: f64, field: &str) -> Result<f64, LarderError> {
    if quantity.is_finite() {
        Ok(quantity)
    } else {
        Err(LarderError::validation(field, "quantity must be a finite number"))
    }
}

/// Validated ingredient without an id yet.
struct Checked {
    name: String,
    quantity: f64,
    unit: String,
    category: Option<String>,
    expiry_date: Option<NaiveDate>,
}

fn check(item: NewIngredient, prefix: &str) -> Result<Checked, LarderError> {
    let name = item.name.trim().to_string();
    if name.is_empty() {
        return Err(LarderError::validation(format!("{prefix}name"), "name is empty"));
    }
    Ok(Checked {
        name,
        quantity: quantity_field(item.quantity, &format!("{prefix}quantity"))?,
        unit: item.unit.trim().to_string(),
        category: item
            .category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty()),
        expiry_date: expiry_field(item.expiry_date.as_deref(), &format!("{prefix}expiryDate"))?,
    })
}

// ── In-memory implementation ─────────────────────────────────────────────

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Tables {
    #[serde(default)]
    ingredients: Vec<Ingredient>,
    #[serde(default)]
    recipes: Vec<StoredRecipe>,
}

impl Tables {
    fn next_ingredient_id(&self) -> u64 {
        self.ingredients.iter().map(|i| i.id).max().unwrap_or(0) + 1
    }

    fn next_recipe_id(&self) -> u64 {
        self.recipes.iter().map(|r| r.id).max().unwrap_or(0) + 1
    }

    fn insert_ingredient(&mut self, c: Checked) -> Ingredient {
        let item = Ingredient {
            id: self.next_ingredient_id(),
            name: c.name,
            quantity: c.quantity,
            unit: c.unit,
            category: c.category,
            expiry_date: c.expiry_date,
        };
        self.ingredients.push(item.clone());
        item
    }
}

/// In-memory store for both ingredients and recipes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON snapshot written by [`MemoryStore::save`]. A missing file
    /// gives an empty store.
    pub async fn open(path: &Path) -> Result<Self, LarderError> {
        let tables = match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| LarderError::persistence(path.display(), e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No store at {}; starting empty", path.display());
                Tables::default()
            }
            Err(e) => return Err(LarderError::persistence(path.display(), e)),
        };
        Ok(Self {
            tables: RwLock::new(tables),
        })
    }

    /// Write a JSON snapshot atomically: temp file in the same directory,
    /// then rename over `path`.
    pub async fn save(&self, path: &Path) -> Result<(), LarderError> {
        let json = {
            let tables = self.tables.read().await;
            serde_json::to_vec_pretty(&*tables)
                .map_err(|e| LarderError::Internal(format!("store serialisation: {e}")))?
        };

        let target = path.to_path_buf();
        tokio::task::spawn_blocking(move || write_atomic(&target, &json))
            .await
            .map_err(|e| LarderError::Internal(format!("Store save task panicked: {e}")))??;

        info!("Saved store to {}", path.display());
        Ok(())
    }
}

pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), LarderError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| LarderError::persistence(dir.display(), e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| LarderError::persistence(dir.display(), e))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| LarderError::persistence(tmp.path().display(), e))?;
    tmp.persist(path)
        .map_err(|e| LarderError::persistence(path.display(), e.error))?;
    Ok(())
}

#[async_trait]
impl IngredientStore for MemoryStore {
    async fn create(&self, item: NewIngredient) -> Result<Ingredient, LarderError> {
        let checked = check(item, "")?;
        let created = self.tables.write().await.insert_ingredient(checked);
        debug!("Created ingredient {} '{}'", created.id, created.name);
        Ok(created)
    }

    async fn create_batch(&self, items: Vec<NewIngredient>) -> Result<Vec<Ingredient>, LarderError> {
        let checked = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| check(item, &format!("ingredients[{i}].")))
            .collect::<Result<Vec<_>, _>>()?;

        let mut tables = self.tables.write().await;
        let created: Vec<Ingredient> = checked
            .into_iter()
            .map(|c| tables.insert_ingredient(c))
            .collect();
        debug!("Created {} ingredients in one batch", created.len());
        Ok(created)
    }

    async fn update(&self, id: u64, patch: IngredientPatch) -> Result<Ingredient, LarderError> {
        if patch.is_empty() {
            return Err(LarderError::validation("patch", "nothing to update"));
        }
        let quantity = patch
            .quantity
            .map(|q| quantity_field(q, "quantity"))
            .transpose()?;
        let expiry = patch
            .expiry_date
            .as_deref()
            .map(|raw| expiry_field(Some(raw), "expiryDate"))
            .transpose()?;

        let mut tables = self.tables.write().await;
        let item = tables
            .ingredients
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or(LarderError::RecordNotFound {
                entity: "Ingredient",
                id,
            })?;

        if let Some(q) = quantity {
            item.quantity = q;
        }
        if let Some(unit) = patch.unit {
            item.unit = unit.trim().to_string();
        }
        if let Some(date) = expiry {
            item.expiry_date = date;
        }
        Ok(item.clone())
    }

    async fn list(&self) -> Result<Vec<Ingredient>, LarderError> {
        Ok(self.tables.read().await.ingredients.clone())
    }
}

#[async_trait]
impl RecipeStore for MemoryStore {
    async fn create(&self, recipe: StructuredRecipe) -> Result<StoredRecipe, LarderError> {
        recipe.validate()?;
        let mut tables = self.tables.write().await;
        let stored = StoredRecipe {
            id: tables.next_recipe_id(),
            recipe,
            created_at: Utc::now(),
        };
        tables.recipes.push(stored.clone());
        debug!("Created recipe {} '{}'", stored.id, stored.recipe.name);
        Ok(stored)
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<StoredRecipe>, LarderError> {
        Ok(self
            .tables
            .read()
            .await
            .recipes
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<StoredRecipe>, LarderError> {
        Ok(self.tables.read().await.recipes.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flour() -> NewIngredient {
        NewIngredient::new("Flour", 500.0, "g").with_category("baking")
    }

    #[test]
    fn expiry_formats() {
        let d = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        assert_eq!(parse_expiry("2026-03-01"), Some(d));
        assert_eq!(parse_expiry("2026-03-01T10:00:00Z"), Some(d));
        assert_eq!(parse_expiry("2026-03-01T23:30:00+02:00"), Some(d));
        assert_eq!(parse_expiry("01/03/2026"), None);
        assert_eq!(parse_expiry("2026-02-30"), None);
    }

    #[tokio::test]
    async fn ids_are_sequential_from_one() {
        let store = MemoryStore::new();
        let a = IngredientStore::create(&store, flour()).await.unwrap();
        let b = IngredientStore::create(&store, NewIngredient::new("Salt", 1.0, "kg"))
            .await
            .unwrap();
        assert_eq!((a.id, b.id), (1, 2));
        assert_eq!(a.category.as_deref(), Some("baking"));
    }

    #[tokio::test]
    async fn batch_with_one_bad_date_inserts_nothing() {
        let store = MemoryStore::new();
        let batch = vec![
            flour(),
            NewIngredient::new("Milk", 1.0, "l").with_expiry("next tuesday"),
            NewIngredient::new("Eggs", 6.0, "pcs"),
        ];
        let err = store.create_batch(batch).await.unwrap_err();
        match err {
            LarderError::Validation { field, .. } => assert_eq!(field, "ingredients[1].expiryDate"),
            other => panic!("expected Validation, got {other:?}"),
        }
        assert!(IngredientStore::list(&store).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn good_batch_is_fully_inserted() {
        let store = MemoryStore::new();
        let created = store
            .create_batch(vec![flour(), NewIngredient::new("Eggs", 6.0, "pcs")])
            .await
            .unwrap();
        assert_eq!(created.len(), 2);
        assert_eq!(IngredientStore::list(&store).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn blank_name_and_nan_quantity_are_rejected() {
        let store = MemoryStore::new();
        let err = IngredientStore::create(&store, NewIngredient::new("  ", 1.0, "g"))
            .await
            .unwrap_err();
        assert!(matches!(err, LarderError::Validation { ref field, .. } if field == "name"));
        let err = IngredientStore::create(&store, NewIngredient::new("Salt", f64::NAN, "g"))
            .await
            .unwrap_err();
        assert!(matches!(err, LarderError::Validation { ref field, .. } if field == "quantity"));
    }

    #[tokio::test]
    async fn update_changes_only_patched_fields() {
        let store = MemoryStore::new();
        let item = IngredientStore::create(&store, flour()).await.unwrap();
        let patch = IngredientPatch {
            quantity: Some(0.0),
            expiry_date: Some("2026-12-31".into()),
            ..Default::default()
        };
        let updated = store.update(item.id, patch).await.unwrap();
        assert_eq!(updated.quantity, 0.0);
        assert_eq!(updated.unit, "g");
        assert_eq!(updated.expiry_date, NaiveDate::from_ymd_opt(2026, 12, 31));
        assert!(!updated.is_available());
    }

    #[tokio::test]
    async fn update_unknown_id_is_record_not_found() {
        let store = MemoryStore::new();
        let patch = IngredientPatch {
            quantity: Some(1.0),
            ..Default::default()
        };
        let err = store.update(42, patch).await.unwrap_err();
        assert!(matches!(err, LarderError::RecordNotFound { id: 42, .. }));
    }

    #[tokio::test]
    async fn recipe_create_and_find() {
        let store = MemoryStore::new();
        let stored = RecipeStore::create(&store, StructuredRecipe::named("Tea").unwrap())
            .await
            .unwrap();
        assert_eq!(stored.id, 1);
        let found = store.find_by_id(1).await.unwrap().unwrap();
        assert_eq!(found.recipe.name, "Tea");
        assert!(store.find_by_id(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn recipe_without_name_is_rejected() {
        let store = MemoryStore::new();
        let mut r = StructuredRecipe::named("Tea").unwrap();
        r.name.clear();
        let err = RecipeStore::create(&store, r).await.unwrap_err();
        assert!(matches!(err, LarderError::Validation { .. }));
        assert!(RecipeStore::list(&store).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_then_open_round_trips_and_continues_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/larder.json");

        let store = MemoryStore::new();
        IngredientStore::create(&store, flour()).await.unwrap();
        RecipeStore::create(&store, StructuredRecipe::named("Tea").unwrap())
            .await
            .unwrap();
        store.save(&path).await.unwrap();

        let reopened = MemoryStore::open(&path).await.unwrap();
        assert_eq!(IngredientStore::list(&reopened).await.unwrap().len(), 1);
        let next = IngredientStore::create(&reopened, NewIngredient::new("Salt", 1.0, "g"))
            .await
            .unwrap();
        assert_eq!(next.id, 2);
    }

    #[tokio::test]
    async fn open_missing_file_is_empty_and_corrupt_file_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let empty = MemoryStore::open(&dir.path().join("none.json")).await.unwrap();
        assert!(RecipeStore::list(&empty).await.unwrap().is_empty());

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, b"{not json").unwrap();
        let err = MemoryStore::open(&bad).await.unwrap_err();
        assert!(matches!(err, LarderError::Persistence { .. }));
    }
}
