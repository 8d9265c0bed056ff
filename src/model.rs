//! Records flowing through the ingestion and query paths.
//!
//! Every type here is plain data: immutable once built, `Serialize` so the
//! CLI can print it as JSON, and free of I/O. Invariants that matter for
//! correctness (a recipe always has a name, a snapshot only holds available
//! ingredients) are enforced by the constructors, not by callers.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ItemError, LarderError};

// ── Images and text ──────────────────────────────────────────────────────

/// Raw image bytes exactly as fetched, plus where they came from.
#[derive(Debug, Clone)]
pub struct RawImage {
    pub source: String,
    pub bytes: Vec<u8>,
}

impl RawImage {
    pub fn new(source: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            source: source.into(),
            bytes,
        }
    }
}

/// A greyscale, contrast-stretched, two-level, upright image, PNG-encoded.
///
/// Only [`crate::pipeline::normalize`] constructs these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    pub(crate) source: String,
    pub(crate) png: Vec<u8>,
    pub(crate) width: u32,
    pub(crate) height: u32,
}

impl NormalizedImage {
    pub fn source(&self) -> &str {
        &self.source
    }

    /// PNG bytes of the single-channel binarized image.
    pub fn png(&self) -> &[u8] {
        &self.png
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Below this many non-space characters OCR output is not worth structuring.
pub const MIN_USEFUL_TEXT_CHARS: usize = 8;

/// OCR output restricted to the recognizer's character whitelist.
///
/// May be empty: recognition failure is a result, not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognizedText {
    pub text: String,
}

impl RecognizedText {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// True when the text is too short to extract a recipe from.
    pub fn needs_manual_entry(&self) -> bool {
        self.text.chars().filter(|c| !c.is_whitespace()).count() < MIN_USEFUL_TEXT_CHARS
    }
}

// ── Recipes ──────────────────────────────────────────────────────────────

/// A validated recipe record.
///
/// Field names serialise in camelCase so the same shape is used in the
/// completion prompt, the JSON store snapshot, and CLI output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredRecipe {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cuisine_type: Option<String>,
    #[serde(default, alias = "prepTime", skip_serializing_if = "Option::is_none")]
    pub prep_time_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_reference: Option<String>,
}

impl StructuredRecipe {
    /// A recipe with only a name; fails when the name is blank.
    pub fn named(name: impl Into<String>) -> Result<Self, LarderError> {
        let recipe = Self {
            name: name.into().trim().to_string(),
            description: String::new(),
            cuisine_type: None,
            prep_time_minutes: None,
            instructions: None,
            difficulty_level: None,
            image_reference: None,
        };
        recipe.validate()?;
        Ok(recipe)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_image_reference(mut self, reference: impl Into<String>) -> Self {
        self.image_reference = Some(reference.into());
        self
    }

    /// Enforce the only hard invariant: a non-empty name.
    pub fn validate(&self) -> Result<(), LarderError> {
        if self.name.trim().is_empty() {
            return Err(LarderError::validation("name", "recipe name is missing or empty"));
        }
        Ok(())
    }
}

/// A recipe as held by the recipe store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecipe {
    pub id: u64,
    #[serde(flatten)]
    pub recipe: StructuredRecipe,
    pub created_at: DateTime<Utc>,
}

// ── Ingredients ──────────────────────────────────────────────────────────

/// A pantry item as held by the ingredient store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingredient {
    pub id: u64,
    pub name: String,
    pub quantity: f64,
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<NaiveDate>,
}

impl Ingredient {
    /// Quantity ≤ 0 is a data-entry artefact and means "not in the pantry".
    pub fn is_available(&self) -> bool {
        self.quantity > 0.0
    }
}

/// Ingredient creation input, before validation.
///
/// `expiry_date` stays a string so that a bad date is reported as a
/// validation failure of this item rather than a deserialisation failure
/// of the whole request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIngredient {
    pub name: String,
    pub quantity: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub expiry_date: Option<String>,
}

impl NewIngredient {
    pub fn new(name: impl Into<String>, quantity: f64, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quantity,
            unit: unit.into(),
            category: None,
            expiry_date: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_expiry(mut self, date: impl Into<String>) -> Self {
        self.expiry_date = Some(date.into());
        self
    }
}

/// Partial update: only quantity, unit and expiry may change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngredientPatch {
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub expiry_date: Option<String>,
}

impl IngredientPatch {
    pub fn is_empty(&self) -> bool {
        self.quantity.is_none() && self.unit.is_none() && self.expiry_date.is_none()
    }
}

/// Read-only projection of the pantry: only ingredients with quantity > 0,
/// in store order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InventorySnapshot {
    items: Vec<Ingredient>,
}

impl InventorySnapshot {
    pub fn from_ingredients(all: impl IntoIterator<Item = Ingredient>) -> Self {
        Self {
            items: all.into_iter().filter(Ingredient::is_available).collect(),
        }
    }

    pub fn items(&self) -> &[Ingredient] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

// ── Recommendation ───────────────────────────────────────────────────────

/// One ranked candidate recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeMatch {
    pub recipe: String,
    /// Owned ingredients / required ingredients, as a percentage 0–100.
    pub coverage: f64,
    pub missing_ingredients: Vec<String>,
    #[serde(default)]
    pub substitutions: Vec<String>,
}

/// Ranked, explainable answer to a pantry query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationResult {
    pub request: String,
    pub summary: String,
    pub matches: Vec<RecipeMatch>,
    /// The inventory the answer was computed from.
    pub inventory: InventorySnapshot,
}

// ── Batch ────────────────────────────────────────────────────────────────

/// Outcome of a batch run: every item is accounted for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: Vec<StructuredRecipe>,
    pub failed: Vec<ItemError>,
    /// Items with nothing to do (e.g. recipes without an image reference).
    pub skipped: usize,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ingredient(name: &str, quantity: f64) -> Ingredient {
        Ingredient {
            id: 1,
            name: name.into(),
            quantity,
            unit: "kg".into(),
            category: None,
            expiry_date: None,
        }
    }

    #[test]
    fn snapshot_drops_zero_and_negative_quantities() {
        let snap = InventorySnapshot::from_ingredients(vec![
            ingredient("flour", 2.0),
            ingredient("sugar", 0.0),
            ingredient("salt", -1.0),
            ingredient("eggs", 6.0),
        ]);
        let names: Vec<&str> = snap.items().iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["flour", "eggs"]);
    }

    #[test]
    fn named_rejects_blank() {
        let err = StructuredRecipe::named("   ").unwrap_err();
        assert!(matches!(err, LarderError::Validation { .. }));
    }

    #[test]
    fn recipe_accepts_prep_time_alias() {
        let r: StructuredRecipe =
            serde_json::from_str(r#"{"name":"Tea","prepTime":5}"#).expect("deserialise");
        assert_eq!(r.prep_time_minutes, Some(5));
        assert_eq!(r.description, "");
    }

    #[test]
    fn recipe_serialises_camel_case() {
        let mut r = StructuredRecipe::named("Tea").unwrap();
        r.cuisine_type = Some("British".into());
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"cuisineType\":\"British\""), "got: {json}");
        assert!(!json.contains("prepTimeMinutes"));
    }

    #[test]
    fn short_text_needs_manual_entry() {
        let t = RecognizedText { text: " a b c ".into() };
        assert!(t.needs_manual_entry());
        let t = RecognizedText {
            text: "Pancakes. Mix flour, eggs and milk.".into(),
        };
        assert!(!t.needs_manual_entry());
    }
}
