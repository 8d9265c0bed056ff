//! Prompts for the two completion calls: structuring and recommendation.
//!
//! Every prompt lives here so behaviour changes touch one file and tests can
//! inspect prompts without a live model. Callers can override the system
//! prompts via [`crate::config::LarderConfig`]; the constants are used only
//! when no override is provided.

use crate::model::{Ingredient, InventorySnapshot, StructuredRecipe};

/// Default schema description handed to the structurer.
///
/// Field names and types match [`StructuredRecipe`] exactly.
pub const RECIPE_SCHEMA: &str = r#"{
  "name": string (required, the recipe title),
  "description": string (one or two sentences, "" if none),
  "cuisineType": string or null,
  "prepTimeMinutes": integer minutes or null,
  "instructions": string or null,
  "difficultyLevel": string or null ("Easy", "Medium" or "Hard")
}"#;

/// System prompt for turning raw recipe text into one JSON object.
pub const STRUCTURE_SYSTEM_PROMPT: &str = r#"You extract recipes from noisy text. The text may come from OCR of a photographed recipe card and can contain misread characters, missing punctuation and broken lines.

Rules:
1. Output ONLY one JSON object matching the schema you are given.
2. Do NOT wrap the object in ```json fences and do NOT add commentary.
3. Use null for any field the text does not support. Never invent values.
4. "name" is mandatory. If the text contains no recognisable recipe, output {"name": null}.
5. Give "prepTimeMinutes" as a whole number of minutes."#;

/// System prompt for pantry-aware recommendations.
pub const RECOMMEND_SYSTEM_PROMPT: &str = r#"You are a cooking assistant. You are given the ingredients currently available in a pantry, a list of saved recipes, and a request from the cook.

For each saved recipe that could answer the request:
1. Work out the ingredients the recipe needs from its name, description and instructions.
2. "coverage": percentage (0-100) of those ingredients present in the pantry list. Anything not in the pantry list is missing.
3. "missingIngredients": the needed ingredients that are not in the pantry.
4. "substitutions": short suggestions replacing missing ingredients with pantry items, or [].
5. Rank recipes that match stated preferences (for example "quick" or "sweet") higher.

Only use recipes from the saved list, spelled exactly as given.
Output ONLY one JSON object, without fences or commentary:
{"summary": string, "recommendations": [{"recipe": string, "coverage": number, "missingIngredients": [string], "substitutions": [string]}]}"#;

/// Summary returned without a completion call when the corpus is empty.
pub const EMPTY_CORPUS_SUMMARY: &str = "No recipes available.";

/// System prompt for the vision-model OCR engine.
pub const OCR_SYSTEM_PROMPT: &str = r#"Transcribe all text visible in this photographed recipe card, top to bottom.
Output only the transcription. Do not describe the image and do not add formatting."#;

/// Build the user message for the structurer.
pub fn structure_user_message(source_text: &str, schema: &str) -> String {
    format!(
        "Schema:\n{schema}\n\nRecipe text:\n\"\"\"\n{}\n\"\"\"",
        source_text.trim()
    )
}

/// Build the user message for the recommender.
///
/// Only the snapshot's items are serialised, so unavailable ingredients
/// never reach the model.
pub fn recommend_user_message(
    request: &str,
    inventory: &InventorySnapshot,
    corpus: &[StructuredRecipe],
) -> String {
    let pantry = if inventory.is_empty() {
        "(empty: nothing is available)".to_string()
    } else {
        inventory
            .items()
            .iter()
            .map(pantry_line)
            .collect::<Vec<_>>()
            .join("\n")
    };

    let recipes = serde_json::to_string_pretty(corpus).unwrap_or_else(|_| "[]".to_string());

    format!(
        "Pantry:\n{pantry}\n\nSaved recipes:\n{recipes}\n\nRequest: {}",
        request.trim()
    )
}

fn pantry_line(item: &Ingredient) -> String {
    let mut line = format!("- {}: {} {}", item.name, item.quantity, item.unit);
    if let Some(ref category) = item.category {
        line.push_str(&format!(" ({category})"));
    }
    if let Some(date) = item.expiry_date {
        line.push_str(&format!(", expires {date}"));
    }
    line.trim_end().to_string()
}
