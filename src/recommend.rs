//! Inventory-aware recommendation: pantry + corpus + request → ranked matches.
//!
//! The model does the culinary reasoning; this module decides what it may
//! see and what of its answer is kept. Only the available projection of the
//! pantry goes into the prompt. The reply is then reconciled against the
//! corpus and the pantry before it reaches the caller:
//!
//! * matches naming recipes outside the corpus are dropped
//! * coverage is coerced from a number or an `"NN%"` string, clamped to
//!   0–100, and forced to 0 when nothing is available
//! * matches are stably sorted by coverage, highest first
//!
//! "The model could not answer" and "no recipe fits" stay distinguishable:
//! the former is an error, the latter an `Ok` with zero matches.

use crate::error::LarderError;
use crate::model::{InventorySnapshot, RecipeMatch, RecommendationResult, StructuredRecipe};
use crate::pipeline::llm::{Completer, Prompt};
use crate::pipeline::postprocess::extract_json_object;
use crate::prompts::{recommend_user_message, EMPTY_CORPUS_SUMMARY, RECOMMEND_SYSTEM_PROMPT};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct ReplyPayload {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    recommendations: Vec<ReplyMatch>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplyMatch {
    #[serde(alias = "name")]
    recipe: String,
    #[serde(default)]
    coverage: Value,
    #[serde(default)]
    missing_ingredients: Vec<String>,
    #[serde(default)]
    substitutions: Vec<String>,
}

/// Recommend recipes from `corpus` for `request` given `inventory`.
///
/// `system_prompt` overrides [`RECOMMEND_SYSTEM_PROMPT`] when set. An empty
/// corpus is answered locally without a completion call.
pub async fn recommend(
    completer: &dyn Completer,
    request: &str,
    inventory: &InventorySnapshot,
    corpus: &[StructuredRecipe],
    system_prompt: Option<&str>,
) -> Result<RecommendationResult, LarderError> {
    if corpus.is_empty() {
        info!("Recipe corpus is empty; skipping completion");
        return Ok(RecommendationResult {
            request: request.to_string(),
            summary: EMPTY_CORPUS_SUMMARY.to_string(),
            matches: Vec::new(),
            inventory: inventory.clone(),
        });
    }

    let prompt = Prompt::new(
        system_prompt.unwrap_or(RECOMMEND_SYSTEM_PROMPT),
        recommend_user_message(request, inventory, corpus),
    );
    debug!(
        "Recommending from {} recipes and {} available ingredients",
        corpus.len(),
        inventory.len()
    );

    let reply = match completer.complete(&prompt).await {
        Ok(text) => text,
        Err(e @ LarderError::Timeout { .. }) => return Err(e),
        Err(e) => {
            return Err(LarderError::Recommendation {
                detail: e.to_string(),
            })
        }
    };

    let (summary, matches) = reconcile(&reply, inventory, corpus)?;
    Ok(RecommendationResult {
        request: request.to_string(),
        summary,
        matches,
        inventory: inventory.clone(),
    })
}

/// Parse and reconcile a completion reply.
pub fn reconcile(
    reply: &str,
    inventory: &InventorySnapshot,
    corpus: &[StructuredRecipe],
) -> Result<(String, Vec<RecipeMatch>), LarderError> {
    if reply.trim().is_empty() {
        return Err(LarderError::Recommendation {
            detail: "completion returned no text".to_string(),
        });
    }

    let payload: ReplyPayload = extract_json_object(reply)
        .ok_or_else(|| "no JSON object in response".to_string())
        .and_then(|json| serde_json::from_str(&json).map_err(|e| e.to_string()))
        .map_err(|detail| LarderError::Recommendation { detail })?;

    // Corpus names, case-insensitively, mapped to their canonical spelling.
    let known: HashMap<String, &str> = corpus
        .iter()
        .map(|r| (r.name.trim().to_lowercase(), r.name.as_str()))
        .collect();

    let mut matches: Vec<RecipeMatch> = payload
        .recommendations
        .into_iter()
        .filter_map(|m| {
            let Some(canonical) = known.get(&m.recipe.trim().to_lowercase()) else {
                warn!("Dropping recommendation for unknown recipe '{}'", m.recipe);
                return None;
            };
            let coverage = if inventory.is_empty() {
                0.0
            } else {
                coerce_coverage(&m.coverage)
            };
            Some(RecipeMatch {
                recipe: canonical.to_string(),
                coverage,
                missing_ingredients: m.missing_ingredients,
                substitutions: m.substitutions,
            })
        })
        .collect();

    // Vec::sort_by is stable: equal coverage keeps the model's order.
    matches.sort_by(|a, b| b.coverage.total_cmp(&a.coverage));

    Ok((payload.summary.trim().to_string(), matches))
}

/// Coverage as a percentage in 0..=100; anything unreadable counts as 0.
fn coerce_coverage(value: &Value) -> f64 {
    let raw = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    };
    match raw {
        Some(v) if v.is_finite() => v.clamp(0.0, 100.0),
        _ => 0.0,
    }
}
