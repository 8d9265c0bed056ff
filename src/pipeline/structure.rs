//! Recipe structuring: free-form text → validated [`StructuredRecipe`].
//!
//! One completion call, then strict parsing. The three ways this can fail
//! are kept apart because callers treat them differently:
//!
//! | Reply | Error | Typical caller reaction |
//! |-------|-------|-------------------------|
//! | nothing / whitespace | [`LarderError::Completion`] | retry |
//! | not a JSON object | [`LarderError::SchemaParse`] | discard |
//! | object without a usable `name` | [`LarderError::Validation`] | manual review |
//!
//! Optional fields are lenient: a value of the wrong shape is dropped rather
//! than failing the record. Preparation time is coerced from numbers and
//! from text such as `"45 min"` or `"1 hour 30 minutes"`.

use crate::error::LarderError;
use crate::model::StructuredRecipe;
use crate::pipeline::llm::{Completer, Prompt};
use crate::pipeline::postprocess::{excerpt, extract_json_object};
use crate::prompts::{structure_user_message, STRUCTURE_SYSTEM_PROMPT};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Keys accepted for the preparation time, in priority order.
const PREP_TIME_KEYS: [&str; 4] = ["prepTimeMinutes", "prepTime", "prep_time_minutes", "prep_time"];

/// Characters of the raw reply quoted in a `SchemaParse` error.
const EXCERPT_CHARS: usize = 80;

/// Structure `source_text` with one completion call.
///
/// `system_prompt` overrides [`STRUCTURE_SYSTEM_PROMPT`] when set.
pub async fn structure(
    completer: &dyn Completer,
    source_text: &str,
    schema: &str,
    system_prompt: Option<&str>,
) -> Result<StructuredRecipe, LarderError> {
    if source_text.trim().is_empty() {
        return Err(LarderError::validation("sourceText", "no text to structure"));
    }

    let prompt = Prompt::new(
        system_prompt.unwrap_or(STRUCTURE_SYSTEM_PROMPT),
        structure_user_message(source_text, schema),
    );
    let reply = completer.complete(&prompt).await?;
    let recipe = parse_recipe_payload(&reply)?;
    debug!("Structured recipe '{}'", recipe.name);
    Ok(recipe)
}

/// Parse a completion reply into a recipe.
pub fn parse_recipe_payload(reply: &str) -> Result<StructuredRecipe, LarderError> {
    if reply.trim().is_empty() {
        return Err(LarderError::Completion {
            detail: "completion returned no text".to_string(),
        });
    }

    let schema_err = |detail: String| LarderError::SchemaParse {
        detail,
        excerpt: excerpt(reply, EXCERPT_CHARS),
    };

    let json = extract_json_object(reply)
        .ok_or_else(|| schema_err("no JSON object in response".to_string()))?;
    let value: Value = serde_json::from_str(&json).map_err(|e| schema_err(e.to_string()))?;
    let fields = match value {
        Value::Object(fields) => fields,
        other => {
            return Err(schema_err(format!(
                "expected a JSON object, got {}",
                json_type(&other)
            )))
        }
    };

    let name = match fields.get("name") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::String(_)) => {
            return Err(LarderError::validation("name", "recipe name is empty"))
        }
        Some(Value::Null) | None => {
            return Err(LarderError::validation("name", "recipe name is missing"))
        }
        Some(other) => {
            return Err(LarderError::validation(
                "name",
                format!("expected a string, got {}", json_type(other)),
            ))
        }
    };

    let recipe = StructuredRecipe {
        name,
        description: text_field(&fields, "description").unwrap_or_default(),
        cuisine_type: text_field(&fields, "cuisineType"),
        prep_time_minutes: prep_time(&fields),
        instructions: text_field(&fields, "instructions"),
        difficulty_level: text_field(&fields, "difficultyLevel"),
        image_reference: None,
    };
    recipe.validate()?;
    Ok(recipe)
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A trimmed, non-empty string field. Numbers are accepted as text; any
/// other shape is dropped.
fn text_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    let text = match fields.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn prep_time(fields: &Map<String, Value>) -> Option<u32> {
    let (key, value) = PREP_TIME_KEYS
        .iter()
        .find_map(|k| fields.get(*k).filter(|v| !v.is_null()).map(|v| (*k, v)))?;
    let minutes = coerce_minutes(value);
    if minutes.is_none() {
        warn!("Dropping unparsable {key}: {value}");
    }
    minutes
}

static RE_HOURS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(?:h|hr|hrs|hour|hours)\b").expect("valid regex")
});
static RE_MINUTES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(?:m|min|mins|minute|minutes)\b").expect("valid regex")
});
static RE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+(?:\.\d+)?)").expect("valid regex"));

/// Coerce a JSON value to whole minutes. Negative values are rejected.
pub(crate) fn coerce_minutes(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_f64().and_then(whole_minutes),
        Value::String(s) => parse_duration_text(s),
        _ => None,
    }
}

pub(crate) fn parse_duration_text(text: &str) -> Option<u32> {
    let text = text.trim();
    if text.starts_with('-') {
        return None;
    }

    let capture = |re: &Regex| -> Option<f64> {
        re.captures(text)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
    };

    let hours = capture(&RE_HOURS);
    let minutes = capture(&RE_MINUTES);
    if hours.is_some() || minutes.is_some() {
        return whole_minutes(hours.unwrap_or(0.0) * 60.0 + minutes.unwrap_or(0.0));
    }
    capture(&RE_NUMBER).and_then(whole_minutes)
}

fn whole_minutes(m: f64) -> Option<u32> {
    if !m.is_finite() || m < 0.0 || m > f64::from(u32::MAX) {
        return None;
    }
    Some(m.round() as u32)
}
