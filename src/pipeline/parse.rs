//! Model output → typed [`AnalysisItem`]s.
//!
//! Models are asked for a bare JSON array but sometimes wrap it in
//! ```` ```json ```` fences or vary key casing. This module strips the fences,
//! lower-cases keys, and builds items of the shape dictated by the run's
//! [`TaskMode`]; fields belonging to the other mode are dropped.

use crate::error::PageError;
use crate::output::{AnalysisItem, TaskMode};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

static RE_FENCES: Lazy<Regex> = Lazy::new(|| Regex::new(r"```json\n?|\n?```").unwrap());

/// Remove markdown code fences the model may have added around its JSON.
pub fn strip_code_fences(text: &str) -> String {
    RE_FENCES.replace_all(text, "").trim().to_string()
}

/// Parse raw model text into items for `mode`.
///
/// Invalid JSON is a [`PageError::ParseFailed`] carrying the raw text. Valid
/// JSON that is not an array means "nothing found".
pub fn parse_model_output(text: &str, mode: TaskMode) -> Result<Vec<AnalysisItem>, PageError> {
    let clean = strip_code_fences(text);
    let value: Value = serde_json::from_str(&clean).map_err(|e| PageError::ParseFailed {
        detail: e.to_string(),
        raw: text.to_string(),
    })?;

    match value {
        Value::Array(values) => items_from_values(values, mode).map_err(|detail| {
            PageError::ParseFailed {
                detail,
                raw: text.to_string(),
            }
        }),
        other => {
            warn!("Model returned {} instead of an array; treating as empty", kind_of(&other));
            Ok(Vec::new())
        }
    }
}

/// Build typed items from already-decoded JSON values.
///
/// Used for model output and for `data` arrays returned by the analysis
/// endpoint. Each element must be an object.
pub fn items_from_values(values: Vec<Value>, mode: TaskMode) -> Result<Vec<AnalysisItem>, String> {
    let items = values
        .into_iter()
        .enumerate()
        .map(|(i, v)| match v {
            Value::Object(obj) => Ok(item_from_object(normalise_keys(obj), mode)),
            other => Err(format!("item {} is {}, expected an object", i, kind_of(&other))),
        })
        .collect::<Result<Vec<_>, _>>()?;

    debug!("Parsed {} {} items", items.len(), mode);
    Ok(items)
}

fn normalise_keys(obj: Map<String, Value>) -> Map<String, Value> {
    obj.into_iter()
        .map(|(k, v)| (k.to_lowercase(), v))
        .collect()
}

fn item_from_object(mut obj: Map<String, Value>, mode: TaskMode) -> AnalysisItem {
    let mut take = |key: &str| obj.remove(key).map(value_to_string).unwrap_or_default();
    match mode {
        TaskMode::Translate => AnalysisItem::Translation {
            original: take("original"),
            translated: take("translated"),
        },
        TaskMode::Proofread => AnalysisItem::Correction {
            context: take("context"),
            correction: take("correction"),
            explanation: take("explanation"),
        },
    }
}

fn value_to_string(v: Value) -> String {
    match v {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
