//! Data contracts shared by the orchestrator, the store, the gateway and
//! the exporter.
//!
//! An [`AnalysisItem`] is a tagged union: its shape is decided by the
//! [`TaskMode`] of the run that produced it, so consumers `match` on the
//! variant instead of probing for optional fields.

use crate::error::ReviewError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The analysis a run performs on every page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskMode {
    /// Extract page titles and translate them into English.
    #[default]
    Translate,
    /// Find typos and wording errors and suggest corrections.
    Proofread,
}

impl TaskMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskMode::Translate => "translate",
            TaskMode::Proofread => "proofread",
        }
    }

    /// Field names carried by items of this mode, in column order.
    pub fn fields(self) -> &'static [ItemField] {
        match self {
            TaskMode::Translate => &[ItemField::Original, ItemField::Translated],
            TaskMode::Proofread => &[
                ItemField::Context,
                ItemField::Correction,
                ItemField::Explanation,
            ],
        }
    }
}

impl fmt::Display for TaskMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskMode {
    type Err = ReviewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "translate" => Ok(TaskMode::Translate),
            "proofread" => Ok(TaskMode::Proofread),
            other => Err(ReviewError::UnknownName {
                what: "task",
                value: other.to_string(),
            }),
        }
    }
}

/// One finding on a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalysisItem {
    /// A page title and its translation.
    Translation { original: String, translated: String },
    /// A faulty excerpt, its fix, and why.
    Correction {
        context: String,
        correction: String,
        explanation: String,
    },
}

impl AnalysisItem {
    pub fn mode(&self) -> TaskMode {
        match self {
            AnalysisItem::Translation { .. } => TaskMode::Translate,
            AnalysisItem::Correction { .. } => TaskMode::Proofread,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            AnalysisItem::Translation { .. } => "translation",
            AnalysisItem::Correction { .. } => "correction",
        }
    }

    /// Read one field; `None` if the field is not part of this variant.
    pub fn get(&self, field: ItemField) -> Option<&str> {
        match (self, field) {
            (AnalysisItem::Translation { original, .. }, ItemField::Original) => Some(original),
            (AnalysisItem::Translation { translated, .. }, ItemField::Translated) => {
                Some(translated)
            }
            (AnalysisItem::Correction { context, .. }, ItemField::Context) => Some(context),
            (AnalysisItem::Correction { correction, .. }, ItemField::Correction) => {
                Some(correction)
            }
            (AnalysisItem::Correction { explanation, .. }, ItemField::Explanation) => {
                Some(explanation)
            }
            _ => None,
        }
    }

    /// Overwrite one field in place. Any string is accepted, including empty.
    pub fn set(&mut self, field: ItemField, value: impl Into<String>) -> Result<(), ReviewError> {
        let kind = self.kind();
        let slot = match (self, field) {
            (AnalysisItem::Translation { original, .. }, ItemField::Original) => original,
            (AnalysisItem::Translation { translated, .. }, ItemField::Translated) => translated,
            (AnalysisItem::Correction { context, .. }, ItemField::Context) => context,
            (AnalysisItem::Correction { correction, .. }, ItemField::Correction) => correction,
            (AnalysisItem::Correction { explanation, .. }, ItemField::Explanation) => explanation,
            _ => {
                return Err(ReviewError::FieldMismatch {
                    field: field.to_string(),
                    kind,
                })
            }
        };
        *slot = value.into();
        Ok(())
    }

    /// Field values in the column order of [`TaskMode::fields`].
    pub fn cells(&self) -> Vec<&str> {
        match self {
            AnalysisItem::Translation {
                original,
                translated,
            } => vec![original.as_str(), translated.as_str()],
            AnalysisItem::Correction {
                context,
                correction,
                explanation,
            } => vec![context.as_str(), correction.as_str(), explanation.as_str()],
        }
    }
}

/// Name of an editable item field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemField {
    Original,
    Translated,
    Context,
    Correction,
    Explanation,
}

impl ItemField {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemField::Original => "original",
            ItemField::Translated => "translated",
            ItemField::Context => "context",
            ItemField::Correction => "correction",
            ItemField::Explanation => "explanation",
        }
    }
}

impl fmt::Display for ItemField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemField {
    type Err = ReviewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "original" => Ok(ItemField::Original),
            "translated" => Ok(ItemField::Translated),
            "context" => Ok(ItemField::Context),
            "correction" => Ok(ItemField::Correction),
            "explanation" => Ok(ItemField::Explanation),
            other => Err(ReviewError::UnknownName {
                what: "field",
                value: other.to_string(),
            }),
        }
    }
}

/// Processing state of one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl PageStatus {
    /// Pages a run picks up: never processed, or failed last time.
    pub fn is_resumable(self) -> bool {
        matches!(self, PageStatus::Pending | PageStatus::Failed)
    }
}

/// Per-page processing state and results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    /// 1-indexed page number; immutable.
    pub page_number: usize,
    pub status: PageStatus,
    pub items: Vec<AnalysisItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PageRecord {
    pub fn pending(page_number: usize) -> Self {
        Self {
            page_number,
            status: PageStatus::Pending,
            items: Vec::new(),
            error: None,
        }
    }

    /// Text shown in a live table in place of item rows when the page has none.
    pub fn placeholder(&self) -> String {
        match self.status {
            PageStatus::Pending => "Waiting…".to_string(),
            PageStatus::Processing => "Analysing…".to_string(),
            PageStatus::Failed => format!(
                "Analysis failed: {}",
                self.error.as_deref().unwrap_or("unknown error")
            ),
            PageStatus::Completed => "Nothing found".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn correction() -> AnalysisItem {
        AnalysisItem::Correction {
            context: "teh".into(),
            correction: "the".into(),
            explanation: "typo".into(),
        }
    }

    #[test]
    fn task_mode_parses_case_insensitively() {
        assert_eq!("Proofread".parse::<TaskMode>().unwrap(), TaskMode::Proofread);
        assert_eq!(" translate ".parse::<TaskMode>().unwrap(), TaskMode::Translate);
        assert!("summarise".parse::<TaskMode>().is_err());
    }

    #[test]
    fn items_serialise_without_tag() {
        let json = serde_json::to_value(correction()).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 3);
        assert!(obj.contains_key("correction"));
        assert!(!obj.contains_key("translated"));
    }

    #[test]
    fn set_only_touches_named_field() {
        let mut item = correction();
        item.set(ItemField::Correction, "").unwrap();
        assert_eq!(item.get(ItemField::Correction), Some(""));
        assert_eq!(item.get(ItemField::Context), Some("teh"));
        assert_eq!(item.get(ItemField::Explanation), Some("typo"));
    }

    #[test]
    fn set_rejects_foreign_field() {
        let mut item = correction();
        let err = item.set(ItemField::Translated, "x").unwrap_err();
        assert!(matches!(err, ReviewError::FieldMismatch { .. }));
        assert_eq!(item, correction());
    }

    #[test]
    fn placeholder_follows_status() {
        let mut rec = PageRecord::pending(4);
        assert_eq!(rec.placeholder(), "Waiting…");
        rec.status = PageStatus::Failed;
        rec.error = Some("quota".into());
        assert_eq!(rec.placeholder(), "Analysis failed: quota");
        rec.status = PageStatus::Completed;
        rec.error = None;
        assert_eq!(rec.placeholder(), "Nothing found");
    }
}
