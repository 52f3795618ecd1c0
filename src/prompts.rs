//! Prompts sent to the vision model, one per [`TaskMode`].
//!
//! Both prompts ask for a bare JSON array so that
//! [`crate::pipeline::parse`] can turn the answer into typed items. Keeping
//! them here lets tests inspect them without calling a model.

use crate::output::TaskMode;

/// Title extraction and translation.
pub const TRANSLATE_PROMPT: &str = r#"Role:
You are an expert in visual layout analysis, Chinese copywriting and native-level English translation. Analyse the uploaded page image, identify every title on it, and translate each one.

Translation strategy:
- Long titles (more than 2 lines): first distil the core meaning, then give a concise professional translation.
- Short titles (2 lines or fewer): translate directly and professionally, in idiomatic English.
- Logos in the top-left or top-right corner are not titles; do not translate them.

Output format:
Strictly return a valid JSON array of objects. Do not wrap it in markdown code blocks.
Example: [{"original": "中文标题", "translated": "English Title"}]
If no titles are found, return an empty array []."#;

/// Proofreading of the page copy.
pub const PROOFREAD_PROMPT: &str = r#"Role:
You are a meticulous proofreader for published Chinese and English copy. Read all text on the uploaded page image and find typos, wrong characters, grammar mistakes, inconsistent terminology and punctuation errors.

Rules:
- Quote the faulty excerpt exactly as printed, with just enough surrounding words to locate it.
- Give the corrected excerpt.
- Explain briefly why the change is needed.
- Do not report stylistic preferences; only report genuine errors.
- Ignore logos, page numbers and decorative text.

Output format:
Strictly return a valid JSON array of objects. Do not wrap it in markdown code blocks.
Example: [{"context": "原文片段", "correction": "修正后的片段", "explanation": "错别字"}]
If the page has no errors, return an empty array []."#;

/// Prompt for the given mode.
pub fn prompt_for(mode: TaskMode) -> &'static str {
    match mode {
        TaskMode::Translate => TRANSLATE_PROMPT,
        TaskMode::Proofread => PROOFREAD_PROMPT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompts_name_their_mode_fields() {
        for mode in [TaskMode::Translate, TaskMode::Proofread] {
            let prompt = prompt_for(mode);
            for field in mode.fields() {
                assert!(
                    prompt.contains(&format!("\"{}\"", field)),
                    "{mode} prompt does not mention {field}"
                );
            }
            assert!(prompt.contains("[]"));
        }
    }
}
