//! Prompt text shared by the chat backends

use crate::app_config::UsageNotes;
use crate::providers::LanguagePair;

/// System message for card generation
pub const CARD_SYSTEM_NOTE: &str = "You are a precise assistant for vocabulary flashcards. \
Produce short, natural output and add usage notes when relevant. \
Treat the source and target language exactly as specified.";

/// System message for word-list translation
pub const WORDS_SYSTEM_NOTE: &str =
    "You only return JSON mapping each word to a short translation (at most 3 words).";

/// User prompt asking for one card as a JSON object
pub fn card_prompt(word: &str, usage_notes: UsageNotes, languages: &LanguagePair) -> String {
    let source = &languages.source_label;
    let target = &languages.target_label;
    format!(
        "Source language: {source}\n\
         Target language: {target}\n\
         Usage notes: {usage_notes}\n\
         \n\
         Target word: \"{word}\"\n\
         \n\
         Tasks:\n\
         1) Translate the {source} word into {target}.\n\
         2) Write one natural example sentence in {source}.\n\
         3) Give the {target} translation of that sentence.\n\
         4) NOTE: only when relevant (short and clear). {notes_hint}\n\
         \n\
         Return JSON only:\n\
         {{\n  \"translation\": \"...\",\n  \"example_src\": \"...\",\n  \"example_tgt\": \"...\",\n  \"note\": \"...\"\n}}\n\
         The note may be an empty string.",
        notes_hint = usage_notes_hint(usage_notes),
    )
}

/// User prompt asking for a `{word: translation}` mapping
pub fn words_prompt(tokens: &[String], languages: &LanguagePair) -> String {
    format!(
        "Translate each of the following words from {} to {}. \
         Return only JSON with a mapping {{word: short translation}}; no extra text.\n\
         Words: {}",
        languages.source_label,
        languages.target_label,
        tokens.join(", ")
    )
}

fn usage_notes_hint(usage_notes: UsageNotes) -> &'static str {
    match usage_notes {
        UsageNotes::Auto => "Add a note only if the word has a notable register, nuance or common pitfall.",
        UsageNotes::Always => "Always add a short usage note.",
        UsageNotes::Never => "Leave the note empty.",
    }
}
