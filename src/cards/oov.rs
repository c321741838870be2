/*!
 * Out-of-vocabulary extraction from example sentences.
 *
 * Words in an example sentence that are not part of the input list are
 * surfaced on the card back and collected into a run-wide report.
 */

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;

use crate::file_utils::FileManager;

// Letters with their combining marks, joined by internal apostrophes (' or ’)
static TOKEN_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\p{L}\p{M}]+(?:['’][\p{L}\p{M}]+)*").expect("valid token pattern"));

/// Candidate tokens of `sentence`: lowercase, at least two characters, not
/// the current word and not in `vocabulary`, deduplicated in first-seen order
pub fn extract_candidates(sentence: &str, current_word: &str, vocabulary: &HashSet<String>) -> Vec<String> {
    let current = current_word.trim().to_lowercase();
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for token in TOKEN_REGEX.find_iter(sentence) {
        let token = token.as_str().to_lowercase();
        if token.chars().count() < 2 || token == current || vocabulary.contains(&token) {
            continue;
        }
        if seen.insert(token.clone()) {
            candidates.push(token);
        }
    }

    candidates
}

/// Run-scoped OOV set, in first-seen order
#[derive(Debug, Default, Clone)]
pub struct OovCollector {
    order: Vec<String>,
    seen: HashSet<String>,
}

impl OovCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add tokens not seen earlier in the run
    pub fn extend<I, S>(&mut self, tokens: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for token in tokens {
            let token = token.as_ref();
            if self.seen.insert(token.to_string()) {
                self.order.push(token.to_string());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Tokens in first-seen order
    pub fn tokens(&self) -> &[String] {
        &self.order
    }

    /// Sorted, newline-terminated report body
    pub fn render_report(&self) -> String {
        let mut sorted = self.order.clone();
        sorted.sort();
        let mut body = sorted.join("\n");
        body.push('\n');
        body
    }

    /// Write the report to `path`. Returns false when there was nothing to write.
    pub fn persist<P: AsRef<Path>>(&self, path: P) -> std::io::Result<bool> {
        if self.is_empty() {
            return Ok(false);
        }
        FileManager::write_atomic(path, self.render_report().as_bytes())?;
        Ok(true)
    }
}
