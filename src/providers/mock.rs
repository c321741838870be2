/*!
 * Mock backend for testing.
 *
 * `MockBackend` answers every call locally and counts them. Failures are
 * scripted per operation:
 * - `fail_generation(message, times)` - the next `times` generations fail
 * - `failing_speech(message)` - every synthesis fails
 * - `failing_translation(message)` - every batch translation fails
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::app_config::UsageNotes;
use crate::errors::ProviderError;
use crate::file_utils::FileManager;
use crate::providers::{CardBackend, GenerationResult, LanguagePair};

/// Scripted failure for a single operation
#[derive(Debug, Clone, PartialEq)]
pub enum MockFailure {
    /// Never fails
    None,
    /// Fails the next `remaining` calls with `message`
    Times { message: String, remaining: usize },
    /// Always fails with `message`
    Always(String),
}

impl MockFailure {
    // Consume one scheduled failure, if any
    fn next_error(&mut self) -> Option<ProviderError> {
        match self {
            Self::None => None,
            Self::Always(message) => Some(ProviderError::RequestFailed(message.clone())),
            Self::Times { message, remaining } => {
                if *remaining == 0 {
                    return None;
                }
                *remaining -= 1;
                Some(ProviderError::RequestFailed(message.clone()))
            }
        }
    }
}

/// Mock backend for testing pipeline behavior
#[derive(Debug)]
pub struct MockBackend {
    name: String,
    model: String,
    cards: Mutex<HashMap<String, GenerationResult>>,
    translations: Mutex<HashMap<String, String>>,
    generation_failure: Mutex<MockFailure>,
    speech_failure: Mutex<MockFailure>,
    translation_failure: Mutex<MockFailure>,
    spoken: Mutex<Vec<String>>,
    generate_count: AtomicUsize,
    speech_count: AtomicUsize,
    translate_count: AtomicUsize,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new("mock", "mock-model")
    }
}

impl MockBackend {
    /// Create a working mock with the given identity
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            cards: Mutex::new(HashMap::new()),
            translations: Mutex::new(HashMap::new()),
            generation_failure: Mutex::new(MockFailure::None),
            speech_failure: Mutex::new(MockFailure::None),
            translation_failure: Mutex::new(MockFailure::None),
            spoken: Mutex::new(Vec::new()),
            generate_count: AtomicUsize::new(0),
            speech_count: AtomicUsize::new(0),
            translate_count: AtomicUsize::new(0),
        }
    }

    /// Fixed card for `word` instead of the generated default
    pub fn with_card(self, word: &str, card: GenerationResult) -> Self {
        self.cards.lock().insert(word.to_lowercase(), card);
        self
    }

    /// Known word translations returned by `translate_batch`
    pub fn with_translations<I, K, V>(self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.translations
            .lock()
            .extend(entries.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Fail the next `times` generations with `message`
    pub fn fail_generation(self, message: impl Into<String>, times: usize) -> Self {
        *self.generation_failure.lock() = MockFailure::Times {
            message: message.into(),
            remaining: times,
        };
        self
    }

    /// Fail every synthesis with `message`
    pub fn failing_speech(self, message: impl Into<String>) -> Self {
        *self.speech_failure.lock() = MockFailure::Always(message.into());
        self
    }

    /// Fail every batch translation with `message`
    pub fn failing_translation(self, message: impl Into<String>) -> Self {
        *self.translation_failure.lock() = MockFailure::Always(message.into());
        self
    }

    /// Card returned for `word` when none was registered
    pub fn default_card(word: &str) -> GenerationResult {
        GenerationResult {
            translation: format!("{}-tr", word),
            example_src: format!("Saya suka {}.", word),
            example_tgt: format!("Ik hou van {}-tr.", word),
            note: String::new(),
        }
    }

    /// Number of `generate` calls so far
    pub fn generate_calls(&self) -> usize {
        self.generate_count.load(Ordering::SeqCst)
    }

    /// Number of `synthesize_speech` calls so far
    pub fn speech_calls(&self) -> usize {
        self.speech_count.load(Ordering::SeqCst)
    }

    /// Number of `translate_batch` calls so far
    pub fn translate_calls(&self) -> usize {
        self.translate_count.load(Ordering::SeqCst)
    }

    /// Texts successfully synthesized, in call order
    pub fn spoken_texts(&self) -> Vec<String> {
        self.spoken.lock().clone()
    }
}

#[async_trait]
impl CardBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, word: &str, _usage_notes: UsageNotes) -> Result<GenerationResult, ProviderError> {
        self.generate_count.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.generation_failure.lock().next_error() {
            return Err(error);
        }

        let card = self.cards.lock().get(&word.to_lowercase()).cloned();
        Ok(card.unwrap_or_else(|| Self::default_card(word)))
    }

    async fn synthesize_speech(&self, text: &str, destination: &Path) -> Result<(), ProviderError> {
        self.speech_count.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.speech_failure.lock().next_error() {
            return Err(error);
        }

        FileManager::write_atomic(destination, format!("MOCK-AUDIO:{}", text).as_bytes())?;
        self.spoken.lock().push(text.to_string());
        Ok(())
    }

    async fn translate_batch(
        &self,
        tokens: &[String],
        _languages: &LanguagePair,
    ) -> Result<HashMap<String, String>, ProviderError> {
        self.translate_count.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.translation_failure.lock().next_error() {
            return Err(error);
        }

        let known = self.translations.lock();
        Ok(tokens
            .iter()
            .filter_map(|token| known.get(token).map(|tr| (token.clone(), tr.clone())))
            .collect())
    }
}
