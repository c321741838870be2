/*!
 * Backend implementations for card generation, speech and word translation.
 *
 * This module contains client implementations for the supported services:
 * - OpenAI: chat completions and the speech endpoint
 * - Google: Gemini, Cloud Text-to-Speech and Translate v2
 * - Mock: scripted backend for tests
 */

use async_trait::async_trait;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

use crate::app_config::{BackendKind, Config, UsageNotes};
use crate::errors::ProviderError;

pub mod google;
pub mod mock;
pub mod openai;
pub mod prompts;

pub use google::GoogleBackend;
pub use mock::MockBackend;
pub use openai::OpenAiBackend;

// First `{` to last `}`, across lines
static JSON_OBJECT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("valid JSON object pattern"));

/// Source and target language of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguagePair {
    /// Display label of the source language, used in prompts
    pub source_label: String,
    /// Display label of the target language, used in prompts
    pub target_label: String,
    /// ISO code of the source language, may be empty
    pub source_code: String,
    /// ISO code of the target language
    pub target_code: String,
}

impl LanguagePair {
    pub fn from_config(config: &Config) -> Self {
        Self {
            source_label: config.source_label(),
            target_label: config.target_label(),
            source_code: config.source_lang_code.clone(),
            target_code: config.target_lang_code.clone(),
        }
    }
}

/// One generated card: translation, example pair and optional usage note
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GenerationResult {
    pub translation: String,
    pub example_src: String,
    pub example_tgt: String,
    #[serde(default)]
    pub note: String,
}

impl GenerationResult {
    /// Parse the JSON object embedded in free-form model output.
    ///
    /// The raw text never ends up in the error message, so retry
    /// classification only ever sees our own wording.
    pub fn from_model_text(text: &str) -> Result<Self, ProviderError> {
        let Some(object) = JSON_OBJECT_REGEX.find(text) else {
            debug!("Model output without JSON object: {}", text);
            return Err(ProviderError::ParseError("no JSON object in model output".to_string()));
        };

        let value: serde_json::Value = serde_json::from_str(object.as_str()).map_err(|e| {
            debug!("Unparsable model output: {}", text);
            ProviderError::ParseError(format!("invalid JSON in model output ({})", e))
        })?;

        let field = |name: &str| -> Option<String> {
            match value.get(name)? {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) => Some(s.trim().to_string()),
                other => Some(other.to_string()),
            }
        };
        let required = |name: &str| field(name).ok_or_else(|| ProviderError::IncompleteResponse(name.to_string()));

        let result = Self {
            translation: required("translation")?,
            example_src: required("example_src")?,
            example_tgt: required("example_tgt")?,
            note: field("note").unwrap_or_default(),
        };
        result.validate()?;
        Ok(result)
    }

    /// The first three fields must be non-empty; `note` may be empty
    pub fn validate(&self) -> Result<(), ProviderError> {
        for (name, value) in [
            ("translation", &self.translation),
            ("example_src", &self.example_src),
            ("example_tgt", &self.example_tgt),
        ] {
            if value.trim().is_empty() {
                return Err(ProviderError::IncompleteResponse(name.to_string()));
            }
        }
        Ok(())
    }
}

/// Parse a `{token: translation}` object out of model output. Anything
/// unparsable yields an empty mapping.
pub fn parse_translation_map(text: &str) -> HashMap<String, String> {
    let Some(object) = JSON_OBJECT_REGEX.find(text) else {
        return HashMap::new();
    };
    let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(object.as_str()) else {
        return HashMap::new();
    };

    map.into_iter()
        .filter_map(|(key, value)| {
            let translation = match value {
                serde_json::Value::String(s) => s.trim().to_string(),
                serde_json::Value::Null => return None,
                other => other.to_string(),
            };
            let key = key.trim().to_lowercase();
            (!key.is_empty() && !translation.is_empty()).then_some((key, translation))
        })
        .collect()
}

/// Common trait for all card backends
///
/// Every operation is a single remote call; retrying is the caller's job.
#[async_trait]
pub trait CardBackend: Send + Sync + Debug {
    /// Backend identifier, part of the cache key
    fn name(&self) -> &str;

    /// Text model identifier, part of the cache key
    fn model(&self) -> &str;

    /// Generate a card for `word`
    ///
    /// # Returns
    /// * `Result<GenerationResult, ProviderError>` - A validated result or an error
    async fn generate(&self, word: &str, usage_notes: UsageNotes) -> Result<GenerationResult, ProviderError>;

    /// Synthesize `text` into an audio file at `destination`
    async fn synthesize_speech(&self, text: &str, destination: &Path) -> Result<(), ProviderError>;

    /// Translate isolated words. The mapping may be partial; tokens the
    /// backend could not translate are simply absent.
    async fn translate_batch(
        &self,
        tokens: &[String],
        languages: &LanguagePair,
    ) -> Result<HashMap<String, String>, ProviderError>;
}

/// Create the generation backend selected in the config
pub fn create_backend(config: &Config) -> Arc<dyn CardBackend> {
    match config.backend {
        BackendKind::OpenAI => Arc::new(OpenAiBackend::from_config(config)),
        BackendKind::Google => Arc::new(GoogleBackend::from_config(config)),
    }
}

/// Resolve the speech backends: the primary one and an optional fallback
pub fn create_speech_backends(
    config: &Config,
    main: Arc<dyn CardBackend>,
) -> (Arc<dyn CardBackend>, Option<Arc<dyn CardBackend>>) {
    if !config.uses_google_speech() || config.backend == BackendKind::Google {
        return (main, None);
    }
    (Arc::new(GoogleBackend::from_config(config)), Some(main))
}
