use async_trait::async_trait;
use base64::Engine;
use log::{debug, error};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::app_config::{Config, UsageNotes};
use crate::errors::ProviderError;
use crate::file_utils::FileManager;
use crate::language_utils;
use crate::providers::{prompts, CardBackend, GenerationResult, LanguagePair};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const TTS_URL: &str = "https://texttospeech.googleapis.com/v1/text:synthesize";
const TRANSLATE_URL: &str = "https://translation.googleapis.com/language/translate/v2";
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Translate v2 accepts at most 128 segments per request
const TRANSLATE_CHUNK_SIZE: usize = 100;

/// Google client for Gemini, Cloud Text-to-Speech and Translate v2
#[derive(Debug)]
pub struct GoogleBackend {
    client: Client,
    api_key: String,
    gemini_model: String,
    tts_language_code: String,
    tts_voice: String,
    audio_ext: String,
    temperature: Option<f32>,
    languages: LanguagePair,
}

#[derive(Debug, Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeRequest<'a> {
    input: SynthesisInput<'a>,
    voice: VoiceSelection<'a>,
    audio_config: AudioConfig<'a>,
}

#[derive(Debug, Serialize)]
struct SynthesisInput<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
    language_code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig<'a> {
    audio_encoding: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    #[serde(default)]
    audio_content: String,
}

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    q: &'a [String],
    target: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'a str>,
    format: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    data: TranslateData,
}

#[derive(Debug, Deserialize)]
struct TranslateData {
    #[serde(default)]
    translations: Vec<TranslatedText>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslatedText {
    #[serde(default)]
    translated_text: String,
}

impl GoogleBackend {
    /// Create a new Google client
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder().timeout(timeout).build().unwrap_or_default(),
            api_key: api_key.into(),
            gemini_model: "gemini-1.5-flash".to_string(),
            tts_language_code: "id-ID".to_string(),
            tts_voice: "id-ID-Wavenet-C".to_string(),
            audio_ext: "mp3".to_string(),
            temperature: None,
            languages: LanguagePair {
                source_label: "Source".to_string(),
                target_label: "Target".to_string(),
                source_code: String::new(),
                target_code: String::new(),
            },
        }
    }

    /// Create a client from the application config
    pub fn from_config(config: &Config) -> Self {
        let mut backend = Self::new(&config.google_api_key, Duration::from_secs(config.request_timeout_secs));
        backend.gemini_model = config.text_model_google.clone();
        backend.tts_language_code = config.google_tts_language_code.clone();
        backend.tts_voice = config.google_tts_voice.clone();
        backend.audio_ext = config.audio_ext.clone();
        backend.temperature = config.temperature;
        backend.languages = LanguagePair::from_config(config);
        backend
    }

    fn endpoint_url(&self, base: &str) -> Result<Url, ProviderError> {
        Url::parse(base).map_err(|e| ProviderError::RequestFailed(format!("Invalid Google API URL {}: {}", base, e)))
    }

    // The key travels in a header so it never shows up in a URL
    fn authorized_post(&self, url: Url) -> RequestBuilder {
        self.client.post(url).header(API_KEY_HEADER, &self.api_key)
    }

    async fn post_json<B, R>(&self, context: &str, url: Url, body: &B) -> Result<R, ProviderError>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let response = self
            .authorized_post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(context, e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            error!("{} error ({}): {}", context, status, error_text);
            return Err(ProviderError::from_status(status.as_u16(), &error_text));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| ProviderError::ParseError(format!("{} response: {}", context, e)))
    }

    // Cloud TTS encoding matching the configured file extension
    fn audio_encoding(&self) -> &'static str {
        match self.audio_ext.to_lowercase().as_str() {
            "wav" => "LINEAR16",
            "ogg" | "opus" => "OGG_OPUS",
            _ => "MP3",
        }
    }
}

// Translate v2 wants bare ISO 639-1 codes where they exist
fn translate_code(code: &str) -> String {
    language_utils::normalize_to_part1_or_part3(code).unwrap_or_else(|_| code.trim().to_lowercase())
}

#[async_trait]
impl CardBackend for GoogleBackend {
    fn name(&self) -> &str {
        "google"
    }

    fn model(&self) -> &str {
        &self.gemini_model
    }

    async fn generate(&self, word: &str, usage_notes: UsageNotes) -> Result<GenerationResult, ProviderError> {
        let prompt = format!(
            "{}\n\n{}",
            prompts::CARD_SYSTEM_NOTE,
            prompts::card_prompt(word, usage_notes, &self.languages)
        );
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: &prompt }],
            }],
            generation_config: self.temperature.map(|temperature| GeminiGenerationConfig { temperature }),
        };

        let url = self.endpoint_url(&format!("{}/models/{}:generateContent", GEMINI_BASE_URL, self.gemini_model))?;
        let response: GeminiResponse = self.post_json("Gemini request", url, &request).await?;

        let text: String = response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts.into_iter().map(|part| part.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ProviderError::ParseError("Gemini returned no text".to_string()));
        }
        GenerationResult::from_model_text(text.trim())
    }

    async fn synthesize_speech(&self, text: &str, destination: &Path) -> Result<(), ProviderError> {
        let request = SynthesizeRequest {
            input: SynthesisInput { text },
            voice: VoiceSelection {
                language_code: &self.tts_language_code,
                name: (!self.tts_voice.is_empty()).then_some(self.tts_voice.as_str()),
            },
            audio_config: AudioConfig {
                audio_encoding: self.audio_encoding(),
            },
        };

        let url = self.endpoint_url(TTS_URL)?;
        let response: SynthesizeResponse = self.post_json("Google TTS request", url, &request).await?;

        let audio = base64::engine::general_purpose::STANDARD
            .decode(response.audio_content.as_bytes())
            .map_err(|e| ProviderError::ParseError(format!("Google TTS audio content: {}", e)))?;
        if audio.is_empty() {
            return Err(ProviderError::ParseError("Google TTS returned empty audio".to_string()));
        }

        FileManager::write_atomic(destination, &audio)?;
        debug!("Wrote {} bytes of speech to {}", audio.len(), destination.display());
        Ok(())
    }

    async fn translate_batch(
        &self,
        tokens: &[String],
        languages: &LanguagePair,
    ) -> Result<HashMap<String, String>, ProviderError> {
        let unique: Vec<String> = tokens
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let target = translate_code(&languages.target_code);
        let source = (!languages.source_code.is_empty()).then(|| translate_code(&languages.source_code));

        let mut translations = HashMap::new();
        for chunk in unique.chunks(TRANSLATE_CHUNK_SIZE) {
            let request = TranslateRequest {
                q: chunk,
                target: &target,
                source: source.as_deref(),
                format: "text",
            };
            let url = self.endpoint_url(TRANSLATE_URL)?;
            let response: TranslateResponse = self.post_json("Google Translate request", url, &request).await?;

            for (token, translated) in chunk.iter().zip(response.data.translations) {
                let text = translated.translated_text.trim();
                if !text.is_empty() {
                    translations.insert(token.clone(), text.to_string());
                }
            }
        }

        Ok(translations)
    }
}
