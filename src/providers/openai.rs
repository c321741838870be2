use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, error, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::time::Duration;

use crate::app_config::{Config, UsageNotes};
use crate::errors::ProviderError;
use crate::file_utils::FileManager;
use crate::providers::{parse_translation_map, prompts, CardBackend, GenerationResult, LanguagePair};

/// OpenAI client for chat completions and speech synthesis
#[derive(Debug)]
pub struct OpenAiBackend {
    /// HTTP client for API requests
    client: Client,
    /// API key for authentication
    api_key: String,
    /// API base URL, e.g. "https://api.openai.com/v1"
    endpoint: String,
    /// Chat model
    text_model: String,
    /// Speech model
    tts_model: String,
    /// Speech voice
    voice: String,
    /// Requested audio container, e.g. "mp3"
    audio_ext: String,
    /// Sampling temperature, dropped if the model rejects it
    temperature: Option<f32>,
    /// Languages used in prompts
    languages: LanguagePair,
}

/// Chat message object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender (system, user or assistant)
    pub role: String,
    /// Content of the message
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
        }
    }
}

/// Chat completion request
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// Chat completion response
#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Speech request
#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'a str,
}

impl OpenAiBackend {
    /// Create a new OpenAI client
    pub fn new(api_key: impl Into<String>, endpoint: impl Into<String>, timeout: Duration) -> Self {
        let endpoint = endpoint.into();
        Self {
            client: Client::builder().timeout(timeout).build().unwrap_or_default(),
            api_key: api_key.into(),
            endpoint: if endpoint.is_empty() {
                "https://api.openai.com/v1".to_string()
            } else {
                endpoint.trim_end_matches('/').to_string()
            },
            text_model: "gpt-4o-mini".to_string(),
            tts_model: "gpt-4o-mini-tts".to_string(),
            voice: "alloy".to_string(),
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
        let mut backend = Self::new(
            &config.openai_api_key,
            &config.openai_endpoint,
            Duration::from_secs(config.request_timeout_secs),
        );
        backend.text_model = config.text_model_openai.clone();
        backend.tts_model = config.tts_model_openai.clone();
        backend.voice = config.tts_voice_openai.clone();
        backend.audio_ext = config.audio_ext.clone();
        backend.temperature = config.temperature;
        backend.languages = LanguagePair::from_config(config);
        backend
    }

    /// Run a chat completion, retrying once without temperature when the
    /// model refuses the parameter
    async fn chat_complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        match self.send_chat(messages, self.temperature).await {
            Err(e) if self.temperature.is_some() && rejects_temperature(&e) => {
                warn!("Model {} rejected the temperature setting, retrying without it", self.text_model);
                self.send_chat(messages, None).await
            }
            other => other,
        }
    }

    async fn send_chat(&self, messages: &[ChatMessage], temperature: Option<f32>) -> Result<String, ProviderError> {
        let api_url = format!("{}/chat/completions", self.endpoint);
        let request = ChatRequest {
            model: &self.text_model,
            messages,
            temperature,
        };

        let response = self
            .client
            .post(&api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport("OpenAI chat request", e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            error!("OpenAI API error ({}): {}", status, error_text);
            return Err(ProviderError::from_status(status.as_u16(), &error_text));
        }

        let chat_response = response
            .json::<ChatResponse>()
            .await
            .map_err(|e| ProviderError::ParseError(format!("OpenAI chat response: {}", e)))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| ProviderError::ParseError("OpenAI returned an empty completion".to_string()))
    }

    async fn fetch_speech(&self, text: &str) -> Result<Bytes, ProviderError> {
        let api_url = format!("{}/audio/speech", self.endpoint);
        let request = SpeechRequest {
            model: &self.tts_model,
            voice: &self.voice,
            input: text,
            response_format: &self.audio_ext,
        };

        let response = self
            .client
            .post(&api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport("OpenAI speech request", e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), &error_text));
        }

        response
            .bytes()
            .await
            .map_err(|e| ProviderError::from_transport("OpenAI speech body", e))
    }
}

// A 400 whose message names the temperature parameter as unsupported
fn rejects_temperature(error: &ProviderError) -> bool {
    let message = error.to_string().to_lowercase();
    message.contains("temperature") && message.contains("unsupported")
}

#[async_trait]
impl CardBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.text_model
    }

    async fn generate(&self, word: &str, usage_notes: UsageNotes) -> Result<GenerationResult, ProviderError> {
        let messages = [
            ChatMessage::new("system", prompts::CARD_SYSTEM_NOTE),
            ChatMessage::new("user", prompts::card_prompt(word, usage_notes, &self.languages)),
        ];
        let text = self.chat_complete(&messages).await?;
        GenerationResult::from_model_text(&text)
    }

    async fn synthesize_speech(&self, text: &str, destination: &Path) -> Result<(), ProviderError> {
        let audio = self.fetch_speech(text).await?;
        if audio.is_empty() {
            return Err(ProviderError::ParseError("OpenAI returned empty audio".to_string()));
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
        if unique.is_empty() {
            return Ok(HashMap::new());
        }

        let messages = [
            ChatMessage::new("system", prompts::WORDS_SYSTEM_NOTE),
            ChatMessage::new("user", prompts::words_prompt(&unique, languages)),
        ];
        let text = self.chat_complete(&messages).await?;
        Ok(parse_translation_map(&text))
    }
}
