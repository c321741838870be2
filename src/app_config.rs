use anyhow::{anyhow, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cards::retry::RetryPolicy;
use crate::language_utils;

/// Application configuration module
/// This module handles loading, validating and saving the flat key/value
/// configuration file. Every key is optional; missing keys take the defaults
/// below.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct Config {
    /// Backend used for card generation and OOV translation
    pub backend: BackendKind,

    /// OpenAI API key (falls back to the OPENAI_API_KEY env var)
    pub openai_api_key: String,

    /// OpenAI-compatible endpoint
    pub openai_endpoint: String,

    /// OpenAI chat model
    pub text_model_openai: String,

    /// OpenAI speech model
    pub tts_model_openai: String,

    /// OpenAI speech voice
    pub tts_voice_openai: String,

    /// Google API key (falls back to the GOOGLE_API_KEY env var)
    pub google_api_key: String,

    /// Gemini model
    pub text_model_google: String,

    /// Google Cloud TTS language code, e.g. "id-ID"
    pub google_tts_language_code: String,

    /// Google Cloud TTS voice name
    pub google_tts_voice: String,

    /// Sampling temperature; unset lets the model decide
    pub temperature: Option<f32>,

    /// Per-request HTTP timeout
    pub request_timeout_secs: u64,

    /// Display label of the source language (derived from the code when empty)
    pub source_lang: String,

    /// Display label of the target language (derived from the code when empty)
    pub target_lang: String,

    /// ISO code of the source language
    pub source_lang_code: String,

    /// ISO code of the target language
    pub target_lang_code: String,

    /// Default usage-notes mode
    pub usage_notes_def: UsageNotes,

    /// Maximum attempts per backend operation
    pub max_retries: u32,

    /// Lower bound of the retry wait
    pub retry_min_wait_secs: f64,

    /// Upper bound of the retry wait
    pub retry_max_wait_secs: f64,

    /// Whether generation results are cached on disk
    pub enable_cache: bool,

    /// Cache directory
    pub cache_dir: PathBuf,

    /// Whether already processed words are skipped on restart
    pub resume_enabled: bool,

    /// Resume ledger path
    pub state_file: PathBuf,

    /// Output directory for the deck file and media
    pub output_dir: PathBuf,

    /// Media directory name, relative to the output directory
    pub output_media_dir: PathBuf,

    /// Deck file name, relative to the output directory
    pub output_tsv: PathBuf,

    /// OOV report path
    pub extra_words_file: PathBuf,

    /// Audio file extension / format
    pub audio_ext: String,

    /// Delay between items, in seconds
    pub sleep_between_calls: f64,

    /// Whether example sentences get audio
    pub add_example_audio: bool,

    /// Playback rate baked into example audio (0.5 - 2.0)
    pub example_audio_rate: f64,

    /// Whether the new-words block is filled
    pub show_new_words_on_back: bool,

    /// Whether OOV tokens are translated
    pub oov_translate: bool,

    /// Re-synthesize audio even if the file exists
    pub regenerate_audio_always: bool,

    /// Speech backend override
    #[serde(rename = "OVERRIDE_TTS_BACKEND")]
    pub speech_override: SpeechOverride,

    /// Log level for this application
    pub log_level: LogLevel,

    /// Log level for third-party crates
    pub third_party_log_level: LogLevel,
}

/// Generation backend type
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    OpenAI,
    Google,
}

impl BackendKind {
    // @returns: Capitalized backend name
    pub fn display_name(&self) -> &str {
        match self {
            Self::OpenAI => "OpenAI",
            Self::Google => "Google",
        }
    }

    // @returns: Lowercase backend identifier, used in cache keys
    pub fn to_lowercase_string(&self) -> String {
        match self {
            Self::OpenAI => "openai".to_string(),
            Self::Google => "google".to_string(),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_lowercase_string())
    }
}

impl std::str::FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "google" => Ok(Self::Google),
            _ => Err(anyhow!("Invalid backend type: {} (expected 'openai' or 'google')", s)),
        }
    }
}

/// How much usage commentary the model should add to the note field
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum UsageNotes {
    #[default]
    Auto,
    Always,
    Never,
}

impl UsageNotes {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Always => "always",
            Self::Never => "never",
        }
    }
}

impl std::fmt::Display for UsageNotes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which backend synthesizes speech
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpeechOverride {
    /// Use the generation backend, no fallback
    #[default]
    #[serde(rename = "none", alias = "openai")]
    Disabled,
    /// Google speech first, generation backend as fallback
    Google,
    /// Like `Google`, but only for Indonesian source text
    Auto,
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_openai_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_openai_tts_model() -> String {
    "gpt-4o-mini-tts".to_string()
}

fn default_openai_voice() -> String {
    "alloy".to_string()
}

fn default_google_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_max_retries() -> u32 {
    6
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_sleep_between_calls() -> f64 {
    0.03
}

impl Default for Config {
    fn default() -> Self {
        Config {
            backend: BackendKind::default(),
            openai_api_key: String::new(),
            openai_endpoint: default_openai_endpoint(),
            text_model_openai: default_openai_model(),
            tts_model_openai: default_openai_tts_model(),
            tts_voice_openai: default_openai_voice(),
            google_api_key: String::new(),
            text_model_google: default_google_model(),
            google_tts_language_code: "id-ID".to_string(),
            google_tts_voice: "id-ID-Wavenet-C".to_string(),
            temperature: None,
            request_timeout_secs: default_request_timeout_secs(),
            source_lang: String::new(),
            target_lang: String::new(),
            source_lang_code: "id".to_string(),
            target_lang_code: "nl".to_string(),
            usage_notes_def: UsageNotes::default(),
            max_retries: default_max_retries(),
            retry_min_wait_secs: 1.0,
            retry_max_wait_secs: 60.0,
            enable_cache: true,
            cache_dir: PathBuf::from("cache"),
            resume_enabled: true,
            state_file: PathBuf::from("out/state.json"),
            output_dir: PathBuf::from("out"),
            output_media_dir: PathBuf::from("media"),
            output_tsv: PathBuf::from("anki_notes.tsv"),
            extra_words_file: PathBuf::from("out/extra_words.txt"),
            audio_ext: "mp3".to_string(),
            sleep_between_calls: default_sleep_between_calls(),
            add_example_audio: true,
            example_audio_rate: 1.0,
            show_new_words_on_back: true,
            oov_translate: true,
            regenerate_audio_always: false,
            speech_override: SpeechOverride::default(),
            log_level: LogLevel::default(),
            third_party_log_level: LogLevel::Warn,
        }
    }
}

impl Config {
    /// Load the configuration from a JSON file, writing a default one when
    /// the file does not exist yet
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let file = File::open(path)
                .with_context(|| format!("Failed to open config file: {}", path.display()))?;
            let reader = BufReader::new(file);
            serde_json::from_reader::<_, Config>(reader)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            warn!("Config file not found at '{}', creating default config.", path.display());
            let config = Config::default();
            let config_json = serde_json::to_string_pretty(&config)
                .context("Failed to serialize default config to JSON")?;
            std::fs::write(path, config_json)
                .with_context(|| format!("Failed to write default config to file: {}", path.display()))?;
            config
        };

        config.apply_env_fallbacks();
        Ok(config)
    }

    /// Fill empty API keys from the environment
    pub fn apply_env_fallbacks(&mut self) {
        if self.openai_api_key.is_empty() {
            if let Ok(key) = std::env::var("OPENAI_API_KEY") {
                self.openai_api_key = key;
            }
        }
        if self.google_api_key.is_empty() {
            if let Ok(key) = std::env::var("GOOGLE_API_KEY") {
                self.google_api_key = key;
            }
        }
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        if !(0.5..=2.0).contains(&self.example_audio_rate) {
            return Err(anyhow!(
                "EXAMPLE_AUDIO_RATE must be between 0.5 and 2.0 (e.g. 0.85 or 1.25), got {}",
                self.example_audio_rate
            ));
        }

        if self.max_retries == 0 {
            return Err(anyhow!("MAX_RETRIES must be at least 1"));
        }

        if self.retry_min_wait_secs <= 0.0 || self.retry_min_wait_secs > self.retry_max_wait_secs {
            return Err(anyhow!(
                "RETRY_MIN_WAIT_SECS ({}) must be positive and not above RETRY_MAX_WAIT_SECS ({})",
                self.retry_min_wait_secs,
                self.retry_max_wait_secs
            ));
        }

        if self.sleep_between_calls < 0.0 {
            return Err(anyhow!("SLEEP_BETWEEN_CALLS cannot be negative"));
        }

        if self.audio_ext.trim().is_empty() {
            return Err(anyhow!("AUDIO_EXT cannot be empty"));
        }

        for code in [&self.source_lang_code, &self.target_lang_code] {
            if !code.is_empty() {
                language_utils::validate_language_code(code)?;
            }
        }

        match self.backend {
            BackendKind::OpenAI if self.openai_api_key.is_empty() => {
                return Err(anyhow!("OPENAI_API_KEY is required for the OpenAI backend"));
            }
            BackendKind::Google if self.google_api_key.is_empty() => {
                return Err(anyhow!("GOOGLE_API_KEY is required for the Google backend"));
            }
            _ => {}
        }

        if self.uses_google_speech() && self.google_api_key.is_empty() {
            return Err(anyhow!("GOOGLE_API_KEY is required when OVERRIDE_TTS_BACKEND selects Google"));
        }

        Ok(())
    }

    /// Whether the speech override resolves to Google speech
    pub fn uses_google_speech(&self) -> bool {
        match self.speech_override {
            SpeechOverride::Disabled => false,
            SpeechOverride::Google => true,
            SpeechOverride::Auto => self.source_lang_code.eq_ignore_ascii_case("id"),
        }
    }

    /// Model identity of the active backend, used in cache keys
    pub fn active_model(&self) -> &str {
        match self.backend {
            BackendKind::OpenAI => &self.text_model_openai,
            BackendKind::Google => &self.text_model_google,
        }
    }

    /// Display label of the source language
    pub fn source_label(&self) -> String {
        resolve_label(&self.source_lang, &self.source_lang_code, "Source")
    }

    /// Display label of the target language
    pub fn target_label(&self) -> String {
        resolve_label(&self.target_lang, &self.target_lang_code, "Target")
    }

    /// Retry bounds for every backend operation
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_secs_f64(self.retry_min_wait_secs),
            Duration::from_secs_f64(self.retry_max_wait_secs),
        )
    }

    /// Courtesy delay between items
    pub fn item_delay(&self) -> Duration {
        Duration::from_secs_f64(self.sleep_between_calls.max(0.0))
    }

    /// Media directory, resolved against the output directory
    pub fn media_dir(&self) -> PathBuf {
        self.output_dir.join(&self.output_media_dir)
    }

    /// Deck file path, resolved against the output directory
    pub fn deck_path(&self) -> PathBuf {
        self.output_dir.join(&self.output_tsv)
    }
}

// Explicit label wins, then the ISO name of the code, then a generic fallback
fn resolve_label(label: &str, code: &str, fallback: &str) -> String {
    if !label.trim().is_empty() {
        return label.trim().to_string();
    }
    if !code.is_empty() {
        if let Ok(name) = language_utils::get_language_name(code) {
            return name;
        }
    }
    fallback.to_string()
}
