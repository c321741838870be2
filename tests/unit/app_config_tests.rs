/*!
 * Tests for configuration loading and validation
 */

use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

use lingodeck::app_config::{BackendKind, Config, SpeechOverride, UsageNotes};
use crate::common;

fn valid_config() -> Config {
    Config {
        openai_api_key: "sk-test".to_string(),
        ..Config::default()
    }
}

/// Test the documented defaults
#[test]
fn test_default_config_shouldHaveExpectedValues() {
    let config = Config::default();
    assert_eq!(config.backend, BackendKind::OpenAI);
    assert_eq!(config.usage_notes_def, UsageNotes::Auto);
    assert_eq!(config.max_retries, 6);
    assert_eq!(config.audio_ext, "mp3");
    assert_eq!(config.example_audio_rate, 1.0);
    assert_eq!(config.speech_override, SpeechOverride::Disabled);
    assert!(config.enable_cache);
    assert!(config.resume_enabled);
    assert_eq!(config.media_dir(), PathBuf::from("out").join("media"));
    assert_eq!(config.deck_path(), PathBuf::from("out").join("anki_notes.tsv"));
}

/// Test that a partial file keeps defaults for every missing key
#[test]
fn test_load_or_create_withPartialFile_shouldMergeDefaults() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = common::create_test_file(
        temp_dir.path(),
        "config.json",
        r#"{
            "BACKEND": "google",
            "GOOGLE_API_KEY": "g-test",
            "USAGE_NOTES_DEF": "never",
            "EXAMPLE_AUDIO_RATE": 0.85,
            "OVERRIDE_TTS_BACKEND": "auto",
            "SLEEP_BETWEEN_CALLS": 0.5
        }"#,
    )?;

    let config = Config::load_or_create(&path)?;

    assert_eq!(config.backend, BackendKind::Google);
    assert_eq!(config.google_api_key, "g-test");
    assert_eq!(config.usage_notes_def, UsageNotes::Never);
    assert_eq!(config.example_audio_rate, 0.85);
    assert_eq!(config.speech_override, SpeechOverride::Auto);
    assert_eq!(config.item_delay(), Duration::from_millis(500));
    assert_eq!(config.text_model_google, "gemini-1.5-flash");
    assert_eq!(config.active_model(), "gemini-1.5-flash");
    assert!(config.validate().is_ok());
    Ok(())
}

/// Test that a missing file is created with the defaults
#[test]
fn test_load_or_create_withMissingFile_shouldWriteDefaults() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = temp_dir.path().join("config.json");

    let config = Config::load_or_create(&path)?;

    assert!(path.exists());
    assert_eq!(config.max_retries, 6);
    let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(written["BACKEND"], "openai");
    assert_eq!(written["OVERRIDE_TTS_BACKEND"], "none");
    Ok(())
}

/// Test that an unparsable file is an error
#[test]
fn test_load_or_create_withInvalidJson_shouldFail() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = common::create_test_file(temp_dir.path(), "config.json", "{ BACKEND: openai")?;
    assert!(Config::load_or_create(&path).is_err());
    Ok(())
}

/// Test the validation rules
#[test]
fn test_validate_withInvalidValues_shouldFail() {
    assert!(valid_config().validate().is_ok());

    let no_key = Config::default();
    assert!(Config { openai_api_key: String::new(), ..no_key }.validate().is_err());

    let fast = Config { example_audio_rate: 2.5, ..valid_config() };
    assert!(fast.validate().is_err());

    let slow = Config { example_audio_rate: 0.4, ..valid_config() };
    assert!(slow.validate().is_err());

    let no_attempts = Config { max_retries: 0, ..valid_config() };
    assert!(no_attempts.validate().is_err());

    let inverted = Config { retry_min_wait_secs: 10.0, retry_max_wait_secs: 5.0, ..valid_config() };
    assert!(inverted.validate().is_err());

    let no_backoff = Config { retry_min_wait_secs: 0.0, ..valid_config() };
    let error = no_backoff.validate().err().map(|e| e.to_string());
    assert!(error.is_some_and(|message| message.contains("RETRY_MIN_WAIT_SECS")));

    let bad_code = Config { target_lang_code: "zz-not-a-code".to_string(), ..valid_config() };
    assert!(bad_code.validate().is_err());

    let google_speech = Config { speech_override: SpeechOverride::Google, ..valid_config() };
    assert!(google_speech.validate().is_err());
}

/// Test how the speech override resolves
#[test]
fn test_uses_google_speech_shouldFollowOverrideAndSourceLanguage() {
    let disabled = valid_config();
    assert!(!disabled.uses_google_speech());

    let google = Config { speech_override: SpeechOverride::Google, ..valid_config() };
    assert!(google.uses_google_speech());

    let auto_id = Config { speech_override: SpeechOverride::Auto, ..valid_config() };
    assert!(auto_id.uses_google_speech());

    let auto_other = Config {
        speech_override: SpeechOverride::Auto,
        source_lang_code: "de".to_string(),
        ..valid_config()
    };
    assert!(!auto_other.uses_google_speech());
}

/// Test that retry bounds come from the config
#[test]
fn test_retry_policy_shouldUseConfiguredBounds() {
    let config = Config {
        max_retries: 3,
        retry_min_wait_secs: 2.0,
        retry_max_wait_secs: 8.0,
        ..valid_config()
    };
    let policy = config.retry_policy();
    assert_eq!(policy.max_attempts, 3);
    assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
    assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(8));
}
