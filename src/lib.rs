/*!
 * # lingodeck - vocabulary flashcards from a word list
 *
 * A Rust library and CLI that turns a list of words into a flashcard deck
 * with translations, example sentences, audio and new-word hints.
 *
 * ## Features
 *
 * - Card generation through OpenAI or Google Gemini
 * - Speech synthesis with an optional Google Cloud TTS override and fallback
 * - Exponential backoff on rate limits and transient network errors
 * - On-disk generation cache and a resume ledger for interrupted runs
 * - Playback-rate adjustment of example audio through ffmpeg
 * - Out-of-vocabulary word extraction and translation
 * - Tab-separated deck output with `[sound:..]` references
 *
 * ## Architecture
 *
 * - `app_config`: Configuration management
 * - `cards`: Pipeline building blocks:
 *   - `cards::retry`: Retry with backoff
 *   - `cards::cache`: Generation cache
 *   - `cards::resume`: Resume ledger
 *   - `cards::oov`: New-word extraction
 *   - `cards::audio`: Playback-rate post-processing
 *   - `cards::pipeline`: Per-word orchestrator
 * - `providers`: Backend clients (OpenAI, Google, mock)
 * - `deck`: Deck packaging
 * - `file_utils`: File system operations
 * - `app_controller`: Main application controller
 * - `language_utils`: ISO language code utilities
 * - `errors`: Custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod cards;
pub mod deck;
pub mod errors;
pub mod file_utils;
pub mod language_utils;
pub mod providers;

// Re-export main types for easier usage
pub use app_config::Config;
pub use cards::{CardPipeline, ItemOutcome, ResultRow, RunReport};
pub use errors::{AppError, AudioError, PipelineError, ProviderError};
pub use providers::{CardBackend, GenerationResult, LanguagePair};
