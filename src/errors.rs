/*!
 * Error types for the lingodeck application.
 *
 * This module contains custom error types for the different parts of the
 * card pipeline, using the thiserror crate for ergonomic error definitions.
 * Display strings matter here: the retry policy classifies errors by their
 * message, so status codes and transport causes are always part of it.
 */

use thiserror::Error;

/// Errors that can occur when talking to a generation or speech backend
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// The request did not complete within the client timeout
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Error establishing or maintaining a connection
    #[error("Failed to establish a new connection: {0}")]
    ConnectionError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// The backend answered without a parseable structured payload
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// The payload parsed but required fields are missing or empty
    #[error("Incomplete response: missing or empty field '{0}'")]
    IncompleteResponse(String),

    /// Writing the synthesized audio failed
    #[error("Failed to write audio file: {0}")]
    Io(#[from] std::io::Error),
}

impl ProviderError {
    /// Map a transport error from reqwest into the matching variant.
    ///
    /// The request URL is dropped from the message so credentials carried
    /// in it never reach logs or error chains.
    pub fn from_transport(context: &str, error: reqwest::Error) -> Self {
        let error = error.without_url();
        if error.is_timeout() {
            Self::Timeout(format!("{}: {}", context, error))
        } else if error.is_connect() {
            Self::ConnectionError(format!("{}: {}", context, error))
        } else {
            Self::RequestFailed(format!("{}: {}", context, error))
        }
    }

    /// Map a non-success HTTP status into the matching variant
    pub fn from_status(status_code: u16, body: &str) -> Self {
        let message = truncate_text(body, 300);
        match status_code {
            401 | 403 => Self::AuthenticationError(format!("HTTP {}: {}", status_code, message)),
            429 => Self::RateLimitExceeded(format!("HTTP 429: {}", message)),
            _ => Self::ApiError { status_code, message },
        }
    }
}

/// Errors from the audio post-processing step
#[derive(Error, Debug)]
pub enum AudioError {
    /// The external transform tool could not be started
    #[error("Audio tool '{tool}' not found: {reason}")]
    ToolMissing {
        /// Binary that was invoked
        tool: String,
        /// Underlying spawn error
        reason: String,
    },

    /// The tool ran but reported a failure
    #[error("Audio transform failed: {0}")]
    TransformFailed(String),

    /// Playback rate outside the supported range
    #[error("Invalid playback rate {0}, expected a value between 0.5 and 2.0")]
    InvalidRate(f64),

    /// Temp file or rename failure
    #[error("Audio file error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that stop a pipeline run
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Card generation failed after exhausting retries, or was malformed
    #[error("Generation failed for '{word}': {source}")]
    Generation {
        /// Word that could not be generated
        word: String,
        /// Backend error that ended the attempts
        #[source]
        source: ProviderError,
    },

    /// The resume ledger could not be persisted
    #[error("Failed to commit resume state: {0}")]
    Ledger(String),

    /// Any other filesystem failure during the run
    #[error("Pipeline I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from audio post-processing
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    /// Error from the card pipeline
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}

/// Truncate text to a maximum number of characters with ellipsis
pub(crate) fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}
