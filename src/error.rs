//! Error types for the clipcast library.
//!
//! Component-level functions return these errors but never unwind past the
//! pipeline boundary: the orchestrator is the single place that maps a stage
//! error to a terminal task failure.

use thiserror::Error;

/// Errors produced by the clipcast library.
#[derive(Debug, Error)]
pub enum ClipcastError {
    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No usable content to process; always fatal for the current stage.
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// A collaborator call failed or returned malformed data after the
    /// bounded retries were exhausted.
    #[error("Provider error: {0}")]
    Provider(String),

    /// An expected external media tool is missing. Never fatal: callers fall
    /// back to an alternate measurement library or pass through the first
    /// valid input.
    #[error("Tool unavailable: {0}")]
    ToolUnavailable(String),

    /// A produced artifact failed a structural check (empty or unparsable
    /// subtitle file). Triggers the documented fallback chain.
    #[error("Validation failure: {0}")]
    Validation(String),

    /// Script generation error
    #[error("Script generation error: {0}")]
    ScriptGeneration(String),

    /// Speech synthesis error
    #[error("Speech synthesis error: {0}")]
    SpeechSynthesis(String),

    /// Audio processing error
    #[error("Audio processing error: {0}")]
    AudioProcessing(String),

    /// Subtitle processing error
    #[error("Subtitle processing error: {0}")]
    SubtitleProcessing(String),

    /// Transcription error
    #[error("Transcription error: {0}")]
    Transcription(String),

    /// Material acquisition error
    #[error("Material error: {0}")]
    Material(String),

    /// Video rendering error
    #[error("Render error: {0}")]
    Render(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid parameters for the requested mode
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

impl From<&str> for ClipcastError {
    fn from(s: &str) -> Self {
        ClipcastError::Other(s.to_string())
    }
}

impl From<String> for ClipcastError {
    fn from(s: String) -> Self {
        ClipcastError::Other(s)
    }
}

/// Result type used throughout the library.
pub type Result<T> = std::result::Result<T, ClipcastError>;
