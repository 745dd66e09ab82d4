//! Error types for the speech pipeline.

use std::path::PathBuf;

/// Errors produced while configuring, fetching or playing speech.
#[derive(Debug, thiserror::Error)]
pub enum SpeakerError {
    /// Submitted text was empty or whitespace only.
    #[error("Text to synthesize is empty")]
    EmptyText,

    /// Submitted text exceeds the synthesis service limit.
    #[error("Text is {chars} characters, the service accepts fewer than {limit}")]
    TextTooLong { chars: usize, limit: usize },

    /// API key or secret key missing.
    #[error("API key and secret key are both required")]
    MissingCredentials,

    /// A synthesis parameter is out of range.
    #[error("Invalid value {value} for {name}: expected 0..=15")]
    InvalidParam { name: &'static str, value: u8 },

    /// No access token has been obtained yet.
    #[error("Session is not initialized, exchange credentials first")]
    NotInitialized,

    /// Settings file could not be parsed.
    #[error("Invalid settings file {}: {source}", .path.display())]
    Config {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Transport-level HTTP failure (connect, timeout, read).
    #[error("HTTP request failed: {0}")]
    Http(#[from] ureq::Error),

    /// Server answered with a non-success status.
    #[error("Server returned HTTP {0}")]
    Status(u16),

    /// Server answered with no audio bytes.
    #[error("Server returned an empty body")]
    EmptyBody,

    /// Synthesis service returned an error payload instead of audio.
    #[error("Synthesis rejected ({err_no}): {err_msg}")]
    SynthesisRejected { err_no: i64, err_msg: String },

    /// Token exchange reported a non-positive lifetime.
    #[error("Access token already expired (expires_in = {0})")]
    TokenExpired(i64),

    /// Token exchange response carried no token.
    #[error("Token response did not contain an access token")]
    TokenMissing,

    /// Token endpoint rejected the credentials.
    #[error("Token request rejected: {error}: {description}")]
    TokenRejected { error: String, description: String },

    /// Response body was not the expected JSON.
    #[error("Malformed response: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Audio bytes could not be decoded.
    #[error("Audio decode failed: {0}")]
    Decode(String),

    /// Audio output device unavailable or faulted.
    #[error("Audio device error: {0}")]
    Device(String),

    /// IO error (cache directory, settings file).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
