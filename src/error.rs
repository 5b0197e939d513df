use std::path::PathBuf;
use thiserror::Error;

/// Failures reported by the text sink
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("text sink unavailable: {0}")]
    Unavailable(String),
    #[error("range {start}..{end} is outside the document (length {len})")]
    RangeOutOfBounds { start: usize, end: usize, len: usize },
}

/// Conditions surfaced by the decoder. None of them are fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecoderError {
    #[error("speed level {0} is outside 1..=9")]
    InvalidSpeedLevel(u8),
    #[error(transparent)]
    SinkUnavailable(#[from] SinkError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine config directory")]
    NoConfigDir,
    #[error("failed to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize settings: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum InputError {
    #[error("invalid keying script: {0}")]
    Script(String),
    #[error("failed to read keying script {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed keying script: {0}")]
    Json(#[from] serde_json::Error),
    #[error("MIDI error: {0}")]
    Midi(String),
}
