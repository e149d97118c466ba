//! Error types for every stage of the pipeline.
//!
//! Stage errors stay typed inside the library. The orchestrator folds them
//! into [`FailureReason`](crate::types::FailureReason) values so one target's
//! failure never escapes a batch.

use std::path::PathBuf;

/// Errors raised by a [`Document`](crate::document::Document) implementation.
#[derive(thiserror::Error, Debug)]
pub enum DocumentError {
    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("navigation timed out after {0}ms")]
    NavigationTimeout(u64),

    #[error("invalid selector `{selector}`: {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("stale element handle (generation {held}, current {current})")]
    StaleHandle { held: u64, current: u64 },

    #[error("no document loaded")]
    NotLoaded,

    #[error("snapshot failed: {0}")]
    Snapshot(String),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a [`Fetcher`](crate::fetch::Fetcher).
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        match err.url() {
            Some(url) if err.is_timeout() => FetchError::Timeout {
                url: url.to_string(),
            },
            _ => FetchError::Network(err.to_string()),
        }
    }
}

/// Malformed inline (`data:`) payloads.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("not a data reference")]
    NotInline,

    #[error("missing comma separator in data reference")]
    MissingSeparator,

    #[error("data reference is not base64-encoded")]
    NotBase64,

    #[error("data reference has an empty body")]
    EmptyBody,

    #[error("invalid base64 body: {0}")]
    InvalidBase64(String),
}

/// Failures while turning an image reference into bytes.
#[derive(thiserror::Error, Debug)]
pub enum RetrievalError {
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("cannot resolve `{reference}` against `{base}`: {reason}")]
    InvalidUrl {
        reference: String,
        base: String,
        reason: String,
    },

    #[error("fetch of {url} returned HTTP {status}")]
    Status { status: u16, url: String },

    #[error("fetch failed: {0}")]
    Transport(#[from] FetchError),

    #[error("empty payload from {source_value}")]
    EmptyPayload { source_value: String },
}

/// Failures while writing an artifact to disk.
#[derive(thiserror::Error, Debug)]
pub enum PersistError {
    #[error("could not create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("no free filename for {0} after {1} attempts")]
    Exhausted(PathBuf, u32),
}

/// Hard failures surfaced to the caller of a single-target run.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("invalid address `{address}`: {reason}")]
    InvalidAddress { address: String, reason: String },
}

/// Errors loading a candidate registry from disk.
#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("registry contains no candidates")]
    Empty,
}
