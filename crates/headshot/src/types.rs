//! Core data types flowing through the pipeline.
//!
//! Every value here is built once and passed forward; nothing is mutated
//! after construction.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Maximum number of characters of a `src` kept in reports and inventories.
pub const SRC_DISPLAY_LIMIT: usize = 100;

/// Where an image's bytes come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginKind {
    /// Fetched over the network from a URL.
    Remote,
    /// Embedded in the markup as a `data:` reference.
    Inline,
}

impl OriginKind {
    /// Classify a source value by its prefix.
    pub fn detect(source_value: &str) -> Self {
        let trimmed = source_value.trim_start();
        match trimmed.get(..5) {
            Some(prefix) if prefix.eq_ignore_ascii_case("data:") => Self::Inline,
            _ => Self::Remote,
        }
    }
}

/// A resolved pointer to the target image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    /// The attribute value exactly as found in the document.
    pub source_value: String,
    pub origin_kind: OriginKind,
    /// The selector of the descriptor that produced this reference.
    pub classifying_selector: String,
}

impl ImageReference {
    /// Build a reference, deciding the origin kind once.
    pub fn new(source_value: impl Into<String>, classifying_selector: impl Into<String>) -> Self {
        let source_value = source_value.into();
        let origin_kind = OriginKind::detect(&source_value);
        Self {
            source_value,
            origin_kind,
            classifying_selector: classifying_selector.into(),
        }
    }
}

/// Raw image bytes between fetch/decode and persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalResult {
    pub bytes: Vec<u8>,
    pub byte_length: usize,
    /// Mime type from the data envelope or the response headers.
    pub mime: Option<String>,
    /// The absolute URL actually fetched, for remote origins.
    pub resolved_url: Option<String>,
}

impl RetrievalResult {
    pub fn new(bytes: Vec<u8>, mime: Option<String>, resolved_url: Option<String>) -> Self {
        let byte_length = bytes.len();
        Self {
            bytes,
            byte_length,
            mime,
            resolved_url,
        }
    }
}

/// Terminal value of the locator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResolutionOutcome {
    Found(ImageReference),
    NotFound { attempted_selectors: Vec<String> },
}

/// Attributes read from one candidate element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementAttributes {
    pub src: Option<String>,
    pub alt: Option<String>,
    pub class: Option<String>,
}

impl ElementAttributes {
    /// The `src` value if it is present and not blank.
    pub fn usable_src(&self) -> Option<&str> {
        self.src.as_deref().filter(|s| !s.trim().is_empty())
    }
}

/// One entry of the failure-time image inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSummary {
    pub src: Option<String>,
    pub alt: Option<String>,
    pub class_names: Option<String>,
}

/// Everything captured to help a human triage a failed resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticsArtifact {
    pub snapshot_path: Option<PathBuf>,
    pub snapshot_error: Option<String>,
    pub inventory_path: Option<PathBuf>,
    pub image_inventory: Vec<ImageSummary>,
    pub login_wall_detected: bool,
}

/// Why a target failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    InvalidAddress { message: String },
    Navigation { message: String },
    NotFound { attempted_selectors: Vec<String> },
    Decode { message: String },
    Retrieval { message: String },
    EmptyPayload { message: String },
    Persist { message: String },
    Cancelled,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidAddress { message } => write!(f, "invalid address: {message}"),
            Self::Navigation { message } => write!(f, "navigation failed: {message}"),
            Self::NotFound {
                attempted_selectors,
            } => write!(
                f,
                "profile image not found after {} selector(s): {}",
                attempted_selectors.len(),
                attempted_selectors.join(", ")
            ),
            Self::Decode { message } => write!(f, "decode failed: {message}"),
            Self::Retrieval { message } => write!(f, "retrieval failed: {message}"),
            Self::EmptyPayload { message } => write!(f, "empty payload: {message}"),
            Self::Persist { message } => write!(f, "could not save image: {message}"),
            Self::Cancelled => write!(f, "cancelled before processing"),
        }
    }
}

/// Terminal outcome of one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TargetOutcome {
    Success {
        path: PathBuf,
        source_url: String,
        selector_used: String,
        byte_length: usize,
    },
    Failure {
        reason: FailureReason,
        diagnostics: Option<DiagnosticsArtifact>,
    },
}

/// One processed target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetResult {
    pub target_id: String,
    pub outcome: TargetOutcome,
}

impl TargetResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, TargetOutcome::Success { .. })
    }

    /// Path of the diagnostics snapshot, if one was captured.
    pub fn diagnostics_path(&self) -> Option<&PathBuf> {
        match &self.outcome {
            TargetOutcome::Failure {
                diagnostics: Some(d),
                ..
            } => d.snapshot_path.as_ref(),
            _ => None,
        }
    }
}

/// Ordered results of a run, one per input target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub results: Vec<TargetResult>,
}

impl BatchReport {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.len() - self.succeeded()
    }

    pub fn all_succeeded(&self) -> bool {
        !self.is_empty() && self.failed() == 0
    }
}

/// Shorten a source value for display.
pub fn truncate_src(src: &str) -> String {
    if src.chars().count() <= SRC_DISPLAY_LIMIT {
        return src.to_string();
    }
    let head: String = src.chars().take(SRC_DISPLAY_LIMIT).collect();
    format!("{head}...")
}
