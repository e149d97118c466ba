//! Document adapter abstraction.
//!
//! Defines the `Document` trait the locator and diagnostics run against. The
//! rendering engine behind it (Chromium via chromiumoxide, or a static HTML
//! snapshot via scraper) is opaque to the rest of the crate.

pub mod chromium;
pub mod html;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DocumentError;

pub use chromium::{find_chromium, ChromiumDocument, ChromiumOptions};
pub use html::HtmlDocument;

/// Page lifecycle point at which navigation is considered complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitCondition {
    DomContentLoaded,
    Load,
    NetworkIdle,
}

impl WaitCondition {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "domcontentloaded" | "dom" => Some(Self::DomContentLoaded),
            "load" => Some(Self::Load),
            "networkidle" | "idle" => Some(Self::NetworkIdle),
            _ => None,
        }
    }
}

/// Options for [`Document::navigate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigateOptions {
    pub wait_condition: WaitCondition,
    pub timeout: Duration,
}

/// Format produced by [`Document::snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    Png,
    Html,
}

impl SnapshotFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Html => "html",
        }
    }
}

/// Opaque reference to an element returned by the last [`Document::find_all`].
///
/// Handles are only valid until the next `find_all` or `navigate` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementHandle {
    generation: u64,
    index: usize,
}

impl ElementHandle {
    pub(crate) fn new(generation: u64, index: usize) -> Self {
        Self { generation, index }
    }

    pub(crate) fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }
}

/// Tracks which query generation is live, so stale handles are rejected.
#[derive(Debug)]
pub(crate) struct HandleTable<T> {
    generation: u64,
    entries: Vec<T>,
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self {
            generation: 0,
            entries: Vec::new(),
        }
    }
}

impl<T> HandleTable<T> {
    /// Replace the table contents and return fresh handles.
    pub(crate) fn replace(&mut self, entries: Vec<T>) -> Vec<ElementHandle> {
        self.generation += 1;
        self.entries = entries;
        (0..self.entries.len())
            .map(|i| ElementHandle::new(self.generation, i))
            .collect()
    }

    pub(crate) fn clear(&mut self) {
        self.generation += 1;
        self.entries.clear();
    }

    pub(crate) fn get(&self, handle: &ElementHandle) -> Result<&T, DocumentError> {
        if handle.generation() != self.generation {
            return Err(DocumentError::StaleHandle {
                held: handle.generation(),
                current: self.generation,
            });
        }
        self.entries
            .get(handle.index())
            .ok_or(DocumentError::StaleHandle {
                held: handle.generation(),
                current: self.generation,
            })
    }
}

/// A rendered document the pipeline can query.
#[async_trait]
pub trait Document: Send + Sync {
    /// Load `address`, waiting for the configured lifecycle point.
    async fn navigate(&mut self, address: &str, options: NavigateOptions)
        -> Result<(), DocumentError>;

    /// All elements matching `selector`, in document order.
    ///
    /// Waits up to `timeout` for at least one match; an elapsed timeout
    /// returns an empty vector rather than an error.
    async fn find_all(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<Vec<ElementHandle>, DocumentError>;

    /// Read an attribute of an element from the latest `find_all`.
    async fn attribute(
        &self,
        handle: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DocumentError>;

    /// URL of the loaded document, used to resolve relative references.
    async fn current_url(&self) -> Result<String, DocumentError>;

    /// Write a full-page snapshot to `path`.
    async fn snapshot(&self, path: &Path) -> Result<(), DocumentError>;

    /// What `snapshot` writes.
    fn snapshot_format(&self) -> SnapshotFormat;

    /// Release the rendering surface.
    async fn close(&mut self) -> Result<(), DocumentError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_condition_parse() {
        assert_eq!(
            WaitCondition::parse("DOMContentLoaded"),
            Some(WaitCondition::DomContentLoaded)
        );
        assert_eq!(WaitCondition::parse("networkidle"), Some(WaitCondition::NetworkIdle));
        assert_eq!(WaitCondition::parse(" load "), Some(WaitCondition::Load));
        assert_eq!(WaitCondition::parse("eventually"), None);
    }

    #[test]
    fn test_handle_table_rejects_stale() {
        let mut table: HandleTable<&str> = HandleTable::default();
        let first = table.replace(vec!["a", "b"]);
        assert_eq!(*table.get(&first[1]).unwrap(), "b");

        let second = table.replace(vec!["c"]);
        assert!(matches!(
            table.get(&first[0]),
            Err(DocumentError::StaleHandle { .. })
        ));
        assert_eq!(*table.get(&second[0]).unwrap(), "c");

        table.clear();
        assert!(table.get(&second[0]).is_err());
    }
}
