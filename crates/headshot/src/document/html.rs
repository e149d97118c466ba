//! Static HTML document backed by the `scraper` crate.
//!
//! Serves pre-rendered markup registered per address. Used to triage saved
//! pages offline and to drive the pipeline without a browser.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};

use super::{Document, ElementHandle, HandleTable, NavigateOptions, SnapshotFormat};
use crate::error::DocumentError;

type Attributes = BTreeMap<String, String>;

struct LoadedPage {
    url: String,
    markup: String,
}

/// A document whose pages are fixed HTML strings.
#[derive(Default)]
pub struct HtmlDocument {
    pages: HashMap<String, String>,
    current: Option<LoadedPage>,
    elements: HandleTable<Attributes>,
}

impl HtmlDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the markup served for `address`.
    pub fn with_page(mut self, address: &str, markup: &str) -> Self {
        self.pages.insert(address.to_string(), markup.to_string());
        self
    }

    /// Load a saved page from disk and register it under `address`.
    pub fn from_file(path: &Path, address: &str) -> Result<Self, DocumentError> {
        let markup = std::fs::read_to_string(path)?;
        Ok(Self::new().with_page(address, &markup))
    }

    fn loaded(&self) -> Result<&LoadedPage, DocumentError> {
        self.current.as_ref().ok_or(DocumentError::NotLoaded)
    }
}

/// Collect the attributes of every element matching `selector`.
fn select_attributes(markup: &str, selector: &str) -> Result<Vec<Attributes>, DocumentError> {
    let parsed = Selector::parse(selector).map_err(|e| DocumentError::InvalidSelector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })?;
    let document = Html::parse_document(markup);
    let matches = document
        .select(&parsed)
        .map(|el| {
            el.value()
                .attrs()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        })
        .collect();
    Ok(matches)
}

#[async_trait]
impl Document for HtmlDocument {
    async fn navigate(
        &mut self,
        address: &str,
        _options: NavigateOptions,
    ) -> Result<(), DocumentError> {
        self.elements.clear();
        let markup = self
            .pages
            .get(address)
            .cloned()
            .ok_or_else(|| DocumentError::Navigation(format!("no page registered for {address}")))?;
        self.current = Some(LoadedPage {
            url: address.to_string(),
            markup,
        });
        Ok(())
    }

    async fn find_all(
        &mut self,
        selector: &str,
        _timeout: Duration,
    ) -> Result<Vec<ElementHandle>, DocumentError> {
        let found = select_attributes(&self.loaded()?.markup, selector)?;
        Ok(self.elements.replace(found))
    }

    async fn attribute(
        &self,
        handle: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DocumentError> {
        Ok(self.elements.get(handle)?.get(name).cloned())
    }

    async fn current_url(&self) -> Result<String, DocumentError> {
        Ok(self.loaded()?.url.clone())
    }

    async fn snapshot(&self, path: &Path) -> Result<(), DocumentError> {
        let page = self.loaded()?;
        std::fs::write(path, page.markup.as_bytes())
            .map_err(|e| DocumentError::Snapshot(format!("{}: {e}", path.display())))
    }

    fn snapshot_format(&self) -> SnapshotFormat {
        SnapshotFormat::Html
    }
}
