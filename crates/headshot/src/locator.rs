//! Ranked candidate resolution.
//!
//! Descriptors are tried in registry order. Within a descriptor, elements
//! are examined in document order. The first element that classifies wins
//! and no later descriptor is queried.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::document::{Document, ElementHandle};
use crate::error::DocumentError;
use crate::registry::CandidateRegistry;
use crate::types::{ElementAttributes, ImageReference, ResolutionOutcome};

/// What happened when one descriptor was tried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorAttempt {
    pub selector: String,
    /// Elements the selector matched.
    pub matched: usize,
    /// Whether one of them classified as the profile photo.
    pub accepted: bool,
    /// Query error, if the selector could not be evaluated.
    pub error: Option<String>,
}

/// Read the attributes the classifiers look at.
pub(crate) async fn read_attributes(
    document: &dyn Document,
    handle: &ElementHandle,
) -> Result<ElementAttributes, DocumentError> {
    Ok(ElementAttributes {
        src: document.attribute(handle, "src").await?,
        alt: document.attribute(handle, "alt").await?,
        class: document.attribute(handle, "class").await?,
    })
}

/// Resolve the profile image in `document`.
pub async fn resolve(
    document: &mut dyn Document,
    registry: &CandidateRegistry,
    selector_wait: Duration,
) -> ResolutionOutcome {
    resolve_with(document, registry, selector_wait, |_| {}).await
}

/// Like [`resolve`], reporting every descriptor attempt to `on_attempt`.
pub async fn resolve_with<F>(
    document: &mut dyn Document,
    registry: &CandidateRegistry,
    selector_wait: Duration,
    mut on_attempt: F,
) -> ResolutionOutcome
where
    F: FnMut(&SelectorAttempt) + Send,
{
    let rules = registry.rules();
    let mut attempted = Vec::with_capacity(registry.len());

    for descriptor in registry.descriptors() {
        let selector = descriptor.selector.as_str();
        attempted.push(selector.to_string());

        let handles = match document.find_all(selector, selector_wait).await {
            Ok(h) => h,
            Err(e) => {
                tracing::debug!("selector `{selector}` failed: {e}");
                on_attempt(&SelectorAttempt {
                    selector: selector.to_string(),
                    matched: 0,
                    accepted: false,
                    error: Some(e.to_string()),
                });
                continue;
            }
        };

        let mut winner = None;
        for handle in &handles {
            let attrs = match read_attributes(&*document, handle).await {
                Ok(a) => a,
                Err(e) => {
                    tracing::debug!("skipping element for `{selector}`: {e}");
                    continue;
                }
            };
            if descriptor.classify(&attrs, rules) {
                winner = attrs.src;
                break;
            }
        }

        on_attempt(&SelectorAttempt {
            selector: selector.to_string(),
            matched: handles.len(),
            accepted: winner.is_some(),
            error: None,
        });

        if let Some(src) = winner {
            tracing::info!("profile image found with selector `{selector}`");
            return ResolutionOutcome::Found(ImageReference::new(src, selector));
        }
        tracing::debug!(
            "selector `{selector}`: {} element(s), none classified",
            handles.len()
        );
    }

    ResolutionOutcome::NotFound {
        attempted_selectors: attempted,
    }
}
