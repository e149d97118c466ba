//! Failure-time evidence: a page snapshot plus an inventory of every image.
//!
//! Nothing here can fail the target. A broken snapshot or an unreadable
//! element is recorded and logged, and the caller's `NotFound` stands.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::locator::{read_attributes, resolve_with, SelectorAttempt};
use crate::registry::CandidateRegistry;
use crate::types::{truncate_src, DiagnosticsArtifact, ImageSummary, ResolutionOutcome};

/// Selector used to enumerate image-like elements.
const INVENTORY_SELECTOR: &str = "img";

/// Presence of this selector suggests the page is behind a login wall.
const LOGIN_FORM_SELECTOR: &str = r#"form[action*="login"]"#;

/// Enumerate every image in document order.
///
/// An adapter error yields an empty inventory.
pub async fn image_inventory(document: &mut dyn Document, wait: Duration) -> Vec<ImageSummary> {
    let handles = match document.find_all(INVENTORY_SELECTOR, wait).await {
        Ok(h) => h,
        Err(e) => {
            tracing::warn!("image inventory unavailable: {e}");
            return Vec::new();
        }
    };

    let mut inventory = Vec::with_capacity(handles.len());
    for handle in &handles {
        match read_attributes(&*document, handle).await {
            Ok(attrs) => inventory.push(ImageSummary {
                src: attrs.src.as_deref().map(truncate_src),
                alt: attrs.alt,
                class_names: attrs.class,
            }),
            Err(e) => tracing::debug!("skipping image in inventory: {e}"),
        }
    }
    inventory
}

/// Whether the loaded page shows a login form.
pub async fn login_wall_present(document: &mut dyn Document) -> bool {
    document
        .find_all(LOGIN_FORM_SELECTOR, Duration::ZERO)
        .await
        .map(|h| !h.is_empty())
        .unwrap_or(false)
}

/// Capture a snapshot and image inventory into `dir`, named after `stem`.
pub async fn capture_failure(
    document: &mut dyn Document,
    dir: &Path,
    stem: &str,
    wait: Duration,
) -> DiagnosticsArtifact {
    let mut artifact = DiagnosticsArtifact::default();

    if let Err(e) = std::fs::create_dir_all(dir) {
        tracing::warn!("cannot create diagnostics directory {}: {e}", dir.display());
        artifact.snapshot_error = Some(e.to_string());
    } else {
        let snapshot_path = dir.join(format!("{stem}.{}", document.snapshot_format().extension()));
        match document.snapshot(&snapshot_path).await {
            Ok(()) => {
                tracing::info!("diagnostics snapshot saved to {}", snapshot_path.display());
                artifact.snapshot_path = Some(snapshot_path);
            }
            Err(e) => {
                tracing::warn!("diagnostics snapshot failed: {e}");
                artifact.snapshot_error = Some(e.to_string());
            }
        }
    }

    artifact.image_inventory = image_inventory(document, wait).await;
    artifact.login_wall_detected = login_wall_present(document).await;
    if artifact.login_wall_detected {
        tracing::warn!("page appears to require a login");
    }

    let inventory_path = dir.join(format!("{stem}.json"));
    let written = serde_json::to_vec_pretty(&artifact.image_inventory)
        .map_err(|e| e.to_string())
        .and_then(|json| std::fs::write(&inventory_path, json).map_err(|e| e.to_string()));
    match written {
        Ok(()) => artifact.inventory_path = Some(inventory_path),
        Err(e) => tracing::warn!("could not write image inventory: {e}"),
    }

    tracing::info!(
        "diagnostics captured: {} image(s) on page",
        artifact.image_inventory.len()
    );
    artifact
}

/// Locator trace and inventory for a document that is already loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectionReport {
    pub url: Option<String>,
    pub outcome: ResolutionOutcome,
    pub attempts: Vec<SelectorAttempt>,
    pub image_inventory: Vec<ImageSummary>,
    pub login_wall_detected: bool,
}

/// Run the locator and the inventory against `document` without writing
/// anything to disk.
pub async fn inspect(
    document: &mut dyn Document,
    registry: &CandidateRegistry,
    wait: Duration,
) -> InspectionReport {
    let url = document.current_url().await.ok();
    let mut attempts = Vec::new();
    let outcome = resolve_with(document, registry, wait, |a| attempts.push(a.clone())).await;
    InspectionReport {
        url,
        outcome,
        attempts,
        image_inventory: image_inventory(document, wait).await,
        login_wall_detected: login_wall_present(document).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{HtmlDocument, NavigateOptions, WaitCondition};
    use crate::error::DocumentError;

    const ADDRESS: &str = "https://example.com/in/alice/";

    async fn loaded(markup: &str) -> HtmlDocument {
        let mut doc = HtmlDocument::new().with_page(ADDRESS, markup);
        doc.navigate(
            ADDRESS,
            NavigateOptions {
                wait_condition: WaitCondition::Load,
                timeout: Duration::from_secs(1),
            },
        )
        .await
        .unwrap();
        doc
    }

    #[tokio::test]
    async fn test_capture_writes_snapshot_and_inventory() {
        let long_src = format!("https://cdn.example.com/{}", "a".repeat(200));
        let markup = format!(
            r#"<img src="/logo.png" alt="Logo" class="brand big">
               <img src="{long_src}">
               <img alt="no src">"#
        );
        let mut doc = loaded(&markup).await;
        let dir = tempfile::tempdir().unwrap();

        let artifact = capture_failure(&mut doc, dir.path(), "alice_debug_x", Duration::ZERO).await;

        let snapshot = artifact.snapshot_path.clone().unwrap();
        assert_eq!(snapshot, dir.path().join("alice_debug_x.html"));
        assert!(snapshot.exists());
        assert!(artifact.snapshot_error.is_none());

        assert_eq!(artifact.image_inventory.len(), 3);
        let first = &artifact.image_inventory[0];
        assert_eq!(first.src.as_deref(), Some("/logo.png"));
        assert_eq!(first.class_names.as_deref(), Some("brand big"));
        assert!(artifact.image_inventory[1]
            .src
            .as_deref()
            .unwrap()
            .ends_with("..."));
        assert!(artifact.image_inventory[2].src.is_none());

        let json = std::fs::read_to_string(artifact.inventory_path.unwrap()).unwrap();
        let parsed: Vec<ImageSummary> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, artifact.image_inventory);
        assert!(!artifact.login_wall_detected);
    }

    #[tokio::test]
    async fn test_zero_images_is_empty_inventory() {
        let mut doc = loaded("<p>nothing here</p>").await;
        let dir = tempfile::tempdir().unwrap();
        let artifact = capture_failure(&mut doc, dir.path(), "s", Duration::ZERO).await;
        assert!(artifact.image_inventory.is_empty());
        assert!(artifact.snapshot_path.is_some());
    }

    #[tokio::test]
    async fn test_login_wall_hint() {
        let mut doc =
            loaded(r#"<form action="/uas/login-submit"><input name="session_key"></form>"#).await;
        assert!(login_wall_present(&mut doc).await);
    }

    #[tokio::test]
    async fn test_inspect_traces_attempts() {
        let mut doc = loaded(
            r#"<img src="/banner.jpg" alt="Banner">
               <img class="pv-top-card-profile-picture__image" src="https://x/a.jpg">"#,
        )
        .await;
        let registry = CandidateRegistry::default();
        let report = inspect(&mut doc, &registry, Duration::ZERO).await;
        assert_eq!(report.url.as_deref(), Some(ADDRESS));
        assert!(matches!(report.outcome, ResolutionOutcome::Found(_)));
        assert!(report.attempts.last().unwrap().accepted);
        assert!(report.attempts[..report.attempts.len() - 1]
            .iter()
            .all(|a| !a.accepted));
        assert_eq!(report.image_inventory.len(), 2);
    }

    #[tokio::test]
    async fn test_snapshot_failure_degrades() {
        // Nothing navigated: snapshot and queries both fail.
        let mut doc = HtmlDocument::new();
        let dir = tempfile::tempdir().unwrap();
        let artifact = capture_failure(&mut doc, dir.path(), "s", Duration::ZERO).await;
        assert!(artifact.snapshot_path.is_none());
        assert_eq!(
            artifact.snapshot_error.as_deref(),
            Some(DocumentError::NotLoaded.to_string().as_str())
        );
        assert!(artifact.image_inventory.is_empty());
    }
}
