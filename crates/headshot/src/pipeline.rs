//! The per-target state machine and the batch loop around it.
//!
//! Each target moves `Pending -> Resolving`, then either
//! `Retrieving -> Persisting -> Succeeded` or `DiagnosingFailure -> Failed`.
//! Every failure is folded into the target's [`TargetResult`]; only an
//! invalid address passed to [`Pipeline::run_single`] is returned as an error.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Notify;

use crate::config::Settings;
use crate::diagnostics;
use crate::document::Document;
use crate::error::{DocumentError, PipelineError, RetrievalError};
use crate::fetch::Fetcher;
use crate::locator;
use crate::naming::{artifact_name, diagnostics_stem, validate_address, AddressRules};
use crate::persist::write_new;
use crate::progress::{emit, ProgressEventKind, ProgressSender, TargetState};
use crate::registry::CandidateRegistry;
use crate::retrieval::retrieve;
use crate::types::{
    truncate_src, BatchReport, FailureReason, OriginKind, ResolutionOutcome, TargetOutcome,
    TargetResult,
};

/// Slack added on top of the adapter's own navigation timeout.
const NAVIGATION_GRACE: Duration = Duration::from_secs(5);

/// External cancellation.
///
/// Checked at the start of every target. Navigation, selector resolution and
/// the cooldown are abandoned as soon as it fires.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

/// Owns the rendering surface for the duration of a run.
pub struct Pipeline {
    document: Box<dyn Document>,
    fetcher: Arc<dyn Fetcher>,
    registry: CandidateRegistry,
    settings: Settings,
    rules: AddressRules,
    output_dir: PathBuf,
    progress: Option<ProgressSender>,
    cancel: CancelHandle,
    seq: u64,
}

impl Pipeline {
    pub fn new(
        document: Box<dyn Document>,
        fetcher: Arc<dyn Fetcher>,
        registry: CandidateRegistry,
        settings: Settings,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        let rules = settings.address_rules();
        Self {
            document,
            fetcher,
            registry,
            settings,
            rules,
            output_dir: output_dir.into(),
            progress: None,
            cancel: CancelHandle::new(),
            seq: 0,
        }
    }

    /// Broadcast progress events on `tx`.
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Share an existing cancellation handle.
    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Process one address. An address that fails validation is an error;
    /// every later failure is reported in the result.
    pub async fn run_single(&mut self, address: &str) -> Result<TargetResult, PipelineError> {
        validate_address(address, &self.rules)?;
        Ok(self.process(0, address).await)
    }

    /// Process `addresses` in order with a cooldown between targets.
    ///
    /// The report has exactly one entry per input, in input order.
    pub async fn run_batch<S: AsRef<str>>(&mut self, addresses: &[S]) -> BatchReport {
        let mut report = BatchReport {
            results: Vec::with_capacity(addresses.len()),
        };

        for (index, address) in addresses.iter().enumerate() {
            let address = address.as_ref();

            if index > 0 && !self.cancel.is_cancelled() {
                self.cooldown(index, address).await;
            }
            if self.cancel.is_cancelled() {
                tracing::info!("cancelled, skipping {address}");
                report.results.push(failure(address, FailureReason::Cancelled));
                continue;
            }

            let result = match validate_address(address, &self.rules) {
                Ok(_) => self.process(index, address).await,
                Err(e) => {
                    tracing::warn!("{e}");
                    self.state(index, address, TargetState::Failed);
                    failure(
                        address,
                        FailureReason::InvalidAddress {
                            message: e.to_string(),
                        },
                    )
                }
            };
            report.results.push(result);
        }

        tracing::info!(
            "batch finished: {} succeeded, {} failed",
            report.succeeded(),
            report.failed()
        );
        report
    }

    /// Release the rendering surface.
    pub async fn shutdown(mut self) -> Result<(), DocumentError> {
        self.document.close().await
    }

    async fn cooldown(&mut self, index: usize, address: &str) {
        let delay = self.settings.cooldown;
        if delay.is_zero() {
            return;
        }
        emit(
            &self.progress,
            index,
            address,
            &mut self.seq,
            ProgressEventKind::CooldownStarted {
                ms: delay.as_millis() as u64,
            },
        );
        tracing::debug!("cooling down for {}ms", delay.as_millis());
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = self.cancel.cancelled() => {}
        }
    }

    fn state(&mut self, index: usize, address: &str, state: TargetState) {
        tracing::debug!("{address}: {state}");
        emit(
            &self.progress,
            index,
            address,
            &mut self.seq,
            ProgressEventKind::StateChanged { state },
        );
    }

    async fn process(&mut self, index: usize, address: &str) -> TargetResult {
        if self.cancel.is_cancelled() {
            return self.abandon(index, address);
        }
        tracing::info!("processing {address}");
        self.state(index, address, TargetState::Pending);
        self.state(index, address, TargetState::Resolving);

        let cancel = self.cancel.clone();
        let loaded = tokio::select! {
            r = self.load(address) => Some(r),
            _ = cancel.cancelled() => None,
        };
        let Some(loaded) = loaded else {
            return self.abandon(index, address);
        };
        if let Err(e) = loaded {
            tracing::warn!("{address}: {e}");
            self.state(index, address, TargetState::Failed);
            return failure(
                address,
                FailureReason::Navigation {
                    message: e.to_string(),
                },
            );
        }

        let progress = self.progress.clone();
        let mut seq = self.seq;
        let resolution = locator::resolve_with(
            self.document.as_mut(),
            &self.registry,
            self.settings.selector_wait,
            |attempt| {
                emit(
                    &progress,
                    index,
                    address,
                    &mut seq,
                    ProgressEventKind::SelectorTried {
                        selector: attempt.selector.clone(),
                        matched: attempt.matched,
                        accepted: attempt.accepted,
                    },
                )
            },
        );
        let outcome = tokio::select! {
            outcome = resolution => Some(outcome),
            _ = cancel.cancelled() => None,
        };
        self.seq = seq;

        let reference = match outcome {
            None => return self.abandon(index, address),
            Some(ResolutionOutcome::Found(r)) => r,
            Some(ResolutionOutcome::NotFound {
                attempted_selectors,
            }) => return self.diagnose(index, address, attempted_selectors).await,
        };
        if self.cancel.is_cancelled() {
            return self.abandon(index, address);
        }

        self.state(index, address, TargetState::Retrieving);
        let base_url = match self.document.current_url().await {
            Ok(url) if !url.is_empty() => url,
            _ => address.to_string(),
        };
        let retrieved = match retrieve(&reference, &base_url, self.fetcher.as_ref()).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("{address}: {e}");
                self.state(index, address, TargetState::Failed);
                return failure(address, retrieval_failure(e));
            }
        };

        self.state(index, address, TargetState::Persisting);
        let name = artifact_name(address, &self.rules.identifier_marker, Utc::now());
        let path = match write_new(&self.output_dir, &name, &retrieved.bytes) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("{address}: {e}");
                self.state(index, address, TargetState::Failed);
                return failure(
                    address,
                    FailureReason::Persist {
                        message: e.to_string(),
                    },
                );
            }
        };

        let source_url = match reference.origin_kind {
            OriginKind::Remote => retrieved
                .resolved_url
                .unwrap_or_else(|| reference.source_value.clone()),
            OriginKind::Inline => truncate_src(&reference.source_value),
        };
        tracing::info!(
            "saved {} ({} bytes) via `{}`",
            path.display(),
            retrieved.byte_length,
            reference.classifying_selector
        );
        self.state(index, address, TargetState::Succeeded);

        TargetResult {
            target_id: address.to_string(),
            outcome: TargetOutcome::Success {
                path,
                source_url,
                selector_used: reference.classifying_selector,
                byte_length: retrieved.byte_length,
            },
        }
    }

    fn abandon(&mut self, index: usize, address: &str) -> TargetResult {
        tracing::info!("cancelled, abandoning {address}");
        self.state(index, address, TargetState::Failed);
        failure(address, FailureReason::Cancelled)
    }

    async fn load(&mut self, address: &str) -> Result<(), DocumentError> {
        let options = self.settings.navigate_options();
        let guard = options.timeout + NAVIGATION_GRACE;
        match tokio::time::timeout(guard, self.document.navigate(address, options)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(DocumentError::NavigationTimeout(
                    guard.as_millis() as u64,
                ))
            }
        }
        if !self.settings.settle_delay.is_zero() {
            tokio::time::sleep(self.settings.settle_delay).await;
        }
        Ok(())
    }

    async fn diagnose(
        &mut self,
        index: usize,
        address: &str,
        attempted_selectors: Vec<String>,
    ) -> TargetResult {
        tracing::warn!(
            "{address}: no profile image after {} selector(s)",
            attempted_selectors.len()
        );
        self.state(index, address, TargetState::DiagnosingFailure);
        let stem = diagnostics_stem(address, &self.rules.identifier_marker, Utc::now());
        let artifact = diagnostics::capture_failure(
            self.document.as_mut(),
            &self.output_dir,
            &stem,
            Duration::ZERO,
        )
        .await;
        let warnings = [
            artifact
                .snapshot_error
                .as_ref()
                .map(|e| format!("no diagnostics snapshot: {e}")),
            artifact
                .inventory_path
                .is_none()
                .then(|| "image inventory was not written".to_string()),
            artifact
                .login_wall_detected
                .then(|| "page appears to require a login".to_string()),
        ];
        for message in warnings.into_iter().flatten() {
            emit(
                &self.progress,
                index,
                address,
                &mut self.seq,
                ProgressEventKind::Warning { message },
            );
        }
        self.state(index, address, TargetState::Failed);

        TargetResult {
            target_id: address.to_string(),
            outcome: TargetOutcome::Failure {
                reason: FailureReason::NotFound {
                    attempted_selectors,
                },
                diagnostics: Some(artifact),
            },
        }
    }
}

fn failure(address: &str, reason: FailureReason) -> TargetResult {
    TargetResult {
        target_id: address.to_string(),
        outcome: TargetOutcome::Failure {
            reason,
            diagnostics: None,
        },
    }
}

fn retrieval_failure(err: RetrievalError) -> FailureReason {
    let message = err.to_string();
    match err {
        RetrievalError::Decode(_) => FailureReason::Decode { message },
        RetrievalError::EmptyPayload { .. } => FailureReason::EmptyPayload { message },
        _ => FailureReason::Retrieval { message },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::HtmlDocument;
    use crate::error::FetchError;
    use crate::fetch::FetchResponse;
    use crate::progress;
    use async_trait::async_trait;

    struct FixedFetcher;

    #[async_trait]
    impl Fetcher for FixedFetcher {
        async fn fetch_bytes(&self, url: &str) -> Result<FetchResponse, FetchError> {
            Ok(FetchResponse {
                status: 200,
                final_url: url.to_string(),
                content_type: Some("image/jpeg".into()),
                body: vec![0xff, 0xd8, 0xff, 0xe0],
            })
        }
    }

    fn quick_settings() -> Settings {
        Settings {
            settle_delay: Duration::ZERO,
            selector_wait: Duration::ZERO,
            cooldown: Duration::ZERO,
            allowed_domains: vec!["example.com".into()],
            ..Settings::default()
        }
    }

    fn pipeline(doc: HtmlDocument, dir: &Path, settings: Settings) -> Pipeline {
        Pipeline::new(
            Box::new(doc),
            Arc::new(FixedFetcher),
            CandidateRegistry::default(),
            settings,
            dir,
        )
    }

    #[tokio::test]
    async fn test_run_single_rejects_bad_address() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = pipeline(HtmlDocument::new(), dir.path(), quick_settings());
        let err = p.run_single("https://evil.test/in/alice/").await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidAddress { .. }));
    }

    #[tokio::test]
    async fn test_navigation_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = pipeline(HtmlDocument::new(), dir.path(), quick_settings());
        let result = p.run_single("https://example.com/in/ghost/").await.unwrap();
        match result.outcome {
            TargetOutcome::Failure {
                reason: FailureReason::Navigation { .. },
                diagnostics: None,
            } => {}
            other => panic!("expected navigation failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_states_are_broadcast_in_order() {
        let address = "https://example.com/in/alice/";
        let doc = HtmlDocument::new().with_page(
            address,
            r#"<img class="pv-top-card-profile-picture__image" src="/a.jpg">"#,
        );
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = progress::channel();
        let mut p = pipeline(doc, dir.path(), quick_settings()).with_progress(tx);

        let result = p.run_single(address).await.unwrap();
        assert!(result.is_success());

        let mut states = Vec::new();
        let mut last_seq = 0;
        while let Ok(event) = rx.try_recv() {
            assert!(event.seq > last_seq);
            last_seq = event.seq;
            if let ProgressEventKind::StateChanged { state } = event.event {
                states.push(state);
            }
        }
        assert_eq!(
            states,
            vec![
                TargetState::Pending,
                TargetState::Resolving,
                TargetState::Retrieving,
                TargetState::Persisting,
                TargetState::Succeeded,
            ]
        );
    }

    #[tokio::test]
    async fn test_cancelled_batch_reports_every_target() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = pipeline(HtmlDocument::new(), dir.path(), quick_settings());
        p.cancel_handle().cancel();
        let report = p
            .run_batch(&["https://example.com/in/a/", "https://example.com/in/b/"])
            .await;
        assert_eq!(report.len(), 2);
        assert!(report.results.iter().all(|r| matches!(
            r.outcome,
            TargetOutcome::Failure {
                reason: FailureReason::Cancelled,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_cooldown() {
        let address = "https://example.com/in/alice/";
        let doc = HtmlDocument::new().with_page(
            address,
            r#"<img class="pv-top-card-profile-picture__image" src="/a.jpg">"#,
        );
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            cooldown: Duration::from_secs(60),
            ..quick_settings()
        };
        let mut p = pipeline(doc, dir.path(), settings);
        let cancel = p.cancel_handle();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let started = std::time::Instant::now();
        let report = tokio::time::timeout(
            Duration::from_secs(10),
            p.run_batch(&[address, "https://example.com/in/bob/"]),
        )
        .await
        .expect("cooldown was not interrupted");

        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(report.results[0].is_success());
        assert!(matches!(
            report.results[1].outcome,
            TargetOutcome::Failure {
                reason: FailureReason::Cancelled,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_cancelled_single_target_is_not_processed() {
        let address = "https://example.com/in/alice/";
        let doc = HtmlDocument::new().with_page(
            address,
            r#"<img class="pv-top-card-profile-picture__image" src="/a.jpg">"#,
        );
        let dir = tempfile::tempdir().unwrap();
        let mut p = pipeline(doc, dir.path(), quick_settings());
        p.cancel_handle().cancel();

        let result = p.run_single(address).await.unwrap();
        assert!(matches!(
            result.outcome,
            TargetOutcome::Failure {
                reason: FailureReason::Cancelled,
                diagnostics: None,
            }
        ));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    /// Navigation that never finishes on its own.
    struct StalledDocument;

    #[async_trait]
    impl Document for StalledDocument {
        async fn navigate(
            &mut self,
            _address: &str,
            _options: crate::document::NavigateOptions,
        ) -> Result<(), DocumentError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }

        async fn find_all(
            &mut self,
            _selector: &str,
            _timeout: Duration,
        ) -> Result<Vec<crate::document::ElementHandle>, DocumentError> {
            Ok(Vec::new())
        }

        async fn attribute(
            &self,
            _handle: &crate::document::ElementHandle,
            _name: &str,
        ) -> Result<Option<String>, DocumentError> {
            Ok(None)
        }

        async fn current_url(&self) -> Result<String, DocumentError> {
            Err(DocumentError::NotLoaded)
        }

        async fn snapshot(&self, _path: &Path) -> Result<(), DocumentError> {
            Err(DocumentError::NotLoaded)
        }

        fn snapshot_format(&self) -> crate::document::SnapshotFormat {
            crate::document::SnapshotFormat::Html
        }
    }

    #[tokio::test]
    async fn test_cancel_abandons_in_flight_navigation() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            nav_timeout: Duration::from_secs(600),
            ..quick_settings()
        };
        let mut p = Pipeline::new(
            Box::new(StalledDocument),
            Arc::new(FixedFetcher),
            CandidateRegistry::default(),
            settings,
            dir.path(),
        );
        let cancel = p.cancel_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(10),
            p.run_single("https://example.com/in/alice/"),
        )
        .await
        .expect("navigation was not interrupted")
        .unwrap();
        assert!(matches!(
            result.outcome,
            TargetOutcome::Failure {
                reason: FailureReason::Cancelled,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_degraded_diagnostics_are_broadcast_as_warnings() {
        let address = "https://example.com/in/alice/";
        let doc = HtmlDocument::new().with_page(
            address,
            r#"<form action="/login"><input name="user"></form>"#,
        );
        let dir = tempfile::tempdir().unwrap();
        // A plain file where the output directory should be.
        let blocked = dir.path().join("out");
        std::fs::write(&blocked, b"").unwrap();
        let (tx, mut rx) = progress::channel();
        let mut p = pipeline(doc, &blocked, quick_settings()).with_progress(tx);

        let result = p.run_single(address).await.unwrap();
        assert!(matches!(
            result.outcome,
            TargetOutcome::Failure {
                reason: FailureReason::NotFound { .. },
                diagnostics: Some(_),
            }
        ));

        let mut warnings = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ProgressEventKind::Warning { message } = event.event {
                warnings.push(message);
            }
        }
        assert_eq!(warnings.len(), 3, "{warnings:?}");
        assert!(warnings[0].starts_with("no diagnostics snapshot"));
        assert!(warnings[2].contains("login"));
    }

    #[tokio::test]
    async fn test_cancelled_resolves_after_cancel() {
        let handle = CancelHandle::new();
        handle.cancel();
        tokio::time::timeout(Duration::from_millis(100), handle.cancelled())
            .await
            .unwrap();
    }

    #[test]
    fn test_retrieval_failure_mapping() {
        let decode = retrieval_failure(RetrievalError::Decode(
            crate::error::DecodeError::EmptyBody,
        ));
        assert!(matches!(decode, FailureReason::Decode { .. }));
        let status = retrieval_failure(RetrievalError::Status {
            status: 404,
            url: "https://x".into(),
        });
        assert!(matches!(status, FailureReason::Retrieval { ref message } if message.contains("404")));
    }
}
