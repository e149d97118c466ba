//! Chromium-backed document using chromiumoxide.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use tokio::task::JoinHandle;

use super::{
    Document, ElementHandle, HandleTable, NavigateOptions, SnapshotFormat, WaitCondition,
};
use crate::error::DocumentError;

/// Interval between selector polls while waiting for progressive rendering.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Quiet period after which the page's network is treated as idle.
const NETWORK_IDLE_WINDOW: Duration = Duration::from_millis(500);

/// Returns `[document.readyState, <resource entries so far>]`.
const QUIESCENCE_PROBE: &str =
    "[document.readyState, performance.getEntriesByType('resource').length]";

/// Locate a Chromium binary: `HEADSHOT_CHROMIUM_PATH`, then `PATH`, then the
/// stock macOS install.
pub fn find_chromium() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("HEADSHOT_CHROMIUM_PATH") {
        let path = PathBuf::from(p);
        if path.exists() {
            return Some(path);
        }
    }

    let on_path = ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"]
        .into_iter()
        .find_map(|name| which::which(name).ok());
    if on_path.is_some() {
        return on_path;
    }

    let mac = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
    (cfg!(target_os = "macos") && mac.exists()).then_some(mac)
}

/// Watches successive page probes for a quiet network.
///
/// Idle means the document is `complete` and no new resource entry has
/// appeared for [`NETWORK_IDLE_WINDOW`].
#[derive(Debug, Default)]
struct IdleTracker {
    resources: Option<u64>,
    quiet_since: Option<Instant>,
}

impl IdleTracker {
    fn observe(&mut self, ready_state: &str, resources: u64, now: Instant) -> bool {
        if ready_state != "complete" || self.resources != Some(resources) {
            self.resources = Some(resources);
            self.quiet_since = (ready_state == "complete").then_some(now);
            return false;
        }
        let since = *self.quiet_since.get_or_insert(now);
        now.duration_since(since) >= NETWORK_IDLE_WINDOW
    }
}

/// Poll the page until [`IdleTracker`] reports a quiet network.
///
/// Unbounded on its own; the caller's navigation timeout caps it.
async fn wait_for_network_idle(page: &Page) -> Result<(), chromiumoxide::error::CdpError> {
    let mut tracker = IdleTracker::default();
    loop {
        let (ready_state, resources): (String, u64) =
            page.evaluate(QUIESCENCE_PROBE).await?.into_value()?;
        if tracker.observe(&ready_state, resources, Instant::now()) {
            return Ok(());
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Launch options for [`ChromiumDocument`].
#[derive(Debug, Clone)]
pub struct ChromiumOptions {
    pub headless: bool,
    pub user_agent: String,
    pub window_size: (u32, u32),
}

/// A single Chromium tab acting as the rendering surface for a run.
pub struct ChromiumDocument {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    elements: HandleTable<Element>,
}

impl ChromiumDocument {
    /// Launch Chromium and open one blank tab.
    pub async fn launch(options: &ChromiumOptions) -> Result<Self, DocumentError> {
        let chrome_path = find_chromium().ok_or_else(|| {
            DocumentError::Browser(
                "Chromium not found. Set HEADSHOT_CHROMIUM_PATH or install Chrome.".to_string(),
            )
        })?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(options.window_size.0, options.window_size.1)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg(format!("--user-agent={}", options.user_agent));
        if options.headless {
            builder = builder.arg("--headless=new");
        } else {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| DocumentError::Browser(format!("failed to build browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| DocumentError::Browser(format!("failed to launch Chromium: {e}")))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| DocumentError::Browser(format!("failed to create new page: {e}")))?;

        Ok(Self {
            browser,
            page,
            handler,
            elements: HandleTable::default(),
        })
    }
}

#[async_trait]
impl Document for ChromiumDocument {
    async fn navigate(
        &mut self,
        address: &str,
        options: NavigateOptions,
    ) -> Result<(), DocumentError> {
        self.elements.clear();
        let timeout_ms = options.timeout.as_millis() as u64;
        let page = &self.page;

        // `goto` resolves on the main frame's `load` event, which already
        // satisfies `DomContentLoaded` and `Load`.
        let load = async {
            page.goto(address).await?;
            if options.wait_condition == WaitCondition::NetworkIdle {
                wait_for_network_idle(page).await?;
            }
            Ok::<_, chromiumoxide::error::CdpError>(())
        };

        match tokio::time::timeout(options.timeout, load).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(DocumentError::Navigation(e.to_string())),
            Err(_) => Err(DocumentError::NavigationTimeout(timeout_ms)),
        }
    }

    async fn find_all(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<Vec<ElementHandle>, DocumentError> {
        let start = Instant::now();
        loop {
            let found = self.page.find_elements(selector).await;
            match found {
                Ok(elements) if !elements.is_empty() => return Ok(self.elements.replace(elements)),
                Ok(_) => {}
                // The DOM layer reports no-match and bad selectors the same way;
                // only fail once waiting is over.
                Err(e) if start.elapsed() >= timeout => {
                    return Err(DocumentError::InvalidSelector {
                        selector: selector.to_string(),
                        reason: e.to_string(),
                    });
                }
                Err(_) => {}
            }
            if start.elapsed() >= timeout {
                return Ok(self.elements.replace(Vec::new()));
            }
            tokio::time::sleep(POLL_INTERVAL.min(timeout)).await;
        }
    }

    async fn attribute(
        &self,
        handle: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DocumentError> {
        self.elements
            .get(handle)?
            .attribute(name)
            .await
            .map_err(|e| DocumentError::Browser(format!("failed to read `{name}`: {e}")))
    }

    async fn current_url(&self) -> Result<String, DocumentError> {
        let url = self
            .page
            .url()
            .await
            .map_err(|e| DocumentError::Browser(format!("failed to get URL: {e}")))?
            .map(|u| u.to_string())
            .unwrap_or_default();
        Ok(url)
    }

    async fn snapshot(&self, path: &Path) -> Result<(), DocumentError> {
        let params = ScreenshotParams::builder().full_page(true).build();
        self.page
            .save_screenshot(params, path)
            .await
            .map(|_| ())
            .map_err(|e| DocumentError::Snapshot(e.to_string()))
    }

    fn snapshot_format(&self) -> SnapshotFormat {
        SnapshotFormat::Png
    }

    async fn close(&mut self) -> Result<(), DocumentError> {
        let _ = self.page.clone().close().await;
        let closed = self
            .browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| DocumentError::Browser(format!("failed to close browser: {e}")));
        self.handler.abort();
        closed
    }
}
