//! Byte fetching over HTTP.
//!
//! Not a browser: one GET per call, bounded by a timeout. Redirects are
//! followed (up to five); nothing is retried.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::FetchError;

/// Response from a byte fetch.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// HTTP status code.
    pub status: u16,
    /// Final URL after redirects.
    pub final_url: String,
    /// Content-Type header.
    pub content_type: Option<String>,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Anything that can turn a URL into bytes.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch_bytes(&self, url: &str) -> Result<FetchResponse, FetchError>;
}

/// reqwest-backed fetcher.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    /// Create a fetcher with the given per-request timeout and user agent.
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_bytes(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let resp = self.client.get(url).timeout(self.timeout).send().await?;

        let status = resp.status().as_u16();
        let final_url = resp.url().to_string();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let body = resp.bytes().await?.to_vec();

        tracing::debug!("fetched {url}: status={status} bytes={}", body.len());

        Ok(FetchResponse {
            status,
            final_url,
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_fetcher_creation() {
        let fetcher = HttpFetcher::new(Duration::from_secs(5), "headshot-test");
        assert!(fetcher.is_ok());
    }

    #[test]
    fn test_success_range() {
        let mut resp = FetchResponse {
            status: 200,
            final_url: "https://example.com".to_string(),
            content_type: None,
            body: vec![1],
        };
        assert!(resp.is_success());
        resp.status = 204;
        assert!(resp.is_success());
        resp.status = 304;
        assert!(!resp.is_success());
        resp.status = 404;
        assert!(!resp.is_success());
    }
}
