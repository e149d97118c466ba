//! Retrieval normalizer: one entry point for both origin kinds.
//!
//! Inline references are decoded locally and never touch the network.
//! Remote references are resolved against the document URL and fetched
//! exactly once.

use base64::Engine;
use url::Url;

use crate::error::{DecodeError, RetrievalError};
use crate::fetch::Fetcher;
use crate::types::{ImageReference, OriginKind, RetrievalResult};

/// Mime type assumed when a data reference omits one (RFC 2397).
const DEFAULT_DATA_MIME: &str = "text/plain";

/// A parsed `data:` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlinePayload {
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Parse and decode a `data:[<mime>][;params];base64,<body>` reference.
pub fn decode_inline(value: &str) -> Result<InlinePayload, DecodeError> {
    let value = value.trim();
    let rest = match value.get(..5) {
        Some(prefix) if prefix.eq_ignore_ascii_case("data:") => &value[5..],
        _ => return Err(DecodeError::NotInline),
    };

    let (header, body) = rest.split_once(',').ok_or(DecodeError::MissingSeparator)?;

    let mut params = header.split(';');
    let mime = params.next().unwrap_or("").trim();
    let is_base64 = params.any(|p| p.trim().eq_ignore_ascii_case("base64"));
    if !is_base64 {
        return Err(DecodeError::NotBase64);
    }

    let compact: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if compact.is_empty() {
        return Err(DecodeError::EmptyBody);
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| DecodeError::InvalidBase64(e.to_string()))?;

    let mime = if mime.is_empty() {
        DEFAULT_DATA_MIME.to_string()
    } else {
        mime.to_ascii_lowercase()
    };

    Ok(InlinePayload { mime, bytes })
}

/// Resolve a possibly-relative reference against the document URL.
pub fn resolve_url(reference: &str, base: &str) -> Result<Url, RetrievalError> {
    let invalid = |reason: String| RetrievalError::InvalidUrl {
        reference: reference.to_string(),
        base: base.to_string(),
        reason,
    };
    match Url::parse(reference) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base_url = Url::parse(base).map_err(|e| invalid(e.to_string()))?;
            base_url.join(reference).map_err(|e| invalid(e.to_string()))
        }
        Err(e) => Err(invalid(e.to_string())),
    }
}

/// Produce the bytes behind `reference`.
///
/// `base_url` is the document's URL and is only consulted for remote
/// references.
pub async fn retrieve(
    reference: &ImageReference,
    base_url: &str,
    fetcher: &dyn Fetcher,
) -> Result<RetrievalResult, RetrievalError> {
    match reference.origin_kind {
        OriginKind::Inline => {
            let payload = decode_inline(&reference.source_value)?;
            if payload.bytes.is_empty() {
                return Err(RetrievalError::EmptyPayload {
                    source_value: "inline data reference".to_string(),
                });
            }
            tracing::debug!(
                "decoded inline {} payload ({} bytes)",
                payload.mime,
                payload.bytes.len()
            );
            Ok(RetrievalResult::new(payload.bytes, Some(payload.mime), None))
        }
        OriginKind::Remote => {
            let url = resolve_url(&reference.source_value, base_url)?;
            let resp = fetcher.fetch_bytes(url.as_str()).await?;
            if !resp.is_success() {
                return Err(RetrievalError::Status {
                    status: resp.status,
                    url: url.to_string(),
                });
            }
            if resp.body.is_empty() {
                return Err(RetrievalError::EmptyPayload {
                    source_value: url.to_string(),
                });
            }
            Ok(RetrievalResult::new(
                resp.body,
                resp.content_type,
                Some(resp.final_url),
            ))
        }
    }
}
