//! Address validation and deterministic artifact names.

use chrono::{DateTime, Utc};
use url::Url;

use crate::error::PipelineError;

/// Token used when no identifier can be extracted from an address.
pub const UNKNOWN_TOKEN: &str = "unknown";

/// Filesystem-safe, lexically sortable timestamp format.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Extension given to every saved image.
pub const ARTIFACT_EXTENSION: &str = "jpg";

/// Rules an address must satisfy before any navigation happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRules {
    /// Hosts (and their subdomains) accepted; empty accepts any host.
    pub allowed_domains: Vec<String>,
    /// Path segment that precedes the identifier, e.g. `in` in `/in/alice/`.
    pub identifier_marker: String,
}

impl Default for AddressRules {
    fn default() -> Self {
        Self {
            allowed_domains: vec!["linkedin.com".to_string()],
            identifier_marker: "in".to_string(),
        }
    }
}

impl AddressRules {
    fn host_allowed(&self, host: &str) -> bool {
        if self.allowed_domains.is_empty() {
            return true;
        }
        let host = host.to_ascii_lowercase();
        self.allowed_domains.iter().any(|d| {
            let d = d.trim().trim_start_matches('.').to_ascii_lowercase();
            host == d || host.ends_with(&format!(".{d}"))
        })
    }
}

/// Check the shape of a caller-provided address.
pub fn validate_address(address: &str, rules: &AddressRules) -> Result<Url, PipelineError> {
    let invalid = |reason: &str| PipelineError::InvalidAddress {
        address: address.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(address.trim()).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    let host = url.host_str().ok_or_else(|| invalid("missing host"))?;
    if !rules.host_allowed(host) {
        return Err(invalid(&format!(
            "host {host} is not one of: {}",
            rules.allowed_domains.join(", ")
        )));
    }
    if identifier_segment(&url, &rules.identifier_marker).is_none() {
        return Err(invalid(&format!(
            "path must look like /{}/<identifier>/",
            rules.identifier_marker
        )));
    }
    Ok(url)
}

fn identifier_segment<'a>(url: &'a Url, marker: &str) -> Option<&'a str> {
    let mut segments = url.path_segments()?;
    segments.find(|s| *s == marker)?;
    segments.next().filter(|s| !s.is_empty())
}

/// Extract the identifier token from an address, or [`UNKNOWN_TOKEN`].
pub fn identifier_token(address: &str, marker: &str) -> String {
    let Ok(url) = Url::parse(address.trim()) else {
        return UNKNOWN_TOKEN.to_string();
    };
    let Some(raw) = identifier_segment(&url, marker) else {
        return UNKNOWN_TOKEN.to_string();
    };
    let token = sanitize_token(raw);
    if token.is_empty() {
        UNKNOWN_TOKEN.to_string()
    } else {
        token
    }
}

/// Keep `[A-Za-z0-9._-]`, replace everything else with `_`.
fn sanitize_token(raw: &str) -> String {
    let token: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    token.trim_matches('.').to_string()
}

/// Render a timestamp as `YYYYMMDDTHHMMSS`.
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Deterministic output filename for `address` at `timestamp`.
pub fn artifact_name(address: &str, marker: &str, timestamp: DateTime<Utc>) -> String {
    format!(
        "{}_{}.{ARTIFACT_EXTENSION}",
        identifier_token(address, marker),
        format_timestamp(timestamp)
    )
}

/// Base name (no extension) for diagnostics files of a failed target.
pub fn diagnostics_stem(address: &str, marker: &str, timestamp: DateTime<Utc>) -> String {
    format!(
        "{}_debug_{}",
        identifier_token(address, marker),
        format_timestamp(timestamp)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap() + Duration::seconds(secs)
    }

    fn any_host() -> AddressRules {
        AddressRules {
            allowed_domains: Vec::new(),
            ..AddressRules::default()
        }
    }

    #[test]
    fn test_identifier_token() {
        assert_eq!(identifier_token("https://example.com/in/alice/", "in"), "alice");
        assert_eq!(
            identifier_token("https://www.linkedin.com/in/boristai?trk=x", "in"),
            "boristai"
        );
        assert_eq!(identifier_token("https://example.com/company/acme", "in"), "unknown");
        assert_eq!(identifier_token("not a url", "in"), "unknown");
        assert_eq!(identifier_token("https://example.com/in/", "in"), "unknown");
        assert_eq!(
            identifier_token("https://example.com/in/j%C3%BCrgen-m/", "in"),
            "j_C3_BCrgen-m"
        );
        assert_eq!(identifier_token("https://example.com/in/../", "in"), "unknown");
    }

    #[test]
    fn test_artifact_name_shape() {
        let name = artifact_name("https://example.com/in/alice/", "in", at(0));
        assert_eq!(name, "alice_20260314T092653.jpg");
        assert!(!name.contains(':'));
        assert!(!name.contains('/'));
    }

    #[test]
    fn test_names_differ_a_second_apart() {
        let a = artifact_name("https://example.com/in/alice/", "in", at(0));
        let b = artifact_name("https://example.com/in/alice/", "in", at(1));
        assert_ne!(a, b);
        assert!(a < b);
    }

    #[test]
    fn test_name_is_pure() {
        let a = artifact_name("https://example.com/in/alice/", "in", at(5));
        let b = artifact_name("https://example.com/in/alice/", "in", at(5));
        assert_eq!(a, b);
    }

    #[test]
    fn test_diagnostics_stem() {
        assert_eq!(
            diagnostics_stem("https://example.com/in/alice/", "in", at(0)),
            "alice_debug_20260314T092653"
        );
    }

    #[test]
    fn test_validate_address() {
        let rules = AddressRules::default();
        assert!(validate_address("https://www.linkedin.com/in/boristai/", &rules).is_ok());
        assert!(validate_address("https://linkedin.com/in/boristai", &rules).is_ok());
        assert!(validate_address("https://example.com/in/alice/", &rules).is_err());
        assert!(validate_address("https://notlinkedin.com/in/alice/", &rules).is_err());
        assert!(validate_address("ftp://www.linkedin.com/in/alice/", &rules).is_err());
        assert!(validate_address("https://www.linkedin.com/company/acme/", &rules).is_err());
        assert!(validate_address("linkedin.com/in/alice", &rules).is_err());
    }

    #[test]
    fn test_validate_address_any_host() {
        let rules = any_host();
        assert!(validate_address("https://example.com/in/alice/", &rules).is_ok());
        let err = validate_address("https://example.com/", &rules).unwrap_err();
        assert!(err.to_string().contains("/in/<identifier>/"));
    }
}
