//! Runtime settings: built-in defaults, overridden by `HEADSHOT_*` variables.

use std::time::Duration;

use crate::document::{ChromiumOptions, NavigateOptions, WaitCondition};
use crate::naming::AddressRules;
use crate::registry::HeuristicRules;

/// User agent presented by the browser and the byte fetcher.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Everything that tunes a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub nav_timeout: Duration,
    pub wait_condition: WaitCondition,
    /// Pause after navigation so progressive rendering can finish.
    pub settle_delay: Duration,
    pub selector_wait: Duration,
    pub fetch_timeout: Duration,
    /// Pause between targets of a batch.
    pub cooldown: Duration,
    pub allowed_domains: Vec<String>,
    pub identifier_marker: String,
    /// Alt keywords added to the defaults.
    pub extra_alt_keywords: Vec<String>,
    pub headless: bool,
    pub user_agent: String,
}

impl Default for Settings {
    fn default() -> Self {
        let rules = AddressRules::default();
        Self {
            nav_timeout: Duration::from_millis(30_000),
            wait_condition: WaitCondition::DomContentLoaded,
            settle_delay: Duration::from_millis(3_000),
            selector_wait: Duration::from_millis(2_500),
            fetch_timeout: Duration::from_millis(30_000),
            cooldown: Duration::from_millis(2_000),
            allowed_domains: rules.allowed_domains,
            identifier_marker: rules.identifier_marker,
            extra_alt_keywords: Vec::new(),
            headless: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl Settings {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let millis = |name: &str, fallback: Duration| {
            read_u64(&lookup, name)
                .map(Duration::from_millis)
                .unwrap_or(fallback)
        };

        Self {
            nav_timeout: millis("HEADSHOT_NAV_TIMEOUT_MS", d.nav_timeout),
            wait_condition: read_string(&lookup, "HEADSHOT_WAIT_UNTIL")
                .and_then(|v| WaitCondition::parse(&v))
                .unwrap_or(d.wait_condition),
            settle_delay: millis("HEADSHOT_SETTLE_MS", d.settle_delay),
            selector_wait: millis("HEADSHOT_SELECTOR_WAIT_MS", d.selector_wait),
            fetch_timeout: millis("HEADSHOT_FETCH_TIMEOUT_MS", d.fetch_timeout),
            cooldown: millis("HEADSHOT_COOLDOWN_MS", d.cooldown),
            allowed_domains: lookup("HEADSHOT_ALLOWED_DOMAINS")
                .map(|v| split_list(&v))
                .unwrap_or(d.allowed_domains),
            identifier_marker: read_string(&lookup, "HEADSHOT_ID_MARKER")
                .filter(|v| !v.is_empty())
                .unwrap_or(d.identifier_marker),
            extra_alt_keywords: read_string(&lookup, "HEADSHOT_ALT_KEYWORDS")
                .map(|v| split_list(&v))
                .unwrap_or_default(),
            headless: read_bool(&lookup, "HEADSHOT_HEADLESS").unwrap_or(d.headless),
            user_agent: read_string(&lookup, "HEADSHOT_USER_AGENT")
                .filter(|v| !v.is_empty())
                .unwrap_or(d.user_agent),
        }
    }

    pub fn navigate_options(&self) -> NavigateOptions {
        NavigateOptions {
            wait_condition: self.wait_condition,
            timeout: self.nav_timeout,
        }
    }

    pub fn address_rules(&self) -> AddressRules {
        AddressRules {
            allowed_domains: self.allowed_domains.clone(),
            identifier_marker: self.identifier_marker.clone(),
        }
    }

    pub fn heuristic_rules(&self) -> HeuristicRules {
        HeuristicRules::default().with_extra_keywords(self.extra_alt_keywords.iter())
    }

    pub fn chromium_options(&self) -> ChromiumOptions {
        ChromiumOptions {
            headless: self.headless,
            user_agent: self.user_agent.clone(),
            window_size: (1280, 1024),
        }
    }
}

fn read_string<F: Fn(&str) -> Option<String>>(lookup: &F, name: &str) -> Option<String> {
    lookup(name).map(|v| v.trim().to_string())
}

fn read_u64<F: Fn(&str) -> Option<String>>(lookup: &F, name: &str) -> Option<u64> {
    let raw = read_string(lookup, name)?;
    match raw.parse::<u64>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("ignoring {name}={raw}: not a whole number of milliseconds");
            None
        }
    }
}

fn read_bool<F: Fn(&str) -> Option<String>>(lookup: &F, name: &str) -> Option<bool> {
    match read_string(lookup, name)?.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(pairs: &[(&str, &str)]) -> Settings {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = from_map(&[]);
        assert_eq!(s, Settings::default());
        assert_eq!(s.settle_delay, Duration::from_secs(3));
        assert_eq!(s.selector_wait, Duration::from_millis(2500));
        assert_eq!(s.allowed_domains, vec!["linkedin.com"]);
        assert!(s.headless);
    }

    #[test]
    fn test_env_overrides() {
        let s = from_map(&[
            ("HEADSHOT_COOLDOWN_MS", "0"),
            ("HEADSHOT_WAIT_UNTIL", "networkidle"),
            ("HEADSHOT_ALLOWED_DOMAINS", "example.com, example.org"),
            ("HEADSHOT_ALT_KEYWORDS", "Profilbild,foto"),
            ("HEADSHOT_HEADLESS", "false"),
            ("HEADSHOT_ID_MARKER", "people"),
        ]);
        assert_eq!(s.cooldown, Duration::ZERO);
        assert_eq!(s.wait_condition, WaitCondition::NetworkIdle);
        assert_eq!(s.allowed_domains, vec!["example.com", "example.org"]);
        assert_eq!(s.extra_alt_keywords, vec!["Profilbild", "foto"]);
        assert!(!s.headless);
        assert_eq!(s.address_rules().identifier_marker, "people");
        assert!(s
            .heuristic_rules()
            .alt_keywords()
            .contains(&"profilbild".to_string()));
    }

    #[test]
    fn test_empty_domain_list_disables_check() {
        let s = from_map(&[("HEADSHOT_ALLOWED_DOMAINS", "")]);
        assert!(s.allowed_domains.is_empty());
    }

    #[test]
    fn test_garbage_values_fall_back() {
        let s = from_map(&[
            ("HEADSHOT_NAV_TIMEOUT_MS", "soon"),
            ("HEADSHOT_WAIT_UNTIL", "whenever"),
            ("HEADSHOT_HEADLESS", "maybe"),
        ]);
        let d = Settings::default();
        assert_eq!(s.nav_timeout, d.nav_timeout);
        assert_eq!(s.wait_condition, d.wait_condition);
        assert_eq!(s.headless, d.headless);
    }
}
