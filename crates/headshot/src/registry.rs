//! The ordered candidate registry.
//!
//! Each descriptor is one hypothesis about where the profile photo lives.
//! Order is confidence: the locator tries descriptors front to back and the
//! first validated match wins.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::types::ElementAttributes;

/// Default alt-text keywords, matched case-insensitively.
pub const DEFAULT_ALT_KEYWORDS: &[&str] = &["profile", "photo", "headshot"];

/// Default `src` path fragments that identify a profile photo.
pub const DEFAULT_SRC_FRAGMENTS: &[&str] = &["profile-displayphoto", "headshot"];

/// How an element matched by a selector is validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classifier {
    /// The selector is specific enough; any element with a usable `src` qualifies.
    Structural,
    /// The element must also look like a profile photo by `src` or `alt`.
    ProfileHeuristic,
}

/// A selector plus the rule that validates its matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateDescriptor {
    pub selector: String,
    pub classifier: Classifier,
}

impl CandidateDescriptor {
    pub fn structural(selector: &str) -> Self {
        Self {
            selector: selector.to_string(),
            classifier: Classifier::Structural,
        }
    }

    pub fn heuristic(selector: &str) -> Self {
        Self {
            selector: selector.to_string(),
            classifier: Classifier::ProfileHeuristic,
        }
    }

    /// Apply this descriptor's classifier to an element's attributes.
    ///
    /// An element without a usable `src` never classifies.
    pub fn classify(&self, attrs: &ElementAttributes, rules: &HeuristicRules) -> bool {
        if attrs.usable_src().is_none() {
            return false;
        }
        match self.classifier {
            Classifier::Structural => true,
            Classifier::ProfileHeuristic => rules.looks_like_profile_photo(attrs),
        }
    }
}

/// Keyword and path-fragment sets behind [`Classifier::ProfileHeuristic`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeuristicRules {
    alt_keywords: Vec<String>,
    src_fragments: Vec<String>,
}

impl Default for HeuristicRules {
    fn default() -> Self {
        Self {
            alt_keywords: DEFAULT_ALT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            src_fragments: DEFAULT_SRC_FRAGMENTS.iter().map(|f| f.to_string()).collect(),
        }
    }
}

impl HeuristicRules {
    /// Add locale-specific alt keywords on top of the defaults.
    pub fn with_extra_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for kw in keywords {
            let kw = kw.as_ref().trim().to_lowercase();
            if !kw.is_empty() && !self.alt_keywords.contains(&kw) {
                self.alt_keywords.push(kw);
            }
        }
        self
    }

    pub fn alt_keywords(&self) -> &[String] {
        &self.alt_keywords
    }

    pub fn src_fragments(&self) -> &[String] {
        &self.src_fragments
    }

    /// True when `src` carries a known path fragment or `alt` carries a keyword.
    pub fn looks_like_profile_photo(&self, attrs: &ElementAttributes) -> bool {
        let src_hit = attrs.src.as_deref().is_some_and(|src| {
            self.src_fragments
                .iter()
                .any(|frag| src.contains(frag.as_str()))
        });
        if src_hit {
            return true;
        }
        attrs.alt.as_deref().is_some_and(|alt| {
            let alt = alt.to_lowercase();
            self.alt_keywords.iter().any(|kw| alt.contains(kw.as_str()))
        })
    }
}

/// The process-wide, read-only list of descriptors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRegistry {
    descriptors: Vec<CandidateDescriptor>,
    rules: HeuristicRules,
}

impl CandidateRegistry {
    /// Build a registry; an empty descriptor list is rejected.
    pub fn new(
        descriptors: Vec<CandidateDescriptor>,
        rules: HeuristicRules,
    ) -> Result<Self, RegistryError> {
        if descriptors.is_empty() {
            return Err(RegistryError::Empty);
        }
        Ok(Self { descriptors, rules })
    }

    /// Load descriptors from a JSON array of `{selector, classifier}` objects.
    pub fn from_json_file(path: &Path, rules: HeuristicRules) -> Result<Self, RegistryError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw, rules)
    }

    pub fn from_json_str(raw: &str, rules: HeuristicRules) -> Result<Self, RegistryError> {
        let descriptors: Vec<CandidateDescriptor> = serde_json::from_str(raw)?;
        Self::new(descriptors, rules)
    }

    /// The built-in profile-photo registry, highest confidence first.
    pub fn profile_photo(rules: HeuristicRules) -> Self {
        let descriptors = vec![
            // Dedicated profile-picture classes on the authenticated layout.
            CandidateDescriptor::structural("img.pv-top-card-profile-picture__image"),
            CandidateDescriptor::structural(
                r#"img[data-ghost-classes="pv-top-card-profile-picture__image"]"#,
            ),
            CandidateDescriptor::structural(".pv-top-card-profile-picture__image"),
            CandidateDescriptor::structural("img.pv-top-card__photo"),
            CandidateDescriptor::structural("img.profile-photo-edit__preview"),
            CandidateDescriptor::structural(".profile-photo-edit__preview img"),
            CandidateDescriptor::structural(".pv-top-card-profile-picture img"),
            CandidateDescriptor::structural(r#"[data-control-name="identity_profile_photo"] img"#),
            CandidateDescriptor::structural(r#"img[src*="profile-displayphoto"]"#),
            // Alt text and lazy-load attributes.
            CandidateDescriptor::heuristic(r#"img[alt*="profile photo" i]"#),
            CandidateDescriptor::heuristic(r#"img[alt*="headshot" i]"#),
            CandidateDescriptor::heuristic(r#"img[data-delayed-url*="profile-displayphoto"]"#),
            CandidateDescriptor::heuristic(r#"img[data-ghost-url*="profile-displayphoto"]"#),
            // Containers on the public teaser layout.
            CandidateDescriptor::heuristic(".top-card-layout__entity-info img"),
            CandidateDescriptor::heuristic(".profile-topcard__image img"),
            CandidateDescriptor::heuristic(".top-card-layout img"),
            CandidateDescriptor::heuristic(".profile-topcard img"),
            CandidateDescriptor::heuristic(".presence-entity__image img"),
            CandidateDescriptor::heuristic(".pv-top-card--photo img"),
            CandidateDescriptor::heuristic("img.profile-photo"),
            CandidateDescriptor::heuristic(".profile-photo img"),
            CandidateDescriptor::heuristic(".EntityPhoto-square-3 img"),
            CandidateDescriptor::heuristic(".EntityPhoto-circle-6 img"),
            CandidateDescriptor::heuristic(".pv-member-card__actor-detail img"),
            // Loose fallbacks.
            CandidateDescriptor::heuristic("img.lazy-image"),
            CandidateDescriptor::heuristic(r#"img[src*="licdn.com"]"#),
            CandidateDescriptor::heuristic(r#"img[src*="linkedin.com"]"#),
            CandidateDescriptor::heuristic(".profile img"),
            CandidateDescriptor::heuristic(".top-card img"),
        ];
        Self { descriptors, rules }
    }

    pub fn descriptors(&self) -> &[CandidateDescriptor] {
        &self.descriptors
    }

    pub fn rules(&self) -> &HeuristicRules {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn selectors(&self) -> Vec<String> {
        self.descriptors.iter().map(|d| d.selector.clone()).collect()
    }
}

impl Default for CandidateRegistry {
    fn default() -> Self {
        Self::profile_photo(HeuristicRules::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(src: Option<&str>, alt: Option<&str>) -> ElementAttributes {
        ElementAttributes {
            src: src.map(String::from),
            alt: alt.map(String::from),
            class: None,
        }
    }

    #[test]
    fn test_default_registry_has_no_duplicates() {
        let reg = CandidateRegistry::default();
        let mut seen = std::collections::HashSet::new();
        for sel in reg.selectors() {
            assert!(seen.insert(sel.clone()), "duplicate selector {sel}");
        }
        assert!(reg.len() > 20);
    }

    #[test]
    fn test_structural_requires_src() {
        let d = CandidateDescriptor::structural("img.x");
        let rules = HeuristicRules::default();
        assert!(d.classify(&attrs(Some("https://a/b.jpg"), None), &rules));
        assert!(!d.classify(&attrs(None, Some("profile photo")), &rules));
        assert!(!d.classify(&attrs(Some(""), Some("profile photo")), &rules));
    }

    #[test]
    fn test_heuristic_src_fragment() {
        let d = CandidateDescriptor::heuristic("img");
        let rules = HeuristicRules::default();
        let a = attrs(
            Some("https://media.licdn.com/dms/image/profile-displayphoto-shrink_200_200/x"),
            None,
        );
        assert!(d.classify(&a, &rules));
        assert!(!d.classify(&attrs(Some("https://a/banner.jpg"), Some("Banner")), &rules));
    }

    #[test]
    fn test_heuristic_alt_is_case_insensitive() {
        let rules = HeuristicRules::default();
        assert!(rules.looks_like_profile_photo(&attrs(Some("x"), Some("Alice's PROFILE Picture"))));
        assert!(rules.looks_like_profile_photo(&attrs(Some("x"), Some("HeadShot"))));
        assert!(!rules.looks_like_profile_photo(&attrs(Some("x"), Some("Company logo"))));
    }

    #[test]
    fn test_extra_keywords_extend_defaults() {
        let rules = HeuristicRules::default().with_extra_keywords(["Profilbild", " FOTO ", ""]);
        assert!(rules.alt_keywords().contains(&"profile".to_string()));
        assert!(rules.looks_like_profile_photo(&attrs(Some("x"), Some("Profilbild von Anna"))));
        assert!(rules.looks_like_profile_photo(&attrs(Some("x"), Some("Foto de perfil"))));
        assert!(!rules.alt_keywords().contains(&String::new()));
    }

    #[test]
    fn test_non_ascii_keyword_lowercasing() {
        let rules = HeuristicRules::default().with_extra_keywords(["ФОТО"]);
        assert!(rules.looks_like_profile_photo(&attrs(Some("x"), Some("Фото профиля"))));
    }

    #[test]
    fn test_registry_from_json() {
        let raw = r#"[
            {"selector": "img.avatar", "classifier": "structural"},
            {"selector": "img", "classifier": "profile_heuristic"}
        ]"#;
        let reg = CandidateRegistry::from_json_str(raw, HeuristicRules::default()).unwrap();
        assert_eq!(reg.selectors(), vec!["img.avatar", "img"]);
        assert_eq!(reg.descriptors()[1].classifier, Classifier::ProfileHeuristic);
    }

    #[test]
    fn test_empty_registry_rejected() {
        let err = CandidateRegistry::from_json_str("[]", HeuristicRules::default()).unwrap_err();
        assert!(matches!(err, RegistryError::Empty));
    }
}
