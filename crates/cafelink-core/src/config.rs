//! Engine configuration.
//!
//! Every field has a default matching the live site, so an empty JSON object
//! is a valid configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// Host fragment identifying search-backend URLs.
pub const SEARCH_HOST: &str = "search.naver.com";

/// Query parameter carrying the direct-access token.
pub const ART_PARAM: &str = "art";

/// Placeholder replaced by the raw site identifier in the metadata URL.
pub const SITE_PLACEHOLDER: &str = "{site}";

/// Returns true when `url` targets the search backend.
pub fn is_search_url(url: &str) -> bool {
    url.contains(SEARCH_HOST)
}

/// How candidate fields are read from a wrapped link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionScheme {
    /// `/…/cafes/{site}/articles/{post}` path segments.
    #[default]
    PathSegments,

    /// `?clubid={site}&articleid={post}` query parameters.
    QueryParams,
}

/// A search backend the resolver can query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchEndpoint {
    /// Search URL without the `query` parameter.
    pub base_url: String,
    /// Selector for result anchors inside the returned document.
    pub result_selector: String,
}

impl SearchEndpoint {
    /// Builds the lookup URL for a quoted title.
    pub fn lookup_url(&self, title: &str) -> Result<Url, url::ParseError> {
        let separator = if self.base_url.contains('?') { '&' } else { '?' };
        let encoded = urlencoding::encode(title);
        Url::parse(&format!(
            "{}{}query=\"{}\"",
            self.base_url, separator, encoded
        ))
    }
}

/// Settings for one client form factor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantConfig {
    /// Selector for wrapped candidate anchors.
    pub anchor_selector: String,
    /// Search backend for this form factor.
    pub search: SearchEndpoint,
    /// Origin used when building rewritten article links.
    pub article_base: String,
}

impl VariantConfig {
    /// Desktop site defaults.
    pub fn desktop() -> Self {
        Self {
            anchor_selector: "a.article".to_string(),
            search: SearchEndpoint {
                base_url: "https://search.naver.com/search.naver?ssc=tab.cafe.all".to_string(),
                result_selector: "div.detail_box a.title_link".to_string(),
            },
            article_base: "https://cafe.naver.com".to_string(),
        }
    }

    /// Mobile site defaults.
    pub fn mobile() -> Self {
        Self {
            anchor_selector: "a.txt_area".to_string(),
            search: SearchEndpoint {
                base_url: "https://m.search.naver.com/search.naver?ssc=tab.m_cafe.all"
                    .to_string(),
                result_selector: "div.detail_box a.title_link".to_string(),
            },
            article_base: "https://m.cafe.naver.com".to_string(),
        }
    }

    /// Builds the rewritten destination for a resolved article.
    pub fn article_url(&self, site_name: &str, post_id: &str, art: &str) -> String {
        format!(
            "{}/{}/{}?{}={}",
            self.article_base.trim_end_matches('/'),
            site_name,
            post_id,
            ART_PARAM,
            urlencoding::encode(art)
        )
    }
}

/// Where site metadata comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEndpoint {
    /// URL template containing `{site}`.
    pub url_template: String,
    /// JSON pointer to the canonical site name.
    pub name_pointer: String,
    /// JSON pointer to the numeric site index.
    pub index_pointer: String,
}

impl MetadataEndpoint {
    /// Builds the metadata URL for a raw site identifier.
    pub fn url_for(&self, raw_site: &str) -> String {
        self.url_template
            .replace(SITE_PLACEHOLDER, &urlencoding::encode(raw_site))
    }
}

impl Default for MetadataEndpoint {
    fn default() -> Self {
        Self {
            url_template: "https://apis.naver.com/cafe-web/cafe2/CafeGateInfo.json?cluburl={site}"
                .to_string(),
            name_pointer: "/message/result/cafeInfoView/cafeUrl".to_string(),
            index_pointer: "/message/result/cafeInfoView/cafeId".to_string(),
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Quiet period before a main-document rescan fires.
    pub debounce_ms: u64,
    /// Quiet period before a frame-document rescan fires.
    pub frame_debounce_ms: u64,
    /// Delay after history navigation before rescanning.
    pub navigation_settle_ms: u64,
    /// How long the mobile pipeline waits for anchors to appear.
    pub anchor_wait_timeout_ms: u64,
    /// How long a rescan waits for the document to finish loading.
    pub ready_timeout_ms: u64,
    /// How candidate fields are read from links.
    pub extraction: ExtractionScheme,
    /// Desktop pipeline settings.
    pub desktop: VariantConfig,
    /// Mobile pipeline settings.
    pub mobile: VariantConfig,
    /// Site metadata lookup.
    pub metadata: MetadataEndpoint,
    /// Optional cap on concurrent lookups per rescan. `None` is unbounded.
    pub max_concurrent_resolutions: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            frame_debounce_ms: 500,
            navigation_settle_ms: 500,
            anchor_wait_timeout_ms: 5000,
            ready_timeout_ms: 10_000,
            extraction: ExtractionScheme::default(),
            desktop: VariantConfig::desktop(),
            mobile: VariantConfig::mobile(),
            metadata: MetadataEndpoint::default(),
            max_concurrent_resolutions: None,
        }
    }
}

impl EngineConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn frame_debounce(&self) -> Duration {
        Duration::from_millis(self.frame_debounce_ms)
    }

    pub fn navigation_settle(&self) -> Duration {
        Duration::from_millis(self.navigation_settle_ms)
    }

    pub fn anchor_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.anchor_wait_timeout_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    /// Sets the extraction scheme.
    pub fn with_extraction(mut self, extraction: ExtractionScheme) -> Self {
        self.extraction = extraction;
        self
    }

    /// Caps concurrent lookups per rescan.
    pub fn with_max_concurrent_resolutions(mut self, limit: usize) -> Self {
        self.max_concurrent_resolutions = Some(limit.max(1));
        self
    }

    /// Sets the main-document debounce period.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce_ms = debounce.as_millis() as u64;
        self
    }

    /// Loads a configuration from JSON text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_gives_defaults() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.debounce(), Duration::from_secs(1));
        assert_eq!(config.anchor_wait_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn partial_json_overrides() {
        let config =
            EngineConfig::from_json(r#"{"debounce_ms": 250, "extraction": "query_params"}"#)
                .unwrap();
        assert_eq!(config.debounce_ms, 250);
        assert_eq!(config.extraction, ExtractionScheme::QueryParams);
        assert_eq!(config.frame_debounce_ms, 500);
    }

    #[test]
    fn lookup_url_quotes_and_encodes_title() {
        let endpoint = VariantConfig::desktop().search;
        let url = endpoint.lookup_url("Hello world").unwrap();
        assert_eq!(url.host_str(), Some("search.naver.com"));

        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(query.contains(&("query".to_string(), "\"Hello world\"".to_string())));
        assert!(query.contains(&("ssc".to_string(), "tab.cafe.all".to_string())));
    }

    #[test]
    fn mobile_uses_different_host() {
        let url = VariantConfig::mobile().search.lookup_url("x").unwrap();
        assert_eq!(url.host_str(), Some("m.search.naver.com"));
    }

    #[test]
    fn article_url_encodes_art() {
        let desktop = VariantConfig::desktop();
        assert_eq!(
            desktop.article_url("foo", "123", "a b"),
            "https://cafe.naver.com/foo/123?art=a%20b"
        );
    }

    #[test]
    fn metadata_url_substitutes_site() {
        let endpoint = MetadataEndpoint::default();
        assert!(endpoint.url_for("mycafe").ends_with("cluburl=mycafe"));
    }

    #[test]
    fn search_url_detection() {
        assert!(is_search_url("https://search.naver.com/search.naver?x=1"));
        assert!(is_search_url("https://m.search.naver.com/search.naver"));
        assert!(!is_search_url("https://apis.naver.com/cafe-web"));
    }

    #[test]
    fn concurrency_cap_never_zero() {
        let config = EngineConfig::default().with_max_concurrent_resolutions(0);
        assert_eq!(config.max_concurrent_resolutions, Some(1));
    }
}
