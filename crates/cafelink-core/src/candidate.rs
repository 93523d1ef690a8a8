//! Candidate link extraction.
//!
//! A candidate is a wrapped link whose direct-access token we want to look
//! up. Everything here is pure: it reads URLs, child text, and script text.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::config::ExtractionScheme;
use crate::dom::{Anchor, ChildNode};

/// Site name embedded in page scripts, escaped (`\"cafeUrl\":\"x\"`) or plain.
static SITE_NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\\?"cafeUrl\\?"\s*:\s*\\?"([^"\\]+)\\?""#).expect("valid site name regex")
});

/// Numeric site index embedded in page scripts.
static SITE_INDEX_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\\?"cafeId\\?"\s*:\s*\\?"?(\d+)"#).expect("valid site index regex")
});

/// Fields extracted from one wrapped link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkCandidate {
    /// Raw destination as found on the page.
    pub href: String,
    /// Site identifier from the link, if present.
    pub site_id: Option<String>,
    /// Post identifier from the link, if present.
    pub post_id: Option<String>,
    /// Visible title used as the search query.
    pub title: String,
}

impl LinkCandidate {
    /// Extracts a candidate from raw parts.
    pub fn from_parts(href: &str, children: &[ChildNode], scheme: ExtractionScheme) -> Self {
        let (site_id, post_id) = match Url::parse(href) {
            Ok(url) => match scheme {
                ExtractionScheme::PathSegments => ids_from_path(&url),
                ExtractionScheme::QueryParams => ids_from_query(&url),
            },
            Err(_) => (None, None),
        };

        Self {
            href: href.to_string(),
            site_id,
            post_id,
            title: extract_title(children),
        }
    }

    /// Extracts a candidate from a live anchor.
    pub fn from_anchor(anchor: &dyn Anchor, scheme: ExtractionScheme) -> Self {
        Self::from_parts(&anchor.href(), &anchor.child_nodes(), scheme)
    }

    /// Returns true when there is enough to search for.
    pub fn is_resolvable(&self) -> bool {
        self.post_id.is_some() && !self.title.is_empty()
    }
}

/// Segment following `marker` in the URL path.
fn segment_after(url: &Url, marker: &str) -> Option<String> {
    let mut segments = url.path_segments()?;
    segments.find(|s| *s == marker)?;
    segments
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn ids_from_path(url: &Url) -> (Option<String>, Option<String>) {
    (segment_after(url, "cafes"), segment_after(url, "articles"))
}

fn ids_from_query(url: &Url) -> (Option<String>, Option<String>) {
    let mut site_id = None;
    let mut post_id = None;
    for (key, value) in url.query_pairs() {
        match key.to_ascii_lowercase().as_str() {
            "clubid" => site_id = Some(value.into_owned()),
            "articleid" => post_id = Some(value.into_owned()),
            _ => {}
        }
    }
    (site_id, post_id)
}

/// Builds the visible title of a link.
///
/// A leading `span.head` (board prefix such as "[notice]") is not part of the
/// title; the remaining children are trimmed and joined with single spaces.
pub fn extract_title(children: &[ChildNode]) -> String {
    let has_head = children.iter().any(|c| c.is("span", "head"));

    if has_head {
        children
            .iter()
            .filter(|c| !c.is("span", "head"))
            .map(|c| c.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    } else {
        children
            .iter()
            .map(|c| c.text.as_str())
            .collect::<String>()
            .trim()
            .to_string()
    }
}

/// Finds the canonical site name in inline script text.
pub fn site_name_from_scripts<S: AsRef<str>>(scripts: &[S]) -> Option<String> {
    scripts.iter().find_map(|text| {
        SITE_NAME_PATTERN
            .captures(text.as_ref())
            .map(|c| c[1].to_string())
    })
}

/// Finds the numeric site index in inline script text.
pub fn site_index_from_scripts<S: AsRef<str>>(scripts: &[S]) -> Option<String> {
    scripts.iter().find_map(|text| {
        SITE_INDEX_PATTERN
            .captures(text.as_ref())
            .map(|c| c[1].to_string())
    })
}

/// Raw site identifier from a page URL.
///
/// `/ca-fe/web/cafes/{site}/…` yields `{site}`; otherwise the first path
/// segment is used.
pub fn raw_site_from_url(page_url: &str) -> Option<String> {
    let url = Url::parse(page_url).ok()?;
    segment_after(&url, "cafes").or_else(|| {
        url.path_segments()?
            .find(|s| !s.is_empty())
            .map(str::to_string)
    })
}

/// Splits a result link into `(site name, post id, art)`.
pub fn parse_result_link(url: &Url) -> (Option<String>, Option<String>, Option<String>) {
    let mut segments = url
        .path_segments()
        .map(|s| s.map(str::to_string).collect::<Vec<_>>())
        .unwrap_or_default()
        .into_iter();
    let site = segments.next().filter(|s| !s.is_empty());
    let post = segments.next().filter(|s| !s.is_empty());
    let art = url
        .query_pairs()
        .find(|(k, _)| k == crate::config::ART_PARAM)
        .map(|(_, v)| v.into_owned());
    (site, post, art)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WRAPPED: &str = "https://cafe.naver.com/ca-fe/cafes/10050146/articles/12345?referrerAllArticles=true";

    #[test]
    fn path_segments_extraction() {
        let c = LinkCandidate::from_parts(
            WRAPPED,
            &[ChildNode::text("  Hello  ")],
            ExtractionScheme::PathSegments,
        );
        assert_eq!(c.site_id.as_deref(), Some("10050146"));
        assert_eq!(c.post_id.as_deref(), Some("12345"));
        assert_eq!(c.title, "Hello");
        assert!(c.is_resolvable());
    }

    #[test]
    fn query_params_extraction() {
        let href = "https://cafe.naver.com/ArticleRead.nhn?clubid=10050146&articleid=777";
        let c = LinkCandidate::from_parts(
            href,
            &[ChildNode::text("t")],
            ExtractionScheme::QueryParams,
        );
        assert_eq!(c.site_id.as_deref(), Some("10050146"));
        assert_eq!(c.post_id.as_deref(), Some("777"));

        let by_path =
            LinkCandidate::from_parts(href, &[ChildNode::text("t")], ExtractionScheme::PathSegments);
        assert!(by_path.post_id.is_none());
        assert!(!by_path.is_resolvable());
    }

    #[test]
    fn unparseable_href_has_no_ids() {
        let c = LinkCandidate::from_parts(
            "/relative/only",
            &[ChildNode::text("t")],
            ExtractionScheme::PathSegments,
        );
        assert!(c.site_id.is_none());
        assert!(c.post_id.is_none());
    }

    #[test]
    fn title_skips_head_span() {
        let children = vec![
            ChildNode::element("span", &["head"], "[notice]"),
            ChildNode::text("  Weekly "),
            ChildNode::element("em", &[], "meetup"),
            ChildNode::text("   "),
        ];
        assert_eq!(extract_title(&children), "Weekly meetup");
    }

    #[test]
    fn title_without_head_is_trimmed_text() {
        let children = vec![
            ChildNode::text(" Hello "),
            ChildNode::element("b", &[], "World "),
        ];
        assert_eq!(extract_title(&children), "Hello World");
    }

    #[test]
    fn site_name_from_escaped_script() {
        let scripts = vec![
            "var x = 1;".to_string(),
            r#"window.__DATA__ = "{\"cafeId\":10050146,\"cafeUrl\":\"foo\"}";"#.to_string(),
        ];
        assert_eq!(site_name_from_scripts(&scripts).as_deref(), Some("foo"));
        assert_eq!(
            site_index_from_scripts(&scripts).as_deref(),
            Some("10050146")
        );
    }

    #[test]
    fn site_name_from_plain_json() {
        let scripts = [r#"{"cafeUrl": "bar"}"#];
        assert_eq!(site_name_from_scripts(&scripts).as_deref(), Some("bar"));
        assert!(site_name_from_scripts(&["nothing here"]).is_none());
    }

    #[test]
    fn raw_site_from_mobile_url() {
        assert_eq!(
            raw_site_from_url("https://m.cafe.naver.com/ca-fe/web/cafes/foo/articles/1").as_deref(),
            Some("foo")
        );
        assert_eq!(
            raw_site_from_url("https://m.cafe.naver.com/bar").as_deref(),
            Some("bar")
        );
        assert!(raw_site_from_url("https://m.cafe.naver.com/").is_none());
    }

    #[test]
    fn result_link_parts() {
        let url = Url::parse("https://cafe.naver.com/foo/123?art=xyz&x=1").unwrap();
        let (site, post, art) = parse_result_link(&url);
        assert_eq!(site.as_deref(), Some("foo"));
        assert_eq!(post.as_deref(), Some("123"));
        assert_eq!(art.as_deref(), Some("xyz"));
    }
}
