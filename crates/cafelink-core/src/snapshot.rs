//! Static HTML snapshot host.
//!
//! Implements the page ports over a fetched HTML document so the engine can
//! run headless. The snapshot never mutates on its own: subscriptions close
//! immediately and there are no frames. Rewrites are recorded on the anchors
//! and can be rendered back into the HTML.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use lol_html::errors::RewritingError;
use lol_html::{element, rewrite_str, RewriteStrSettings};
use parking_lot::Mutex;
use scraper::{ElementRef, Html, Node, Selector};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::dom::{
    Anchor, ChildNode, ClickAction, Document, DocumentId, FormFactor, Frame, MutationStream,
    NavigationStream, Page, ReadyState,
};
use crate::error::ObserveError;

static NEXT_SNAPSHOT: AtomicU64 = AtomicU64::new(1);

/// One rewritten link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkRewrite {
    pub original: String,
    pub target: String,
}

/// Anchor inside a snapshot.
pub struct SnapshotAnchor {
    original: String,
    href: Mutex<String>,
    children: Vec<ChildNode>,
    click: Mutex<Option<ClickAction>>,
}

impl SnapshotAnchor {
    /// The click action installed by a rewrite, if any.
    pub fn click_action(&self) -> Option<ClickAction> {
        self.click.lock().clone()
    }

    fn rewrite(&self) -> Option<LinkRewrite> {
        let href = self.href.lock();
        (*href != self.original).then(|| LinkRewrite {
            original: self.original.clone(),
            target: href.clone(),
        })
    }
}

impl Anchor for SnapshotAnchor {
    fn href(&self) -> String {
        self.href.lock().clone()
    }

    fn set_href(&self, href: &str) {
        *self.href.lock() = href.to_string();
    }

    fn child_nodes(&self) -> Vec<ChildNode> {
        self.children.clone()
    }

    fn intercept_clicks(&self, action: ClickAction) {
        *self.click.lock() = Some(action);
    }
}

/// A parsed HTML document.
pub struct SnapshotDocument {
    id: DocumentId,
    url: String,
    html: String,
    anchors: Vec<Arc<SnapshotAnchor>>,
    scripts: Vec<String>,
}

impl SnapshotDocument {
    /// Parses `html` fetched from `url`.
    pub fn parse(url: &str, html: &str) -> Self {
        let document = Html::parse_document(html);
        let base = url::Url::parse(url).ok();

        let anchors = all_anchors(&document)
            .map(|el| {
                let raw = el.value().attr("href").unwrap_or_default();
                let href = base
                    .as_ref()
                    .and_then(|b| b.join(raw).ok())
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| raw.to_string());
                Arc::new(SnapshotAnchor {
                    original: href.clone(),
                    href: Mutex::new(href),
                    children: child_nodes(el),
                    click: Mutex::new(None),
                })
            })
            .collect();

        let scripts = match Selector::parse("script") {
            Ok(selector) => document
                .select(&selector)
                .map(|s| s.text().collect::<String>())
                .collect(),
            Err(_) => Vec::new(),
        };

        Self {
            id: DocumentId(NEXT_SNAPSHOT.fetch_add(1, Ordering::Relaxed)),
            url: url.to_string(),
            html: html.to_string(),
            anchors,
            scripts,
        }
    }

    /// Links changed since parsing, in document order.
    pub fn rewrites(&self) -> Vec<LinkRewrite> {
        self.anchors.iter().filter_map(|a| a.rewrite()).collect()
    }

    /// The original HTML with every rewritten `href` replaced.
    pub fn render(&self) -> Result<String, RewritingError> {
        let base = url::Url::parse(&self.url).ok();
        let targets: HashMap<String, String> = self
            .rewrites()
            .into_iter()
            .map(|r| (r.original, r.target))
            .collect();
        if targets.is_empty() {
            return Ok(self.html.clone());
        }

        let rendered = rewrite_str(
            &self.html,
            RewriteStrSettings {
                element_content_handlers: vec![element!("a[href]", |el| {
                    let Some(raw) = el.get_attribute("href") else {
                        return Ok(());
                    };
                    let absolute = base
                        .as_ref()
                        .and_then(|b| b.join(&raw).ok())
                        .map(|u| u.to_string())
                        .unwrap_or(raw);
                    if let Some(target) = targets.get(&absolute) {
                        el.set_attribute("href", target)?;
                    }
                    Ok(())
                })],
                ..RewriteStrSettings::new()
            },
        );
        rendered
    }
}

/// Every `a` element in document order.
fn all_anchors(document: &Html) -> impl Iterator<Item = ElementRef<'_>> {
    document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "a")
}

fn child_nodes(el: ElementRef<'_>) -> Vec<ChildNode> {
    el.children()
        .filter_map(|child| match child.value() {
            Node::Text(text) => Some(ChildNode::text(&**text)),
            Node::Element(element) => {
                let classes: Vec<&str> = element.classes().collect();
                let text = ElementRef::wrap(child)
                    .map(|r| r.text().collect::<String>())
                    .unwrap_or_default();
                Some(ChildNode::element(element.name(), &classes, text))
            }
            _ => None,
        })
        .collect()
}

#[async_trait]
impl Document for SnapshotDocument {
    fn id(&self) -> DocumentId {
        self.id
    }

    fn url(&self) -> String {
        self.url.clone()
    }

    fn ready_state(&self) -> ReadyState {
        ReadyState::Complete
    }

    async fn content_loaded(&self) {}

    fn query_anchors(&self, selector: &str) -> Vec<Arc<dyn Anchor>> {
        let selector = match Selector::parse(selector) {
            Ok(selector) => selector,
            Err(e) => {
                debug!("invalid anchor selector {}: {}", selector, e);
                return Vec::new();
            }
        };

        let document = Html::parse_document(&self.html);
        let positions: HashMap<_, usize> = all_anchors(&document)
            .enumerate()
            .map(|(i, el)| (el.id(), i))
            .collect();

        document
            .select(&selector)
            .filter_map(|el| positions.get(&el.id()))
            .filter_map(|&i| self.anchors.get(i))
            .map(|a| Arc::clone(a) as Arc<dyn Anchor>)
            .collect()
    }

    fn script_texts(&self) -> Vec<String> {
        self.scripts.clone()
    }

    fn frames(&self) -> Vec<Arc<dyn Frame>> {
        Vec::new()
    }

    fn subscribe(&self) -> Result<MutationStream, ObserveError> {
        let (_, rx) = mpsc::unbounded_channel();
        Ok(rx)
    }
}

/// A page wrapping one snapshot document.
pub struct SnapshotPage {
    document: Arc<SnapshotDocument>,
    form_factor: FormFactor,
}

impl SnapshotPage {
    pub fn new(document: SnapshotDocument, form_factor: FormFactor) -> Self {
        Self {
            document: Arc::new(document),
            form_factor,
        }
    }

    /// Parses `html` fetched from `url` into a page.
    pub fn parse(url: &str, html: &str, form_factor: FormFactor) -> Self {
        Self::new(SnapshotDocument::parse(url, html), form_factor)
    }

    pub fn document(&self) -> &Arc<SnapshotDocument> {
        &self.document
    }
}

impl Page for SnapshotPage {
    fn main_document(&self) -> Arc<dyn Document> {
        Arc::clone(&self.document) as Arc<dyn Document>
    }

    fn form_factor(&self) -> FormFactor {
        self.form_factor
    }

    fn subscribe_navigation(&self) -> NavigationStream {
        let (_, rx) = mpsc::unbounded_channel();
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head>
<script>var g_sCafeData = {"cafeId": 1, "cafeUrl": "foo"};</script>
</head><body>
<a class="article" href="/ca-fe/cafes/1/articles/123"><span class="head">[notice]</span> Weekly <em>meetup</em></a>
<a class="other" href="https://example.com/">elsewhere</a>
<a class="article" href="https://cafe.naver.com/ca-fe/cafes/1/articles/456">Second</a>
</body></html>"#;

    fn snapshot() -> SnapshotDocument {
        SnapshotDocument::parse("https://cafe.naver.com/foo", PAGE)
    }

    #[test]
    fn anchors_resolve_relative_hrefs() {
        let doc = snapshot();
        let anchors = doc.query_anchors("a.article");
        assert_eq!(anchors.len(), 2);
        assert_eq!(
            anchors[0].href(),
            "https://cafe.naver.com/ca-fe/cafes/1/articles/123"
        );
        assert_eq!(
            anchors[1].href(),
            "https://cafe.naver.com/ca-fe/cafes/1/articles/456"
        );
    }

    #[test]
    fn anchor_children_keep_structure() {
        let doc = snapshot();
        let children = doc.query_anchors("a.article")[0].child_nodes();
        assert!(children[0].is("span", "head"));
        assert_eq!(
            crate::candidate::extract_title(&children),
            "Weekly meetup"
        );
    }

    #[test]
    fn scripts_are_exposed() {
        let doc = snapshot();
        let scripts = doc.script_texts();
        assert_eq!(
            crate::candidate::site_name_from_scripts(&scripts).as_deref(),
            Some("foo")
        );
    }

    #[test]
    fn render_replaces_rewritten_hrefs_only() {
        let doc = snapshot();
        let first = &doc.query_anchors("a.article")[0];
        first.set_href("https://cafe.naver.com/foo/123?art=xyz");

        assert_eq!(doc.rewrites().len(), 1);
        let html = doc.render().unwrap();
        assert!(html.contains(r#"href="https://cafe.naver.com/foo/123?art=xyz""#));
        assert!(html.contains(r#"href="https://cafe.naver.com/ca-fe/cafes/1/articles/456""#));
        assert!(html.contains(r#"href="https://example.com/""#));
    }

    #[test]
    fn unchanged_snapshot_renders_verbatim() {
        let doc = snapshot();
        assert_eq!(doc.render().unwrap(), PAGE);
    }

    #[test]
    fn subscriptions_close_immediately() {
        let doc = snapshot();
        let mut stream = doc.subscribe().unwrap();
        assert!(tokio_test::block_on(stream.recv()).is_none());
    }
}
