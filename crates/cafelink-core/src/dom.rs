//! Ports onto the live page.
//!
//! The engine never touches a browser directly. A host (browser bridge,
//! static snapshot, or test double) implements these traits and the engine
//! drives them.
//!
//! ## Subscriptions
//!
//! [`Document::subscribe`] returns a stream of [`MutationBatch`]es. Dropping
//! the receiver is the unsubscribe; hosts notice the closed channel and stop
//! delivering.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::ObserveError;

/// Stream of mutation batches for one subscription.
pub type MutationStream = mpsc::UnboundedReceiver<MutationBatch>;

/// Stream of frame load notifications.
pub type LoadStream = mpsc::UnboundedReceiver<()>;

/// Stream of whole-page navigation events.
pub type NavigationStream = mpsc::UnboundedReceiver<NavigationEvent>;

/// Identifies a document for dedup scoping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(pub u64);

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "doc#{}", self.0)
    }
}

/// Document loading progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Loading,
    Interactive,
    Complete,
}

impl ReadyState {
    /// Returns true once the document can be queried.
    pub fn is_ready(&self) -> bool {
        !matches!(self, Self::Loading)
    }
}

/// Client form factor, which selects the scan pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormFactor {
    #[default]
    Desktop,
    Mobile,
}

/// Outcome of a bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    TimedOut,
}

/// Whole-page navigation notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationEvent {
    /// History navigation (back/forward or client-side route pop).
    HistoryPop,
    /// The window finished loading.
    Load,
}

/// What a rewritten anchor does when clicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickAction {
    /// Cancel the default action and navigate the top window here.
    NavigateTo(String),
}

/// Text of one direct child of an anchor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildNode {
    /// Lowercase tag name, `None` for text nodes.
    pub tag: Option<String>,
    /// Class list of element children.
    pub classes: Vec<String>,
    /// Text content.
    pub text: String,
}

impl ChildNode {
    /// A bare text node.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            tag: None,
            classes: Vec::new(),
            text: text.into(),
        }
    }

    /// An element child.
    pub fn element(tag: &str, classes: &[&str], text: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.to_ascii_lowercase()),
            classes: classes.iter().map(|c| c.to_string()).collect(),
            text: text.into(),
        }
    }

    /// Returns true for an element with the given tag and class.
    pub fn is(&self, tag: &str, class: &str) -> bool {
        self.tag.as_deref() == Some(tag) && self.classes.iter().any(|c| c == class)
    }
}

/// A link element in a document.
pub trait Anchor: Send + Sync {
    /// Current destination.
    fn href(&self) -> String;

    /// Replaces the destination.
    fn set_href(&self, href: &str);

    /// Direct children, in order.
    fn child_nodes(&self) -> Vec<ChildNode>;

    /// Installs a click handler.
    fn intercept_clicks(&self, action: ClickAction);
}

/// An element added to a document.
pub trait ElementNode: Send + Sync {
    /// Returns true if the element itself matches `selector`.
    fn matches(&self, selector: &str) -> bool;

    /// Returns true if any descendant matches `selector`.
    fn contains(&self, selector: &str) -> bool;
}

/// A node reported in a mutation batch.
#[derive(Clone)]
pub enum AddedNode {
    /// An embedded frame element.
    Frame(Arc<dyn Frame>),
    /// Any other element.
    Element(Arc<dyn ElementNode>),
}

impl std::fmt::Debug for AddedNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Frame(frame) => write!(f, "Frame({})", frame.id()),
            Self::Element(_) => write!(f, "Element"),
        }
    }
}

/// One delivery of subtree changes.
#[derive(Debug, Clone, Default)]
pub struct MutationBatch {
    /// Nodes added to the observed subtree.
    pub added: Vec<AddedNode>,
}

impl MutationBatch {
    /// Returns true if any added node is or contains a match.
    pub fn adds_match(&self, selector: &str) -> bool {
        self.added.iter().any(|node| match node {
            AddedNode::Element(el) => el.matches(selector) || el.contains(selector),
            AddedNode::Frame(_) => false,
        })
    }

    /// Frames added in this batch.
    pub fn frames(&self) -> impl Iterator<Item = &Arc<dyn Frame>> {
        self.added.iter().filter_map(|node| match node {
            AddedNode::Frame(frame) => Some(frame),
            AddedNode::Element(_) => None,
        })
    }
}

/// A document: the main page or a frame's content.
#[async_trait]
pub trait Document: Send + Sync {
    /// Stable identity for this document instance.
    fn id(&self) -> DocumentId;

    /// Document URL.
    fn url(&self) -> String;

    /// Loading progress.
    fn ready_state(&self) -> ReadyState;

    /// Resolves once the content-loaded notification fires.
    async fn content_loaded(&self);

    /// All anchors matching `selector`, in document order.
    fn query_anchors(&self, selector: &str) -> Vec<Arc<dyn Anchor>>;

    /// Text of every inline script.
    fn script_texts(&self) -> Vec<String>;

    /// Frame elements currently in the document.
    fn frames(&self) -> Vec<Arc<dyn Frame>>;

    /// Subscribes to subtree mutations under the body.
    fn subscribe(&self) -> Result<MutationStream, ObserveError>;
}

/// An embedded frame element.
pub trait Frame: Send + Sync {
    /// Stable identity of the frame element.
    fn id(&self) -> u64;

    /// The frame's current content document.
    fn content_document(&self) -> Result<Arc<dyn Document>, ObserveError>;

    /// Subscribes to the frame's load notifications.
    fn subscribe_load(&self) -> LoadStream;
}

/// The top-level page the agent runs in.
pub trait Page: Send + Sync {
    /// The main document.
    fn main_document(&self) -> Arc<dyn Document>;

    /// Client form factor.
    fn form_factor(&self) -> FormFactor;

    /// Subscribes to whole-page navigation events.
    fn subscribe_navigation(&self) -> NavigationStream;
}

/// Waits until `doc` is interactive, bounded by `limit`.
pub async fn wait_until_ready(doc: &dyn Document, limit: Duration) -> Readiness {
    if doc.ready_state().is_ready() {
        return Readiness::Ready;
    }

    match tokio::time::timeout(limit, doc.content_loaded()).await {
        Ok(()) => Readiness::Ready,
        Err(_) => Readiness::TimedOut,
    }
}

/// Waits until an anchor matching `selector` exists, bounded by `limit`.
///
/// Checks once, then re-checks after every mutation batch.
pub async fn wait_for_anchor(doc: &dyn Document, selector: &str, limit: Duration) -> Readiness {
    if !doc.query_anchors(selector).is_empty() {
        return Readiness::Ready;
    }

    let mut stream = match doc.subscribe() {
        Ok(stream) => stream,
        Err(e) => {
            debug!(doc = %doc.id(), "cannot watch for anchors: {}", e);
            return Readiness::TimedOut;
        }
    };

    let wait = async {
        while stream.recv().await.is_some() {
            if !doc.query_anchors(selector).is_empty() {
                return Readiness::Ready;
            }
        }
        Readiness::TimedOut
    };

    tokio::time::timeout(limit, wait)
        .await
        .unwrap_or(Readiness::TimedOut)
}
