//! In-memory page, document, and relay doubles for tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use crate::dom::{
    AddedNode, Anchor, ChildNode, ClickAction, Document, DocumentId, ElementNode, FormFactor,
    Frame, LoadStream, MutationBatch, MutationStream, NavigationEvent, NavigationStream, Page,
    ReadyState,
};
use crate::error::{ObserveError, RelayError};
use crate::relay::{Relay, RelayRequest, RelayResponse};
use crate::status::{IconSink, TriState};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Builds a search result page with one result anchor per href.
pub fn search_results_html(hrefs: &[&str]) -> String {
    let mut html = String::from("<html><body><div class=\"results\">");
    for href in hrefs {
        html.push_str(&format!(
            "<div class=\"detail_box\"><a class=\"title_link\" href=\"{href}\">result</a></div>"
        ));
    }
    html.push_str("</div></body></html>");
    html
}

/// Anchor double matching exactly one selector string.
pub struct FakeAnchor {
    selector: String,
    href: Mutex<String>,
    children: Vec<ChildNode>,
    clicks: Mutex<Vec<ClickAction>>,
}

impl FakeAnchor {
    pub fn new(selector: &str, href: &str, title: &str) -> Arc<Self> {
        Self::with_children(selector, href, vec![ChildNode::text(title)])
    }

    pub fn with_children(selector: &str, href: &str, children: Vec<ChildNode>) -> Arc<Self> {
        Arc::new(Self {
            selector: selector.to_string(),
            href: Mutex::new(href.to_string()),
            children,
            clicks: Mutex::new(Vec::new()),
        })
    }

    pub fn current_href(&self) -> String {
        self.href.lock().clone()
    }

    pub fn clicks(&self) -> Vec<ClickAction> {
        self.clicks.lock().clone()
    }
}

impl Anchor for FakeAnchor {
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
        self.clicks.lock().push(action);
    }
}

impl ElementNode for FakeAnchor {
    fn matches(&self, selector: &str) -> bool {
        self.selector == selector
    }

    fn contains(&self, _selector: &str) -> bool {
        false
    }
}

/// Element that matches nothing.
struct PlainElement;

impl ElementNode for PlainElement {
    fn matches(&self, _selector: &str) -> bool {
        false
    }

    fn contains(&self, _selector: &str) -> bool {
        false
    }
}

/// Document double with controllable loading and mutations.
pub struct FakeDocument {
    id: DocumentId,
    url: String,
    ready: Mutex<ReadyState>,
    loaded: Notify,
    anchors: Mutex<Vec<Arc<FakeAnchor>>>,
    scripts: Mutex<Vec<String>>,
    frames: Mutex<Vec<Arc<FakeFrame>>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<MutationBatch>>>,
}

impl FakeDocument {
    pub fn new(url: &str) -> Arc<Self> {
        Self::with_state(url, ReadyState::Complete)
    }

    pub fn loading(url: &str) -> Arc<Self> {
        Self::with_state(url, ReadyState::Loading)
    }

    fn with_state(url: &str, state: ReadyState) -> Arc<Self> {
        Arc::new(Self {
            id: DocumentId(next_id()),
            url: url.to_string(),
            ready: Mutex::new(state),
            loaded: Notify::new(),
            anchors: Mutex::new(Vec::new()),
            scripts: Mutex::new(Vec::new()),
            frames: Mutex::new(Vec::new()),
            subscribers: Mutex::new(Vec::new()),
        })
    }

    pub fn finish_loading(&self) {
        *self.ready.lock() = ReadyState::Complete;
        self.loaded.notify_waiters();
    }

    pub fn add_script(&self, text: &str) {
        self.scripts.lock().push(text.to_string());
    }

    /// Adds an anchor without notifying subscribers.
    pub fn add_anchor(&self, anchor: Arc<FakeAnchor>) {
        self.anchors.lock().push(anchor);
    }

    /// Adds an anchor and notifies subscribers.
    pub fn insert_anchor(&self, anchor: Arc<FakeAnchor>) {
        self.anchors.lock().push(Arc::clone(&anchor));
        self.broadcast(MutationBatch {
            added: vec![AddedNode::Element(anchor as Arc<dyn ElementNode>)],
        });
    }

    /// Adds a frame and notifies subscribers.
    pub fn insert_frame(&self, frame: Arc<FakeFrame>) {
        self.frames.lock().push(Arc::clone(&frame));
        self.broadcast(MutationBatch {
            added: vec![AddedNode::Frame(frame as Arc<dyn Frame>)],
        });
    }

    /// Adds a frame without notifying subscribers.
    pub fn add_frame(&self, frame: Arc<FakeFrame>) {
        self.frames.lock().push(frame);
    }

    /// Notifies subscribers of an element that matches nothing.
    pub fn insert_unrelated(&self) {
        self.broadcast(MutationBatch {
            added: vec![AddedNode::Element(Arc::new(PlainElement))],
        });
    }

    /// Live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        let mut subs = self.subscribers.lock();
        subs.retain(|tx| !tx.is_closed());
        subs.len()
    }

    fn broadcast(&self, batch: MutationBatch) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(batch.clone()).is_ok());
    }
}

#[async_trait]
impl Document for FakeDocument {
    fn id(&self) -> DocumentId {
        self.id
    }

    fn url(&self) -> String {
        self.url.clone()
    }

    fn ready_state(&self) -> ReadyState {
        *self.ready.lock()
    }

    async fn content_loaded(&self) {
        loop {
            let notified = self.loaded.notified();
            if self.ready_state().is_ready() {
                return;
            }
            notified.await;
        }
    }

    fn query_anchors(&self, selector: &str) -> Vec<Arc<dyn Anchor>> {
        self.anchors
            .lock()
            .iter()
            .filter(|a| a.selector == selector)
            .map(|a| Arc::clone(a) as Arc<dyn Anchor>)
            .collect()
    }

    fn script_texts(&self) -> Vec<String> {
        self.scripts.lock().clone()
    }

    fn frames(&self) -> Vec<Arc<dyn Frame>> {
        self.frames
            .lock()
            .iter()
            .map(|f| Arc::clone(f) as Arc<dyn Frame>)
            .collect()
    }

    fn subscribe(&self) -> Result<MutationStream, ObserveError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        Ok(rx)
    }
}

/// Frame double.
pub struct FakeFrame {
    id: u64,
    document: Mutex<Result<Arc<FakeDocument>, ObserveError>>,
    load_subscribers: Mutex<Vec<mpsc::UnboundedSender<()>>>,
}

impl FakeFrame {
    pub fn new(document: Arc<FakeDocument>) -> Arc<Self> {
        Arc::new(Self {
            id: next_id(),
            document: Mutex::new(Ok(document)),
            load_subscribers: Mutex::new(Vec::new()),
        })
    }

    pub fn cross_origin() -> Arc<Self> {
        Arc::new(Self {
            id: next_id(),
            document: Mutex::new(Err(ObserveError::CrossOrigin)),
            load_subscribers: Mutex::new(Vec::new()),
        })
    }

    /// Swaps in a new document and fires `load`.
    pub fn navigate(&self, document: Arc<FakeDocument>) {
        *self.document.lock() = Ok(document);
        self.fire_load();
    }

    pub fn fire_load(&self) {
        self.load_subscribers
            .lock()
            .retain(|tx| tx.send(()).is_ok());
    }

    pub fn load_subscriber_count(&self) -> usize {
        let mut subs = self.load_subscribers.lock();
        subs.retain(|tx| !tx.is_closed());
        subs.len()
    }
}

impl Frame for FakeFrame {
    fn id(&self) -> u64 {
        self.id
    }

    fn content_document(&self) -> Result<Arc<dyn Document>, ObserveError> {
        match &*self.document.lock() {
            Ok(doc) => Ok(Arc::clone(doc) as Arc<dyn Document>),
            Err(e) => Err(e.clone()),
        }
    }

    fn subscribe_load(&self) -> LoadStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.load_subscribers.lock().push(tx);
        rx
    }
}

/// Page double.
pub struct FakePage {
    document: Arc<FakeDocument>,
    form_factor: FormFactor,
    navigation: Mutex<Vec<mpsc::UnboundedSender<NavigationEvent>>>,
}

impl FakePage {
    pub fn new(document: Arc<FakeDocument>) -> Arc<Self> {
        Self::with_form_factor(document, FormFactor::Desktop)
    }

    pub fn with_form_factor(document: Arc<FakeDocument>, form_factor: FormFactor) -> Arc<Self> {
        Arc::new(Self {
            document,
            form_factor,
            navigation: Mutex::new(Vec::new()),
        })
    }

    pub fn document(&self) -> &Arc<FakeDocument> {
        &self.document
    }

    pub fn navigate(&self, event: NavigationEvent) {
        self.navigation.lock().retain(|tx| tx.send(event).is_ok());
    }

    pub fn navigation_subscriber_count(&self) -> usize {
        let mut subs = self.navigation.lock();
        subs.retain(|tx| !tx.is_closed());
        subs.len()
    }
}

impl Page for FakePage {
    fn main_document(&self) -> Arc<dyn Document> {
        Arc::clone(&self.document) as Arc<dyn Document>
    }

    fn form_factor(&self) -> FormFactor {
        self.form_factor
    }

    fn subscribe_navigation(&self) -> NavigationStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.navigation.lock().push(tx);
        rx
    }
}

/// Relay double answering fetches by URL substring.
#[derive(Default)]
pub struct FakeRelay {
    routes: Vec<(String, Result<String, String>)>,
    requests: Mutex<Vec<RelayRequest>>,
    delay: Duration,
}

impl FakeRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers fetches whose URL contains `pattern`.
    pub fn with_route(mut self, pattern: &str, reply: Result<&str, &str>) -> Self {
        let reply = reply.map(str::to_string).map_err(str::to_string);
        self.routes.push((pattern.to_string(), reply));
        self
    }

    /// Delays every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn requests(&self) -> Vec<RelayRequest> {
        self.requests.lock().clone()
    }

    /// Number of fetches whose URL contains `pattern`.
    pub fn fetch_count(&self, pattern: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| matches!(r, RelayRequest::FetchUrl { url } if url.contains(pattern)))
            .count()
    }
}

#[async_trait]
impl Relay for FakeRelay {
    async fn send(&self, request: RelayRequest) -> Result<RelayResponse, RelayError> {
        self.requests.lock().push(request.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match request {
            RelayRequest::FetchUrl { url } => {
                let route = self.routes.iter().find(|(pattern, _)| url.contains(pattern));
                match route {
                    Some((_, Ok(data))) => Ok(RelayResponse::data(data.clone())),
                    Some((_, Err(error))) => Ok(RelayResponse::error(error.clone())),
                    None => Err(RelayError::Transport(format!("no route for {url}"))),
                }
            }
            _ => Ok(RelayResponse::success()),
        }
    }
}

/// Icon sink recording every update.
#[derive(Default)]
pub struct RecordingIcon {
    shown: Mutex<Vec<TriState>>,
}

impl RecordingIcon {
    pub fn shown(&self) -> Vec<TriState> {
        self.shown.lock().clone()
    }
}

impl IconSink for RecordingIcon {
    fn show(&self, status: TriState) {
        self.shown.lock().push(status);
    }
}
