//! Dedup sets and the site metadata cache.
//!
//! ## Seen links
//!
//! Each document gets a [`ScanScope`]: the set of hrefs already dispatched in
//! the current epoch, plus the epoch counter itself. Inserting is the claim:
//! whoever inserts a href first resolves it. Resetting a scope clears the set
//! and bumps the epoch so results still in flight for the old epoch can be
//! recognized as stale.
//!
//! ## Site metadata
//!
//! Read-through, fill-once. Failures are not cached, so a later rescan may
//! retry. Two racing misses may both fetch; the second store wins.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::MetadataEndpoint;
use crate::dom::DocumentId;
use crate::error::MetadataError;
use crate::relay::{fetch_text, Relay};

/// Seen-link set and epoch for one document.
#[derive(Debug, Default)]
pub struct ScanScope {
    seen: Mutex<HashSet<String>>,
    epoch: AtomicU64,
}

impl ScanScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `href` for resolution in `epoch`.
    ///
    /// Fails if the href is already claimed or the scope has moved past
    /// `epoch`.
    pub fn claim_in(&self, href: &str, epoch: u64) -> bool {
        let mut seen = self.seen.lock();
        self.epoch.load(Ordering::SeqCst) == epoch && seen.insert(href.to_string())
    }

    /// Returns true if `href` was claimed this epoch.
    pub fn contains(&self, href: &str) -> bool {
        self.seen.lock().contains(href)
    }

    /// Current epoch.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Returns true while `epoch` is current.
    pub fn is_current(&self, epoch: u64) -> bool {
        self.epoch() == epoch
    }

    /// Starts a new epoch with an empty set.
    pub fn reset(&self) -> u64 {
        let mut seen = self.seen.lock();
        seen.clear();
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }
}

/// Scan scopes for every document the agent has touched.
#[derive(Debug, Default)]
pub struct ScopeRegistry {
    scopes: RwLock<HashMap<DocumentId, Arc<ScanScope>>>,
}

impl ScopeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the scope for `doc`, creating it on first use.
    pub fn scope(&self, doc: DocumentId) -> Arc<ScanScope> {
        if let Some(scope) = self.scopes.read().get(&doc) {
            return Arc::clone(scope);
        }

        let mut scopes = self.scopes.write();
        Arc::clone(scopes.entry(doc).or_default())
    }

    /// Starts a new epoch for one document.
    pub fn reset(&self, doc: DocumentId) -> u64 {
        self.scope(doc).reset()
    }

    /// Starts a new epoch for every document.
    pub fn reset_all(&self) {
        for scope in self.scopes.read().values() {
            scope.reset();
        }
    }

    /// Total hrefs claimed across documents in their current epochs.
    pub fn seen_count(&self) -> usize {
        self.scopes.read().values().map(|s| s.len()).sum()
    }
}

/// Resolved identity of a site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteMetadata {
    /// Site name used in article paths.
    pub canonical_name: String,
    /// Numeric site index, when known.
    pub site_index: Option<String>,
}

impl SiteMetadata {
    pub fn named(canonical_name: impl Into<String>) -> Self {
        Self {
            canonical_name: canonical_name.into(),
            site_index: None,
        }
    }

    pub fn with_index(mut self, site_index: impl Into<String>) -> Self {
        self.site_index = Some(site_index.into());
        self
    }
}

/// Fetches site metadata on a cache miss.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch(&self, raw_site: &str) -> Result<SiteMetadata, MetadataError>;
}

/// Metadata source querying the metadata API through the relay.
///
/// The relay attaches the user's session, which the API requires.
pub struct RelayMetadataSource {
    relay: Arc<dyn Relay>,
    endpoint: MetadataEndpoint,
}

impl RelayMetadataSource {
    pub fn new(relay: Arc<dyn Relay>, endpoint: MetadataEndpoint) -> Self {
        Self { relay, endpoint }
    }
}

#[async_trait]
impl MetadataSource for RelayMetadataSource {
    async fn fetch(&self, raw_site: &str) -> Result<SiteMetadata, MetadataError> {
        let url = self.endpoint.url_for(raw_site);
        let body = fetch_text(self.relay.as_ref(), &url).await?;
        parse_metadata(&body, &self.endpoint)
    }
}

/// Reads a scalar at `pointer` as a string.
fn scalar_at(value: &Value, pointer: &str) -> Option<String> {
    match value.pointer(pointer)? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
    .filter(|s| !s.is_empty())
}

/// Parses and validates a metadata payload.
pub fn parse_metadata(body: &str, endpoint: &MetadataEndpoint) -> Result<SiteMetadata, MetadataError> {
    let value: Value = serde_json::from_str(body)?;

    let canonical_name =
        scalar_at(&value, &endpoint.name_pointer).ok_or(MetadataError::MissingField("site name"))?;

    Ok(SiteMetadata {
        canonical_name,
        site_index: scalar_at(&value, &endpoint.index_pointer),
    })
}

/// Memoized site metadata keyed by raw site identifier.
pub struct SiteMetadataCache {
    source: Arc<dyn MetadataSource>,
    entries: RwLock<HashMap<String, SiteMetadata>>,
}

impl std::fmt::Debug for SiteMetadataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteMetadataCache")
            .field("entries", &self.entries.read().len())
            .finish()
    }
}

impl SiteMetadataCache {
    pub fn new(source: Arc<dyn MetadataSource>) -> Self {
        Self {
            source,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns metadata for `raw_site`, fetching on a miss.
    pub async fn get(&self, raw_site: &str) -> Option<SiteMetadata> {
        if let Some(hit) = self.entries.read().get(raw_site) {
            return Some(hit.clone());
        }

        match self.source.fetch(raw_site).await {
            Ok(metadata) => {
                debug!(raw_site, name = %metadata.canonical_name, "cached site metadata");
                self.entries
                    .write()
                    .insert(raw_site.to_string(), metadata.clone());
                Some(metadata)
            }
            Err(e) => {
                warn!(raw_site, "site metadata lookup failed: {}", e);
                None
            }
        }
    }

    /// Cached entry without fetching.
    pub fn peek(&self, raw_site: &str) -> Option<SiteMetadata> {
        self.entries.read().get(raw_site).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
