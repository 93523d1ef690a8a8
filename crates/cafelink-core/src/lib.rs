//! Cafelink Core - link observation and resolution engine.
//!
//! Forum pages wrap article links in tracking redirects. This crate watches a
//! live page, finds the wrapped links, looks each one up once through a
//! privileged relay, and rewrites it in place to a direct article link.
//!
//! ## Architecture
//!
//! ```text
//! StatusController ── set_status ──► DomWatcher ── debounced ──► RewriteEngine
//!        │                              │                          │
//!        ▼                              ▼                          ▼
//!    StatusCell                 main / frame observers      ScanStrategy
//!   (icon updates)             (mutation subscriptions)     LinkResolver ──► Relay
//!                                                          SiteMetadataCache
//! ```
//!
//! The page itself is reached only through the [`dom`] ports. A browser
//! bridge, the static [`snapshot`] host, or a test double implements them.
//!
//! ## Guarantees
//!
//! - A href is resolved at most once per document epoch, even across
//!   overlapping rescans.
//! - Rescans are idempotent: rewritten links no longer look like candidates.
//! - Nothing is fatal. Failures are logged and leave a link unrewritten.

pub mod cache;
pub mod candidate;
pub mod config;
pub mod controller;
pub mod debounce;
pub mod dom;
pub mod error;
pub mod icon;
pub mod relay;
pub mod resolver;
pub mod rewrite;
pub mod snapshot;
pub mod status;
pub mod strategy;
pub mod watcher;

#[cfg(test)]
mod testing;

pub use cache::{
    MetadataSource, RelayMetadataSource, ScanScope, ScopeRegistry, SiteMetadata,
    SiteMetadataCache,
};
pub use candidate::LinkCandidate;
pub use config::{EngineConfig, ExtractionScheme, MetadataEndpoint, SearchEndpoint, VariantConfig};
pub use controller::{StatusController, StatusSource};
pub use debounce::Debouncer;
pub use dom::{
    Anchor, ClickAction, Document, DocumentId, FormFactor, Frame, MutationBatch, NavigationEvent,
    Page, ReadyState, Readiness,
};
pub use error::{MetadataError, ObserveError, RelayError, ResolveError};
pub use icon::{IconPath, IconSet, ICON_SIZES};
pub use relay::{
    fetch_text, HttpRelayClient, Relay, RelayIconSink, RelayRequest, RelayResponse, StatusReply,
};
pub use resolver::LinkResolver;
pub use rewrite::{RescanOutcome, RescanStats, RewriteEngine};
pub use snapshot::{LinkRewrite, SnapshotDocument, SnapshotPage};
pub use status::{IconSink, InvalidStatus, NoopIcon, StatusCell, Transition, TriState};
pub use strategy::{DesktopStrategy, MobileStrategy, ScanStrategy, SiteLookup};
pub use watcher::{DomWatcher, ObserverHandle};

/// Default port of the relay server.
pub const DEFAULT_RELAY_PORT: u16 = 48766;
