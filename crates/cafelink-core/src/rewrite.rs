//! Rescans a document and rewrites resolved links in place.
//!
//! A rescan is safe to run at any time and any number of times. Links already
//! claimed in the document's current epoch are skipped, and links that were
//! rewritten no longer look like candidates, so repeated rescans of an
//! unchanged document issue no lookups.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::cache::{ScanScope, ScopeRegistry, SiteMetadata, SiteMetadataCache};
use crate::candidate::LinkCandidate;
use crate::config::{EngineConfig, VariantConfig};
use crate::dom::{wait_until_ready, Anchor, ClickAction, Document, FormFactor, Readiness};
use crate::resolver::LinkResolver;
use crate::status::StatusCell;
use crate::strategy::{strategy_for, ScanStrategy, SiteLookup};

/// Counts from one completed rescan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RescanStats {
    /// Anchors matching the candidate selector.
    pub anchors: usize,
    /// Candidates sent to the resolver.
    pub dispatched: usize,
    /// Anchors rewritten.
    pub rewritten: usize,
    /// Resolutions dropped because the epoch moved on.
    pub stale: usize,
}

/// How a rescan ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescanOutcome {
    /// The system is disabled.
    Disabled,
    /// The document never finished loading.
    NotReady,
    /// The site identity could not be determined.
    NoSite,
    /// Anchors did not appear in time.
    TimedOut,
    /// The document's scope was reset while the rescan was waiting.
    Superseded,
    /// Every dispatched resolution settled.
    Completed(RescanStats),
}

impl RescanOutcome {
    /// Stats for a completed rescan.
    pub fn stats(&self) -> Option<RescanStats> {
        match self {
            Self::Completed(stats) => Some(*stats),
            _ => None,
        }
    }
}

enum LinkOutcome {
    Rewritten,
    Unresolved,
    Stale,
}

/// Enumerates, resolves, and rewrites candidate links.
pub struct RewriteEngine {
    config: EngineConfig,
    status: Arc<StatusCell>,
    scopes: Arc<ScopeRegistry>,
    resolver: LinkResolver,
    strategy: Arc<dyn ScanStrategy>,
}

impl RewriteEngine {
    pub fn new(
        config: EngineConfig,
        form_factor: FormFactor,
        status: Arc<StatusCell>,
        scopes: Arc<ScopeRegistry>,
        resolver: LinkResolver,
        metadata: Arc<SiteMetadataCache>,
    ) -> Self {
        let strategy = strategy_for(form_factor, &config, metadata);
        Self {
            config,
            status,
            scopes,
            resolver,
            strategy,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn scopes(&self) -> &Arc<ScopeRegistry> {
        &self.scopes
    }

    /// Selector for candidate anchors in the active pipeline.
    pub fn anchor_selector(&self) -> &str {
        &self.strategy.variant().anchor_selector
    }

    /// Scans `doc` once.
    pub async fn rescan(&self, doc: Arc<dyn Document>) -> RescanOutcome {
        let Some(_running) = self.status.begin_scan() else {
            return RescanOutcome::Disabled;
        };
        let scope = self.scopes.scope(doc.id());
        let epoch = scope.epoch();

        if wait_until_ready(doc.as_ref(), self.config.ready_timeout()).await == Readiness::TimedOut
        {
            warn!(doc = %doc.id(), "document not ready, skipping rescan");
            return RescanOutcome::NotReady;
        }
        if let Some(outcome) = self.interrupted(&scope, epoch) {
            return outcome;
        }

        let site = match self.strategy.locate(doc.as_ref()).await {
            SiteLookup::Found(site) => site,
            SiteLookup::Missing => return RescanOutcome::NoSite,
            SiteLookup::TimedOut => {
                info!(doc = %doc.id(), strategy = self.strategy.name(), "anchors did not appear in time");
                return RescanOutcome::TimedOut;
            }
        };
        if let Some(outcome) = self.interrupted(&scope, epoch) {
            return outcome;
        }

        let variant = self.strategy.variant();
        let anchors = doc.query_anchors(&variant.anchor_selector);
        let mut stats = RescanStats {
            anchors: anchors.len(),
            ..RescanStats::default()
        };
        if anchors.is_empty() {
            return RescanOutcome::Completed(stats);
        }

        let limiter = self.config.max_concurrent_resolutions.map(Semaphore::new);

        let mut pending = Vec::new();
        for anchor in anchors {
            let href = anchor.href();
            if !scope.claim_in(&href, epoch) {
                continue;
            }

            let candidate = LinkCandidate::from_anchor(anchor.as_ref(), self.config.extraction);
            if !candidate.is_resolvable() {
                continue;
            }
            if !belongs_to(&candidate, &site) {
                debug!(href = %href, "link belongs to another site");
                continue;
            }

            pending.push(self.resolve_and_rewrite(
                anchor,
                candidate,
                &site,
                variant,
                &scope,
                epoch,
                limiter.as_ref(),
            ));
        }

        stats.dispatched = pending.len();
        for outcome in join_all(pending).await {
            match outcome {
                LinkOutcome::Rewritten => stats.rewritten += 1,
                LinkOutcome::Stale => stats.stale += 1,
                LinkOutcome::Unresolved => {}
            }
        }

        if stats.dispatched > 0 {
            info!(
                doc = %doc.id(),
                dispatched = stats.dispatched,
                rewritten = stats.rewritten,
                "rescan complete"
            );
        }
        RescanOutcome::Completed(stats)
    }

    /// Checks whether a disable or scope reset landed during a wait.
    fn interrupted(&self, scope: &ScanScope, epoch: u64) -> Option<RescanOutcome> {
        if !self.status.is_enabled() {
            Some(RescanOutcome::Disabled)
        } else if !scope.is_current(epoch) {
            Some(RescanOutcome::Superseded)
        } else {
            None
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn resolve_and_rewrite(
        &self,
        anchor: Arc<dyn Anchor>,
        candidate: LinkCandidate,
        site: &SiteMetadata,
        variant: &VariantConfig,
        scope: &ScanScope,
        epoch: u64,
        limiter: Option<&Semaphore>,
    ) -> LinkOutcome {
        let _permit = match limiter {
            Some(limiter) => limiter.acquire().await.ok(),
            None => None,
        };

        let Some(art) = self
            .resolver
            .resolve(&candidate, &site.canonical_name, &variant.search)
            .await
        else {
            return LinkOutcome::Unresolved;
        };

        if !scope.is_current(epoch) || !self.status.is_enabled() {
            debug!(href = %candidate.href, "dropping stale resolution");
            return LinkOutcome::Stale;
        }

        let Some(post_id) = candidate.post_id.as_deref() else {
            return LinkOutcome::Unresolved;
        };
        let target = variant.article_url(&site.canonical_name, post_id, &art);
        anchor.set_href(&target);
        anchor.intercept_clicks(ClickAction::NavigateTo(target));
        LinkOutcome::Rewritten
    }
}

/// A link whose site id disagrees with the page's known index is foreign.
fn belongs_to(candidate: &LinkCandidate, site: &SiteMetadata) -> bool {
    match (&candidate.site_id, &site.site_index) {
        (Some(id), Some(index)) => id == index,
        _ => true,
    }
}
