//! Per form factor scan pipelines.
//!
//! Desktop pages embed the site identity in inline scripts. Mobile pages do
//! not, so the mobile pipeline asks the metadata API (through the cache) and
//! then waits for the lazily rendered article list to show up.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::cache::{SiteMetadata, SiteMetadataCache};
use crate::candidate::{raw_site_from_url, site_index_from_scripts, site_name_from_scripts};
use crate::config::{EngineConfig, VariantConfig};
use crate::dom::{wait_for_anchor, Document, FormFactor, Readiness};

/// Result of locating the site a document belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteLookup {
    /// Identity found; anchors may be enumerated.
    Found(SiteMetadata),
    /// No usable identity; nothing to resolve.
    Missing,
    /// A bounded wait expired.
    TimedOut,
}

/// One scan pipeline.
#[async_trait]
pub trait ScanStrategy: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Selectors and endpoints this pipeline uses.
    fn variant(&self) -> &VariantConfig;

    /// Finds the site identity and waits until anchors can be enumerated.
    async fn locate(&self, doc: &dyn Document) -> SiteLookup;
}

/// Desktop pipeline: identity from inline script text.
pub struct DesktopStrategy {
    variant: VariantConfig,
}

impl DesktopStrategy {
    pub fn new(variant: VariantConfig) -> Self {
        Self { variant }
    }
}

#[async_trait]
impl ScanStrategy for DesktopStrategy {
    fn name(&self) -> &'static str {
        "desktop"
    }

    fn variant(&self) -> &VariantConfig {
        &self.variant
    }

    async fn locate(&self, doc: &dyn Document) -> SiteLookup {
        let scripts = doc.script_texts();
        match site_name_from_scripts(&scripts).filter(|name| !name.is_empty()) {
            Some(name) => {
                let mut metadata = SiteMetadata::named(name);
                metadata.site_index = site_index_from_scripts(&scripts);
                SiteLookup::Found(metadata)
            }
            None => {
                debug!(doc = %doc.id(), "no site name in page scripts");
                SiteLookup::Missing
            }
        }
    }
}

/// Mobile pipeline: identity from the metadata API, then wait for anchors.
pub struct MobileStrategy {
    variant: VariantConfig,
    metadata: Arc<SiteMetadataCache>,
    anchor_timeout: Duration,
}

impl MobileStrategy {
    pub fn new(
        variant: VariantConfig,
        metadata: Arc<SiteMetadataCache>,
        anchor_timeout: Duration,
    ) -> Self {
        Self {
            variant,
            metadata,
            anchor_timeout,
        }
    }
}

#[async_trait]
impl ScanStrategy for MobileStrategy {
    fn name(&self) -> &'static str {
        "mobile"
    }

    fn variant(&self) -> &VariantConfig {
        &self.variant
    }

    async fn locate(&self, doc: &dyn Document) -> SiteLookup {
        let Some(raw_site) = raw_site_from_url(&doc.url()) else {
            debug!(doc = %doc.id(), "no site identifier in url");
            return SiteLookup::Missing;
        };

        let Some(metadata) = self.metadata.get(&raw_site).await else {
            return SiteLookup::Missing;
        };

        match wait_for_anchor(doc, &self.variant.anchor_selector, self.anchor_timeout).await {
            Readiness::Ready => SiteLookup::Found(metadata),
            Readiness::TimedOut => SiteLookup::TimedOut,
        }
    }
}

/// Builds the pipeline for a form factor.
pub fn strategy_for(
    form_factor: FormFactor,
    config: &EngineConfig,
    metadata: Arc<SiteMetadataCache>,
) -> Arc<dyn ScanStrategy> {
    match form_factor {
        FormFactor::Desktop => Arc::new(DesktopStrategy::new(config.desktop.clone())),
        FormFactor::Mobile => Arc::new(MobileStrategy::new(
            config.mobile.clone(),
            metadata,
            config.anchor_wait_timeout(),
        )),
    }
}
