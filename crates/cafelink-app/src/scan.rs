//! One-shot headless rewrite of a single page.

use std::sync::Arc;

use anyhow::Context;
use cafelink_core::{
    fetch_text, EngineConfig, FormFactor, LinkRewrite, NoopIcon, Relay, SnapshotPage,
    StatusController, TriState,
};
use serde::Serialize;
use tracing::info;

/// What a scan produced.
#[derive(Debug, Serialize)]
pub struct ScanReport {
    pub url: String,
    pub rewrites: Vec<LinkRewrite>,
    #[serde(skip)]
    pub html: String,
}

/// Fetches `url` through `relay`, rewrites it once, and reports the result.
pub async fn scan(
    relay: Arc<dyn Relay>,
    url: &str,
    form_factor: FormFactor,
    config: EngineConfig,
) -> anyhow::Result<ScanReport> {
    let html = fetch_text(relay.as_ref(), url)
        .await
        .with_context(|| format!("fetching {url}"))?;

    let page = Arc::new(SnapshotPage::parse(url, &html, form_factor));
    let controller = StatusController::new(page.clone(), relay, Arc::new(NoopIcon), config);

    controller.set_status(TriState::Enabled).await;
    controller.shutdown().await;

    let document = page.document();
    let rewrites = document.rewrites();
    let html = document.render().context("rendering rewritten html")?;
    info!(url, rewritten = rewrites.len(), "scan complete");

    Ok(ScanReport {
        url: url.to_string(),
        rewrites,
        html,
    })
}
