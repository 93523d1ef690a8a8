//! Resolves one candidate to its direct-access token.

use std::sync::Arc;

use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use crate::candidate::{parse_result_link, LinkCandidate};
use crate::config::SearchEndpoint;
use crate::error::ResolveError;
use crate::relay::{fetch_text, Relay};

/// Looks candidates up on the search backend through the relay.
#[derive(Clone)]
pub struct LinkResolver {
    relay: Arc<dyn Relay>,
}

impl LinkResolver {
    pub fn new(relay: Arc<dyn Relay>) -> Self {
        Self { relay }
    }

    /// Returns the `art` token for `candidate`, or `None`.
    ///
    /// Every failure, from transport to parsing, ends up as `None`.
    pub async fn resolve(
        &self,
        candidate: &LinkCandidate,
        site_name: &str,
        endpoint: &SearchEndpoint,
    ) -> Option<String> {
        match self.try_resolve(candidate, site_name, endpoint).await {
            Ok(Some(art)) => {
                debug!(href = %candidate.href, "resolved link");
                Some(art)
            }
            Ok(None) => {
                debug!(href = %candidate.href, title = %candidate.title, "no matching search result");
                None
            }
            Err(e) => {
                debug!(href = %candidate.href, "resolution failed: {}", e);
                None
            }
        }
    }

    async fn try_resolve(
        &self,
        candidate: &LinkCandidate,
        site_name: &str,
        endpoint: &SearchEndpoint,
    ) -> Result<Option<String>, ResolveError> {
        let post_id = candidate
            .post_id
            .as_deref()
            .ok_or(ResolveError::IncompleteCandidate("post id"))?;

        let lookup = endpoint.lookup_url(&candidate.title)?;
        let body = fetch_text(self.relay.as_ref(), lookup.as_str()).await?;

        find_art(
            &body,
            &lookup,
            &endpoint.result_selector,
            site_name,
            post_id,
        )
    }
}

/// Scans a search result page for the first result pointing at
/// `/{site_name}/{post_id}` and returns its `art` parameter.
///
/// Relative result links are resolved against `base`.
pub fn find_art(
    html: &str,
    base: &Url,
    result_selector: &str,
    site_name: &str,
    post_id: &str,
) -> Result<Option<String>, ResolveError> {
    let selector =
        Selector::parse(result_selector).map_err(|e| ResolveError::Selector(e.to_string()))?;
    let document = Html::parse_document(html);

    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Ok(link) = base.join(href) else {
            continue;
        };

        let (site, post, art) = parse_result_link(&link);
        if site.as_deref() == Some(site_name) && post.as_deref() == Some(post_id) {
            if let Some(art) = art {
                return Ok(Some(art));
            }
        }
    }

    Ok(None)
}
