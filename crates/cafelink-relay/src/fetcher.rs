//! Outbound fetches on behalf of agents.

use std::time::Duration;

use async_trait::async_trait;
use cafelink_core::config::is_search_url;
use reqwest::header::{CONTENT_TYPE, COOKIE};
use thiserror::Error;
use tracing::debug;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors fetching a page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Fetches a URL and returns the body as text.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Content type announced for a request to `url`.
///
/// Search pages are HTML; everything else the agent asks for is a JSON API.
pub fn content_type_for(url: &str) -> &'static str {
    if is_search_url(url) {
        "text/html"
    } else {
        "application/json"
    }
}

/// Whether a request to `url` carries the session cookie.
///
/// Search is public. Site APIs need the signed-in session.
pub fn sends_credentials(url: &str) -> bool {
    !is_search_url(url)
}

/// reqwest-backed fetcher.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    session_cookie: Option<String>,
}

impl HttpFetcher {
    pub fn new(session_cookie: Option<String>) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?;
        Ok(Self {
            client,
            session_cookie,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let parsed = url::Url::parse(url)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::UnsupportedScheme(parsed.scheme().to_string()));
        }

        let mut request = self
            .client
            .get(parsed)
            .header(CONTENT_TYPE, content_type_for(url));

        if sends_credentials(url) {
            if let Some(cookie) = &self.session_cookie {
                request = request.header(COOKIE, cookie.as_str());
            }
        }

        let response = request.send().await?.error_for_status()?;
        let body = response.text().await?;
        debug!(url, bytes = body.len(), "fetched");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_pages_are_html() {
        assert_eq!(
            content_type_for("https://search.naver.com/search.naver?query=x"),
            "text/html"
        );
        assert_eq!(
            content_type_for("https://apis.naver.com/cafe-web/cafe2/CafeGateInfo.json"),
            "application/json"
        );
    }

    #[test]
    fn credentials_only_off_search() {
        assert!(!sends_credentials("https://search.naver.com/search.naver"));
        assert!(sends_credentials("https://apis.naver.com/cafe-web/x.json"));
    }

    #[tokio::test]
    async fn rejects_non_http_schemes() {
        let fetcher = HttpFetcher::new(None).unwrap();
        let result = fetcher.fetch("file:///etc/passwd").await;
        assert!(matches!(result, Err(FetchError::UnsupportedScheme(s)) if s == "file"));
    }

    #[tokio::test]
    async fn rejects_malformed_urls() {
        let fetcher = HttpFetcher::new(None).unwrap();
        assert!(matches!(
            fetcher.fetch("not a url").await,
            Err(FetchError::InvalidUrl(_))
        ));
    }
}
