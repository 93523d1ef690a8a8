//! Error types for the link engine.
//!
//! Most of these never escape the engine: the resolver and the metadata cache
//! normalize them to "no result" and log them. They exist so the boundaries
//! that do the normalizing can say what went wrong.

use thiserror::Error;

/// Errors talking to the privileged relay.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The relay could not be reached or the transport failed.
    #[error("relay transport error: {0}")]
    Transport(String),

    /// The relay answered with an explicit error.
    #[error("relay reported error: {0}")]
    Remote(String),

    /// The relay answered without a payload.
    #[error("relay returned no data")]
    EmptyResponse,

    /// The relay response could not be decoded.
    #[error("invalid relay response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Errors while resolving a single candidate link.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Fetching the search results failed.
    #[error(transparent)]
    Relay(#[from] RelayError),

    /// The lookup URL could not be built.
    #[error("invalid lookup url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The result selector did not parse.
    #[error("invalid result selector: {0}")]
    Selector(String),

    /// The candidate lacks the fields needed for a lookup.
    #[error("candidate is missing {0}")]
    IncompleteCandidate(&'static str),
}

/// Errors while fetching site metadata.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// Fetching the metadata document failed.
    #[error(transparent)]
    Relay(#[from] RelayError),

    /// The payload was not valid JSON.
    #[error("malformed metadata payload: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload did not contain a usable identity.
    #[error("metadata payload has no {0}")]
    MissingField(&'static str),
}

/// Errors observing a document or frame.
#[derive(Debug, Clone, Error)]
pub enum ObserveError {
    /// The frame document belongs to another origin.
    #[error("frame document is cross-origin")]
    CrossOrigin,

    /// The frame has no content document yet.
    #[error("frame content document not available")]
    NotAvailable,

    /// The document refused a mutation subscription.
    #[error("cannot observe document: {0}")]
    Subscribe(String),
}
