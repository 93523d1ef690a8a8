//! Cafelink Relay - privileged fetch and status server.
//!
//! Agents running inside a page cannot fetch cross-origin or touch
//! persistent storage. The relay does both on their behalf.
//!
//! ## Endpoints
//!
//! - `POST /api/message` - `fetchUrl`, `updateStatus`, `updateIconStatus`
//! - `GET /api/status` - The persisted status
//! - `GET /api/icon` - Icon images for the current icon state
//! - `GET /api/history` - Recent status writes
//!
//! ## Example
//!
//! ```no_run
//! use cafelink_relay::{RelayServer, RelayServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = RelayServer::new(RelayServerConfig::default()).unwrap();
//!     server.run().await.unwrap();
//! }
//! ```

pub mod error;
pub mod fetcher;
mod handlers;
pub mod models;
pub mod service;
pub mod state;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use cafelink_core::DEFAULT_RELAY_PORT;
use cafelink_storage::StatusStore;
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub use error::{ApiError, Result};
pub use fetcher::{FetchError, HttpFetcher, PageFetcher};
pub use service::RelayService;
pub use state::AppState;

/// Default server host (localhost only).
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Relay server configuration.
#[derive(Debug, Clone)]
pub struct RelayServerConfig {
    /// Host to bind to (default: 127.0.0.1).
    pub host: String,
    /// Port to bind to (default: 48766).
    pub port: u16,
    /// Database path (None = in-memory).
    pub db_path: Option<String>,
    /// Cookie header sent with credentialed fetches.
    pub session_cookie: Option<String>,
}

impl Default for RelayServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_RELAY_PORT,
            db_path: None,
            session_cookie: None,
        }
    }
}

impl RelayServerConfig {
    /// Creates a config with a specific database path.
    pub fn with_db_path(path: impl Into<String>) -> Self {
        Self {
            db_path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Sets the host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the session cookie.
    pub fn with_session_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.session_cookie = Some(cookie.into());
        self
    }

    fn addr(&self) -> std::result::Result<SocketAddr, ServerError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ServerError::Runtime(format!("invalid address: {}", e)))
    }
}

/// Server error types.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("failed to bind to {0}: {1}")]
    BindError(SocketAddr, std::io::Error),

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] cafelink_storage::StorageError),

    /// The outbound HTTP client could not be built.
    #[error("fetcher error: {0}")]
    Fetcher(#[from] FetchError),

    /// Server runtime error.
    #[error("server error: {0}")]
    Runtime(String),
}

/// Builds the API router over `state`.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/message", post(handlers::post_message))
        .route("/api/status", get(handlers::get_status))
        .route("/api/icon", get(handlers::get_icon))
        .route("/api/history", get(handlers::get_history))
        .layer(cors)
        .with_state(state)
}

/// The relay HTTP server.
pub struct RelayServer {
    router: Router,
    addr: SocketAddr,
    service: Arc<RelayService>,
}

impl RelayServer {
    /// Opens the store, bootstraps it, and prepares the server.
    pub fn new(config: RelayServerConfig) -> std::result::Result<Self, ServerError> {
        let store = match config.db_path {
            Some(ref path) => StatusStore::with_path(path)?,
            None => StatusStore::in_memory()?,
        };
        let fetcher = HttpFetcher::new(config.session_cookie.clone())?;
        let service = RelayService::bootstrap(store, Arc::new(fetcher))?;

        Self::with_service(config, Arc::new(service))
    }

    /// Creates a server around an existing service.
    pub fn with_service(
        config: RelayServerConfig,
        service: Arc<RelayService>,
    ) -> std::result::Result<Self, ServerError> {
        let addr = config.addr()?;
        let router = router(AppState::new(Arc::clone(&service)));
        Ok(Self {
            router,
            addr,
            service,
        })
    }

    /// Returns the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The service behind the server, for agents in the same process.
    pub fn service(&self) -> &Arc<RelayService> {
        &self.service
    }

    /// Returns the router for testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Runs the server until it fails.
    pub async fn run(self) -> std::result::Result<(), ServerError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the server until `shutdown` resolves.
    pub async fn run_until<F>(self, shutdown: F) -> std::result::Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!("Starting Cafelink relay on {}", self.addr);

        let listener = bind(self.addr)?;
        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Runtime(e.to_string()))?;

        info!("Relay stopped");
        Ok(())
    }
}

/// Binds with SO_REUSEADDR so a restarted relay can take over the port.
fn bind(addr: SocketAddr) -> std::result::Result<tokio::net::TcpListener, ServerError> {
    let domain = if addr.is_ipv6() {
        Domain::IPV6
    } else {
        Domain::IPV4
    };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
        .map_err(|e| ServerError::BindError(addr, e))?;

    socket
        .set_reuse_address(true)
        .map_err(|e| ServerError::BindError(addr, e))?;
    socket
        .bind(&addr.into())
        .map_err(|e| ServerError::BindError(addr, e))?;
    socket
        .listen(128)
        .map_err(|e| ServerError::BindError(addr, e))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| ServerError::BindError(addr, e))?;

    let std_listener: std::net::TcpListener = socket.into();
    tokio::net::TcpListener::from_std(std_listener).map_err(|e| ServerError::BindError(addr, e))
}
