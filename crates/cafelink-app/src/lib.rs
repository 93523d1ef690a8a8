//! Cafelink - command-line entry point.
//!
//! - `serve` runs the relay server over the persisted status store
//! - `enable` / `disable` / `status` control a running relay
//! - `scan` rewrites the links of one page headlessly

pub mod cli;
pub mod logging;
pub mod scan;

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use cafelink_core::{
    EngineConfig, FormFactor, HttpRelayClient, Relay, RelayRequest, TriState,
};
use cafelink_relay::{HttpFetcher, RelayServer, RelayServerConfig, RelayService};
use cafelink_storage::StatusStore;
use tracing::info;

use crate::cli::{Args, Command};

/// Reads an engine configuration file, or returns the defaults.
pub fn load_engine_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    EngineConfig::from_json(&text).with_context(|| format!("parsing config {}", path.display()))
}

/// Runs one command to completion.
pub async fn run(args: Args) -> anyhow::Result<()> {
    match args.command {
        Command::Serve {
            host,
            port,
            db,
            cookie,
        } => {
            let db = match db {
                Some(path) => path,
                None => StatusStore::default_db_path()?,
            };
            let mut config = RelayServerConfig::with_db_path(db.to_string_lossy())
                .with_host(host)
                .with_port(port);
            if let Some(cookie) = cookie {
                config = config.with_session_cookie(cookie);
            }

            let server = RelayServer::new(config)?;
            info!(icon = %server.service().icon().status, "relay ready");
            server.run_until(shutdown_signal()).await?;
        }
        Command::Enable { relay } => set_status(&relay.url, TriState::Enabled).await?,
        Command::Disable { relay } => set_status(&relay.url, TriState::Disabled).await?,
        Command::Status { relay } => {
            let client = HttpRelayClient::new(&relay.url)?;
            let status = client
                .status()
                .await
                .with_context(|| format!("reading status from {}", relay.url))?;
            println!("{}", status);
        }
        Command::Scan {
            url,
            mobile,
            html,
            relay,
            cookie,
        } => {
            let config = load_engine_config(args.config.as_deref())?;
            let relay: Arc<dyn Relay> = match relay {
                Some(base) => Arc::new(HttpRelayClient::new(&base)?),
                None => Arc::new(RelayService::new(
                    StatusStore::in_memory()?,
                    Arc::new(HttpFetcher::new(cookie)?),
                )?),
            };
            let form_factor = if mobile {
                FormFactor::Mobile
            } else {
                FormFactor::Desktop
            };

            let report = scan::scan(relay, &url, form_factor, config).await?;
            if html {
                print!("{}", report.html);
            } else if report.rewrites.is_empty() {
                eprintln!("no links rewritten");
            } else {
                for rewrite in &report.rewrites {
                    println!("{} -> {}", rewrite.original, rewrite.target);
                }
            }
        }
    }

    Ok(())
}

/// Persists `status` through the relay at `base_url`.
async fn set_status(base_url: &str, status: TriState) -> anyhow::Result<()> {
    let client = HttpRelayClient::new(base_url)?;
    let reply = client
        .send(RelayRequest::UpdateStatus { enabled: status })
        .await
        .with_context(|| format!("contacting relay at {base_url}"))?;

    if let Some(error) = reply.error {
        bail!("relay refused status change: {error}");
    }
    println!("link rewriting {}", status);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("cannot listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
