//! Command-line arguments.

use std::path::PathBuf;

use cafelink_core::DEFAULT_RELAY_PORT;
use clap::{Parser, Subcommand};

/// Cafelink - rewrites tracking-wrapped forum links into direct article links
#[derive(Parser, Debug)]
#[command(name = "cafelink", version, about)]
pub struct Args {
    /// Engine configuration file (JSON)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the relay server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = cafelink_relay::DEFAULT_HOST)]
        host: String,

        /// Port to bind to
        #[arg(long, default_value_t = DEFAULT_RELAY_PORT)]
        port: u16,

        /// Database path (defaults to the app data directory)
        #[arg(long)]
        db: Option<PathBuf>,

        /// Cookie header sent with credentialed fetches
        #[arg(long)]
        cookie: Option<String>,
    },

    /// Turn link rewriting on
    Enable {
        #[command(flatten)]
        relay: RelayArgs,
    },

    /// Turn link rewriting off
    Disable {
        #[command(flatten)]
        relay: RelayArgs,
    },

    /// Show the persisted status
    Status {
        #[command(flatten)]
        relay: RelayArgs,
    },

    /// Rewrite the links of one page and print the result
    Scan {
        /// Page URL
        url: String,

        /// Use the mobile pipeline
        #[arg(long)]
        mobile: bool,

        /// Print the rewritten HTML instead of the link list
        #[arg(long)]
        html: bool,

        /// Fetch through a running relay instead of in-process
        #[arg(long)]
        relay: Option<String>,

        /// Cookie header for in-process credentialed fetches
        #[arg(long)]
        cookie: Option<String>,
    },
}

/// Where a running relay listens.
#[derive(clap::Args, Debug)]
pub struct RelayArgs {
    /// Relay base URL
    #[arg(long = "relay", default_value_t = default_relay_url())]
    pub url: String,
}

pub fn default_relay_url() -> String {
    format!("http://127.0.0.1:{}", DEFAULT_RELAY_PORT)
}
