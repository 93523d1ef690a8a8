//! Cafelink - rewrites tracking-wrapped forum links into direct article links.

use cafelink_app::cli::Args;
use cafelink_app::logging::init_logging;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Keep the guard alive for the duration of the program.
    let _log_guard = init_logging(args.debug, &args.log_level);
    tracing::debug!("Args: {:?}", args);

    cafelink_app::run(args).await
}
