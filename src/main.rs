//! Line-Oriented TCP Chat Relay - Entry Point
//!
//! Parses configuration, binds the listener and runs the accept loop
//! until Ctrl-C.

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use relay_chat::{Args, Server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=relay_chat=trace
    let default_filter = if args.debug {
        "relay_chat=debug"
    } else {
        "relay_chat=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let config = args.into_config()?;
    let generated_key = config.key.is_none();

    // Bind failure is fatal
    let server = Server::bind(config).await?;
    info!("Chat server listening on {}", server.local_addr()?);

    if generated_key {
        info!(
            "No key configured; clients must use generated key {}",
            server.key().to_base64()
        );
    }

    tokio::select! {
        _ = server.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
        }
    }

    Ok(())
}
