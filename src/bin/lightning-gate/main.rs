//! lightning-gate CLI entry point.

mod cli;

use clap::Parser;
use cli::{Cli, Command};
use lightning_gate::{admin, AccessGate};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    let cli = Cli::parse();
    let config = cli.to_config()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    info!("lightning-gate v{}", env!("CARGO_PKG_VERSION"));

    let gate = AccessGate::from_config(&config)?;

    match cli.command {
        Command::Serve => {
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let reconciler = gate.reconciler(&config).spawn(shutdown_rx);

            info!("Gate running, waiting for shutdown signal");
            tokio::signal::ctrl_c().await?;
            info!("Ctrl-C received, initiating shutdown");

            let _ = shutdown_tx.send(true);
            reconciler.await?;
        }
        Command::Check { pubkey } => {
            let decision = gate.handle_gate_check(&pubkey).await;
            if decision.is_blocked() {
                println!("blocked: {}", decision.payload());
            } else {
                println!("allowed");
            }
        }
        Command::Invoice { pubkey } => {
            let invoice = gate.create_invoice(&pubkey).await?;
            println!("{}", serde_json::to_string_pretty(&invoice)?);
        }
        Command::Verify {
            payment_hash,
            pubkey,
        } => {
            let verification = gate.verify_payment(&payment_hash, &pubkey).await?;
            println!("{}", serde_json::to_string_pretty(&verification)?);
        }
        Command::Stats => {
            println!("{}", serde_json::to_string_pretty(&admin::stats(&gate))?);
        }
    }

    Ok(())
}
