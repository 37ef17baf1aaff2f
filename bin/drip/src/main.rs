mod cli;
mod config_loader;

use anyhow::Context;
use clap::Parser;
use drip_common::types::Address;
use drip_common::utils::logging::init_logging;
use drip_faucet::{router, FaucetService};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Parse CLI
    let args = cli::Cli::parse();

    if let Some(cli::Commands::InitConfig { out }) = &args.command {
        config_loader::write_default_config(out)?;
        println!("Default configuration written to {}", out.display());
        return Ok(());
    }

    // 2. Load Config
    let mut config = config_loader::load_service_config(args.config.as_deref(), args.data_dir)?;
    if args.debug {
        config.logging.level = "debug".to_string();
    }

    // 3. Setup Logging
    init_logging(&config.logging)?;
    if let Some(path) = &args.config {
        info!("Loaded config from {:?}", path);
    }

    // 4. Open state and bring the components up
    let service = Arc::new(FaucetService::open(config.clone()).await?);

    match args.command {
        Some(cli::Commands::Status { address }) => print_status(&service, &address).await?,
        _ => serve(service.clone(), &config.server_addr).await?,
    }

    service.shutdown().await?;
    Ok(())
}

async fn print_status(service: &FaucetService, address: &str) -> anyhow::Result<()> {
    let address: Address = address.parse().context("Invalid address")?;
    let report = serde_json::json!({
        "addresses": service.addresses(),
        "balance": service.balance(&address).await,
        "claim": service.claim_status(&address).await,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn serve(service: Arc<FaucetService>, server_addr: &str) -> anyhow::Result<()> {
    let policy = service.config().policy()?;
    info!("Configuration:");
    info!("  Server address: {}", server_addr);
    info!("  State store: {}", service.config().db_path);
    info!("  Claim amount: {} (cap {})", policy.claim_amount, policy.max_lifetime_claim);
    info!("  Cooldown: {}s", policy.cooldown_secs);
    info!("  Rate limit: {} requests / hour / IP", service.config().max_requests_per_hour);

    let app = router(service);

    let addr: SocketAddr = server_addr.parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down gracefully");
    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
