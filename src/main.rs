use color_eyre::{eyre::WrapErr, Result};
use otc_relayer::{
    create_relay_router, logging::setup_logging, Network, RelayConfig, RelayScheduler,
    RelayerIdentity,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install().wrap_err("Failed to initialize error reporting")?;
    dotenvy::dotenv().ok();
    setup_logging();

    let config = RelayConfig::from_env().wrap_err("Invalid relayer configuration")?;
    info!(?config, "starting relayer");

    let identity = RelayerIdentity::connect(&config)
        .await
        .wrap_err("Failed to set up relayer identity")?;
    if config.register_relayer {
        identity
            .register_relayer()
            .await
            .wrap_err("Failed to register relayer on the receiver contract")?;
    }

    let chain_id = identity.chain_id();
    let network: Arc<dyn Network> = Arc::new(identity);
    let scheduler = Arc::new(RelayScheduler::from_config(&config, chain_id, network));
    let flush_task = scheduler.spawn();

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
        .await
        .wrap_err_with(|| format!("Failed to bind {}:{}", config.host, config.port))?;
    info!(
        "Relayer service is running on http://{}:{}",
        config.host, config.port
    );

    axum::serve(listener, create_relay_router(scheduler))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("Server runtime error")?;

    flush_task.shutdown().await;
    info!("relayer stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
