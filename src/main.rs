/// Tollgate server binary
use tollgate::{config::ServerConfig, context::AppContext, error::AuthResult, server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> AuthResult<()> {
    let config = ServerConfig::from_env()?;
    config.validate()?;

    // Initialize logging
    let filter = config.log_filter();
    if config.logging.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!("Tollgate v{} starting", env!("CARGO_PKG_VERSION"));

    let ctx = AppContext::new(config).await?;

    tokio::select! {
        result = server::serve(ctx) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
