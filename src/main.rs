/// Steeple - community engagement backend
///
/// Serves the moderation, notification and search endpoints of a church
/// community app and runs the scheduled reminder jobs.
use std::sync::Arc;
use steeple::{config::ServerConfig, jobs::JobScheduler, server, AppContext, SteepleResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> SteepleResult<()> {
    // Load configuration
    let config = ServerConfig::from_env()?;

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("steeple={},tower_http=debug", config.logging.level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting Steeple v{}", env!("CARGO_PKG_VERSION"));

    // Create application context
    let ctx = Arc::new(AppContext::new(config).await?);

    // Start background jobs
    let scheduler = Arc::new(JobScheduler::new(Arc::clone(&ctx)));
    scheduler.start();

    // Start server
    server::serve((*ctx).clone()).await?;

    Ok(())
}
