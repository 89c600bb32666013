use clap::Parser;
use dotenv::dotenv;
use std::sync::Arc;
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use gridpulse::alerting::thresholds::AlertThresholds;
use gridpulse::server::broadcaster::SnapshotBroadcaster;
use gridpulse::server::config::ServerConfig;
use gridpulse::server::registry::SubscriptionRegistry;
use gridpulse::server::scheduler::{TickPipeline, TickScheduler};
use gridpulse::server::sites::SiteDirectory;
use gridpulse::store::{InMemoryMetricsStore, MetricsStore};
use gridpulse::version::VERSION;
use gridpulse::web::create_axum_router;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,
}

fn init_logging() {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily("logs", "server.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    // Log to stdout: human-readable format
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Manually check for --version before full parsing to keep the simple output.
    if std::env::args().any(|arg| arg == "--version") {
        println!("Server version: {VERSION}");
        return Ok(());
    }

    let args = Args::parse();

    init_logging();
    info!("Starting server, version: {}", VERSION);
    dotenv().ok();

    let config = match ServerConfig::load(args.config.as_deref()) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("Failed to load server configuration: {}", e);
            return Err(e.into());
        }
    };

    // --- Pipeline wiring ---
    let store: Arc<dyn MetricsStore> = Arc::new(InMemoryMetricsStore::new());
    let sites = Arc::new(SiteDirectory::new(config.sites.clone()));
    let registry = Arc::new(SubscriptionRegistry::new(
        Arc::clone(&store),
        config.send_timeout(),
    ));
    let broadcaster = Arc::new(SnapshotBroadcaster::new(Arc::clone(&registry)));

    let thresholds: AlertThresholds = config.thresholds.clone();
    let pipeline = Arc::new(TickPipeline::new(
        Arc::clone(&sites),
        Arc::clone(&store),
        broadcaster,
        thresholds,
    ));
    let scheduler = Arc::new(TickScheduler::new(pipeline, config.tick_interval()));
    scheduler.start();

    // --- Axum HTTP server ---
    let router = create_axum_router(
        Arc::clone(&registry),
        Arc::clone(&sites),
        Arc::clone(&config),
    );

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(address = %config.listen_addr, "HTTP and WebSocket server listening.");

    let shutdown_scheduler = Arc::clone(&scheduler);
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal.");
            }
            info!("Shutdown signal received; stopping scheduler.");
            shutdown_scheduler.stop().await;
        })
        .await
        .map_err(Box::new)?;

    info!("Server stopped.");
    Ok(())
}
