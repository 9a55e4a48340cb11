use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use carepoint_server::{create_app, CarePointServer};

/// CarePoint Platform HTTP Server
#[derive(Parser, Debug)]
#[command(name = "carepoint-server")]
#[command(about = "Clinic practice-management platform HTTP API server")]
struct Args {
    /// Server bind address
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Server port
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // All log lines pass through the PHI redactor.
    logger_redacted::init_tracing("carepoint_server", args.verbose);

    info!("Starting CarePoint Platform HTTP Server");
    info!(version = env!("CARGO_PKG_VERSION"), "build");

    let server = CarePointServer::new(&args.database_url)
        .await
        .context("failed to initialize server")?;

    database_layer::run_migrations(server.database.pool())
        .await
        .context("failed to apply database migrations")?;

    let app = create_app(server);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .context("invalid bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    info!("CarePoint server running on http://{}", addr);
    info!("Health check available at http://{}/health", addr);
    info!("Billing API available at http://{}/api/v1/billing", addr);
    info!("API docs available at http://{}/docs", addr);

    axum::serve(listener, app)
        .await
        .context("HTTP server error")?;

    Ok(())
}
