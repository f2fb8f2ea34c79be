use std::net::SocketAddr;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{error, info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod ops;
mod router;

use cli::Cli;
use shared_config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(jobs = ?cli.jobs, once = cli.once, "Starting key portal ops");

    let config = AppConfig::from_env();
    let ops = ops::build(&config, cli.jobs, ops::system_clock()).await?;

    if cli.once {
        let results = ops.scheduler.run_all_now().await;
        let failed: Vec<&str> = results
            .iter()
            .filter(|result| !result.success)
            .map(|result| result.job_name.as_str())
            .collect();

        if failed.is_empty() {
            info!(jobs = results.len(), "All jobs completed");
            return Ok(ExitCode::SUCCESS);
        }
        error!(?failed, "Some jobs failed");
        return Ok(ExitCode::FAILURE);
    }

    ops.scheduler.start().await?;

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router::create_router(ops.monitoring.clone(), ops.jobs.clone())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    let port = cli.port.unwrap_or(config.status_port);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Status server listening on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
        })
        .await
        .context("status server failed")?;

    ops.scheduler.stop().await;
    Ok(ExitCode::SUCCESS)
}
