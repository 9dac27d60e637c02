//! Metrics Simulator
//!
//! Serves `/`, `/contact` and `/metrics` on port 8181 while background loops
//! feed simulated values into the registry.

use std::time::Duration;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use metrics_sim::app::DEFAULT_LISTEN_ADDR;
use metrics_sim::{App, FactsMode, MetricsServer, Result, ServerConfig};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Metrics Simulator - simulated Prometheus metrics over HTTP
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Listener bind address
    #[arg(long, env = "LISTEN_ADDR", default_value = DEFAULT_LISTEN_ADDR)]
    listen_addr: String,

    /// Simulation tick period in milliseconds
    #[arg(long, env = "TICK_PERIOD_MS", default_value = "1000")]
    tick_period_ms: u64,

    /// Source of memory and system info values
    #[arg(long, env = "FACTS_SOURCE", value_enum, default_value_t = FactsMode::Synthetic)]
    facts: FactsMode,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting metrics simulator");
    info!("  Listen address: {}", args.listen_addr);
    info!("  Tick period: {} ms", args.tick_period_ms);
    info!("  Facts source: {}", args.facts);

    let config = ServerConfig {
        listen_addr: args.listen_addr.clone(),
        tick_period: Duration::from_millis(args.tick_period_ms.max(1)),
        facts: args.facts,
        ..Default::default()
    };

    let app = App::new(config).map_err(|e| {
        error!("Failed to register instruments: {}", e);
        e
    })?;

    let server = MetricsServer::bind(&app.config().listen_addr, app.routes())
        .await
        .map_err(|e| {
            error!("Failed to start listener: {}", e);
            e
        })?;

    let simulations = app.start_simulations()?;
    info!("Started {} simulation loops", simulations.len());

    let shutdown = app.shutdown_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received interrupt, shutting down");
                shutdown.cancel();
            }
            Err(e) => error!("Failed to listen for interrupt: {}", e),
        }
    });

    let result = server.serve(app.shutdown_token()).await;

    // Abrupt: loops are stopped, in-flight requests are not drained
    app.shutdown_token().cancel();
    futures::future::join_all(simulations.into_iter().map(|s| s.stop())).await;

    if let Err(e) = &result {
        error!("Listener failed: {}", e);
    } else {
        info!("Shutdown complete");
    }
    result
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "hyper_util=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
