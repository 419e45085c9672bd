use anyhow::Context;
use axum::Router;
use clap::Parser;
use ingest_gateway::api::{create_metrics_api, create_rest_api};
use ingest_gateway::{AppContext, GatewayConfig, LogFormat, MonitoringConfig, ShutdownCoordinator};
use ingest_producer::ProducerCell;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ingest-gateway")]
#[command(about = "HTTP ingestion gateway publishing to Kafka", long_about = None)]
struct Args {
    /// Path to configuration file (YAML, JSON or TOML)
    #[arg(short, long, env = "INGEST_CONFIG")]
    config: Option<PathBuf>,

    /// Number of publishing workers
    #[arg(long)]
    pool_size: Option<usize>,

    /// Ingest API listen address
    #[arg(long)]
    listen: Option<String>,

    /// Metrics server listen address
    #[arg(long)]
    metrics_listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config =
        GatewayConfig::load(args.config.as_deref()).context("failed to load configuration")?;

    // Override with CLI args
    if let Some(size) = args.pool_size {
        config.pool.size = size;
    }
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }
    if let Some(metrics_listen) = args.metrics_listen {
        config.monitoring.metrics_listen = metrics_listen;
    }

    init_tracing(&config.monitoring);
    tracing::info!(
        listen = %config.server.listen,
        metrics = %config.monitoring.metrics_listen,
        workers = config.pool.size,
        capacity = config.pool.capacity,
        backend = config.producer.backend.as_str(),
        "starting ingest gateway"
    );

    let api_addr = config.listen_addr()?;
    let metrics_addr = config.metrics_addr()?;
    let grace = config.pool.drain_grace();

    let producers = ProducerCell::new();
    let ctx = Arc::new(
        AppContext::initialize(config, &producers)
            .await
            .context("gateway startup failed")?,
    );

    let coordinator = ShutdownCoordinator::new();
    coordinator.listen_for_signals();
    let token = coordinator.token();

    let api_listener = bind(api_addr, "ingest API").await?;
    let metrics_listener = bind(metrics_addr, "metrics server").await?;

    let mut servers = JoinSet::new();
    servers.spawn(serve("ingest API", api_listener, create_rest_api(ctx.clone()), token.clone()));
    servers.spawn(serve(
        "metrics server",
        metrics_listener,
        create_metrics_api(ctx.clone()),
        token.clone(),
    ));

    // A server that stops on its own takes the whole gateway down.
    tokio::select! {
        _ = token.cancelled() => {}
        Some(joined) = servers.join_next() => {
            log_server_exit(joined);
            coordinator.trigger();
        }
    }
    coordinator.stop_intake(&ctx);

    let stopped = tokio::time::timeout(grace, async {
        while let Some(joined) = servers.join_next().await {
            log_server_exit(joined);
        }
    })
    .await;
    if stopped.is_err() {
        tracing::warn!("HTTP servers did not stop within {:?}, aborting them", grace);
        servers.shutdown().await;
    }

    let report = coordinator.shutdown(&ctx).await;
    tracing::info!(
        abandoned = report.abandoned,
        interrupted = report.interrupted,
        "ingest gateway stopped"
    );
    Ok(())
}

fn init_tracing(monitoring: &MonitoringConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&monitoring.log_level));

    match monitoring.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init(),
    }
}

async fn bind(addr: SocketAddr, name: &str) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {} on {}", name, addr))?;
    tracing::info!("{} listening on {}", name, addr);
    Ok(listener)
}

async fn serve(
    name: &'static str,
    listener: TcpListener,
    app: Router,
    token: CancellationToken,
) -> anyhow::Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(token.cancelled_owned())
        .await
        .with_context(|| format!("{} failed", name))?;
    tracing::info!("{} stopped", name);
    Ok(())
}

fn log_server_exit(joined: Result<anyhow::Result<()>, tokio::task::JoinError>) {
    match joined {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("{:#}", e),
        Err(e) => tracing::error!("server task failed: {}", e),
    }
}
