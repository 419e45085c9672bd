use bytes::Bytes;
use clap::Parser;
use ingest_bench::{run, BenchConfig};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "ingest-bench")]
#[command(about = "Load generator for the ingest gateway", long_about = None)]
struct Args {
    /// Gateway base URL
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    url: String,

    /// Topic to publish to
    #[arg(short, long, default_value = "bench")]
    topic: String,

    /// Message key
    #[arg(short, long, default_value = "bench-key")]
    key: String,

    /// Request body
    #[arg(short, long, default_value = "send this to kafka")]
    body: String,

    /// Number of concurrent clients
    #[arg(short, long, default_value = "10")]
    concurrency: usize,

    /// Total requests across all clients
    #[arg(short = 'n', long, default_value = "3000")]
    requests: usize,

    /// Per-request timeout in seconds
    #[arg(long, default_value = "10")]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let url = reqwest::Url::parse_with_params(
        &format!("{}/push", args.url.trim_end_matches('/')),
        &[("topic", args.topic.as_str()), ("key", args.key.as_str())],
    )?;

    println!(
        "Sending {} requests to {} with {} clients",
        args.requests, url, args.concurrency
    );

    let report = run(BenchConfig {
        url: url.to_string(),
        concurrency: args.concurrency,
        total_requests: args.requests,
        body: Bytes::from(args.body),
        timeout: Duration::from_secs(args.timeout_secs),
    })
    .await?;

    println!("{}", report.table());
    Ok(())
}
