//! Load generator for the ingest API.
//!
//! A fixed number of clients share the request budget and each sends its
//! share sequentially. Responses are tallied by status class.

use bytes::Bytes;
use comfy_table::{presets::UTF8_FULL, Table};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub url: String,
    pub concurrency: usize,
    pub total_requests: usize,
    pub body: Bytes,
    pub timeout: Duration,
}

#[derive(Debug, Default)]
struct Tally {
    ok: AtomicU64,
    bad_request: AtomicU64,
    server_error: AtomicU64,
    other: AtomicU64,
    failed: AtomicU64,
}

impl Tally {
    fn record(&self, status: reqwest::StatusCode) {
        let counter = match status.as_u16() {
            200 => &self.ok,
            400 => &self.bad_request,
            500 => &self.server_error,
            _ => &self.other,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BenchReport {
    pub total_requests: usize,
    pub concurrency: usize,
    pub elapsed: Duration,
    pub ok: u64,
    pub bad_request: u64,
    pub server_error: u64,
    pub other: u64,
    pub failed: u64,
}

impl BenchReport {
    pub fn tps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.total_requests as f64 / secs
        } else {
            0.0
        }
    }

    pub fn table(&self) -> Table {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["Metric", "Value"]);
        table.add_row(vec!["Total Requests", &self.total_requests.to_string()]);
        table.add_row(vec!["Concurrency", &self.concurrency.to_string()]);
        table.add_row(vec!["Time Taken (s)", &format!("{:.2}", self.elapsed.as_secs_f64())]);
        table.add_row(vec!["TPS", &format!("{:.2}", self.tps())]);
        table.add_row(vec!["200 Responses", &self.ok.to_string()]);
        table.add_row(vec!["400 Responses", &self.bad_request.to_string()]);
        table.add_row(vec!["500 Responses", &self.server_error.to_string()]);
        table.add_row(vec!["Other Responses", &self.other.to_string()]);
        table.add_row(vec!["Failed Requests", &self.failed.to_string()]);
        table
    }
}

/// Requests handled by client `index`; the remainder goes to the first clients.
fn share(total: usize, clients: usize, index: usize) -> usize {
    total / clients + usize::from(index < total % clients)
}

pub async fn run(config: BenchConfig) -> anyhow::Result<BenchReport> {
    anyhow::ensure!(config.concurrency > 0, "concurrency must be at least 1");

    let client = reqwest::Client::builder().timeout(config.timeout).build()?;
    let tally = Arc::new(Tally::default());
    let started = Instant::now();

    let mut clients = JoinSet::new();
    for index in 0..config.concurrency {
        let requests = share(config.total_requests, config.concurrency, index);
        let client = client.clone();
        let tally = tally.clone();
        let url = config.url.clone();
        let body = config.body.clone();

        clients.spawn(async move {
            for _ in 0..requests {
                match client.post(&url).body(body.clone()).send().await {
                    Ok(response) => tally.record(response.status()),
                    Err(e) => {
                        debug!(error = %e, "request failed");
                        tally.failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        });
    }

    while let Some(joined) = clients.join_next().await {
        if let Err(e) = joined {
            warn!("client task failed: {}", e);
        }
    }

    Ok(BenchReport {
        total_requests: config.total_requests,
        concurrency: config.concurrency,
        elapsed: started.elapsed(),
        ok: tally.ok.load(Ordering::Relaxed),
        bad_request: tally.bad_request.load(Ordering::Relaxed),
        server_error: tally.server_error.load(Ordering::Relaxed),
        other: tally.other.load(Ordering::Relaxed),
        failed: tally.failed.load(Ordering::Relaxed),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Query, http::StatusCode, routing::post, Router};
    use std::collections::HashMap;

    async fn push(Query(params): Query<HashMap<String, String>>, body: Bytes) -> StatusCode {
        if body.is_empty() || !params.contains_key("topic") {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::OK
        }
    }

    async fn server() -> String {
        let app = Router::new().route("/push", post(push));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn config(url: String, body: &'static str) -> BenchConfig {
        BenchConfig {
            url,
            concurrency: 3,
            total_requests: 20,
            body: Bytes::from_static(body.as_bytes()),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_share_covers_total() {
        let total: usize = (0..3).map(|i| share(20, 3, i)).sum();
        assert_eq!(total, 20);
        assert_eq!(share(20, 3, 0), 7);
        assert_eq!(share(20, 3, 2), 6);
        assert_eq!(share(2, 4, 3), 0);
    }

    #[tokio::test]
    async fn test_counts_successes() {
        let base = server().await;
        let report = run(config(format!("{}/push?topic=t&key=k", base), "hello"))
            .await
            .unwrap();

        assert_eq!(report.ok, 20);
        assert_eq!(report.bad_request + report.failed + report.other, 0);
        assert!(report.tps() > 0.0);
    }

    #[tokio::test]
    async fn test_counts_rejections() {
        let base = server().await;
        let report = run(config(format!("{}/push?key=k", base), "hello"))
            .await
            .unwrap();
        assert_eq!(report.bad_request, 20);
        assert_eq!(report.ok, 0);
    }

    #[tokio::test]
    async fn test_unreachable_target_counts_failures() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let report = run(config(format!("http://{}/push", addr), "hello"))
            .await
            .unwrap();
        assert_eq!(report.failed, 20);
    }

    #[test]
    fn test_table_lists_breakdown() {
        let report = BenchReport {
            total_requests: 10,
            concurrency: 2,
            elapsed: Duration::from_secs(2),
            ok: 8,
            bad_request: 1,
            server_error: 0,
            other: 0,
            failed: 1,
        };
        assert_eq!(report.tps(), 5.0);
        let rendered = report.table().to_string();
        assert!(rendered.contains("200 Responses"));
        assert!(rendered.contains("5.00"));
    }
}
