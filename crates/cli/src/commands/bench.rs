//! Load benchmark against the prediction endpoint

use anyhow::{bail, Result};
use colored::Colorize;
use rand::Rng;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;

use crate::client::ApiClient;
use crate::output::{format_millis, print_json, print_warning, OutputFormat};

/// Observed ranges of the four iris measurements
const FEATURE_RANGES: [(f64, f64); 4] = [(4.3, 7.9), (2.0, 4.4), (1.0, 6.9), (0.1, 2.5)];

/// Benchmark summary
#[derive(Debug, Clone, Serialize)]
pub struct BenchReport {
    pub requests: usize,
    pub concurrency: usize,
    pub successes: usize,
    pub failures: usize,
    pub success_rate: f64,
    pub elapsed_secs: f64,
    pub throughput_rps: f64,
    pub avg_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

impl BenchReport {
    fn from_samples(
        requests: usize,
        concurrency: usize,
        mut latencies_ms: Vec<f64>,
        elapsed_secs: f64,
    ) -> Self {
        latencies_ms.sort_by(|a, b| a.total_cmp(b));

        let successes = latencies_ms.len();
        let avg_ms = if successes == 0 {
            0.0
        } else {
            latencies_ms.iter().sum::<f64>() / successes as f64
        };

        Self {
            requests,
            concurrency,
            successes,
            failures: requests - successes,
            success_rate: if requests == 0 {
                0.0
            } else {
                successes as f64 / requests as f64
            },
            elapsed_secs,
            throughput_rps: if elapsed_secs > 0.0 {
                requests as f64 / elapsed_secs
            } else {
                0.0
            },
            avg_ms,
            p50_ms: percentile(&latencies_ms, 50.0),
            p95_ms: percentile(&latencies_ms, 95.0),
            p99_ms: percentile(&latencies_ms, 99.0),
        }
    }
}

/// Nearest-rank percentile of an ascending slice
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

fn random_features() -> Vec<f64> {
    let mut rng = rand::thread_rng();
    FEATURE_RANGES
        .iter()
        .map(|(lo, hi)| {
            let value: f64 = rng.gen_range(*lo..=*hi);
            (value * 10.0).round() / 10.0
        })
        .collect()
}

/// Fire `requests` predictions over `concurrency` workers
pub async fn run(
    client: &ApiClient,
    requests: usize,
    concurrency: usize,
    format: OutputFormat,
) -> Result<()> {
    if requests == 0 || concurrency == 0 {
        bail!("--requests and --concurrency must be positive");
    }
    let concurrency = concurrency.min(requests);

    if let OutputFormat::Table = format {
        println!(
            "Sending {} requests with concurrency {} to {}",
            requests,
            concurrency,
            client.base_url().as_str().cyan()
        );
    }

    let next = Arc::new(AtomicUsize::new(0));
    let started = Instant::now();
    let mut workers = JoinSet::new();

    for _ in 0..concurrency {
        let client = client.clone();
        let next = next.clone();
        workers.spawn(async move {
            let mut latencies = Vec::new();
            let mut last_error = None;
            while next.fetch_add(1, Ordering::Relaxed) < requests {
                let features = random_features();
                let sent = Instant::now();
                match client.predict(&features).await {
                    Ok(_) => latencies.push(sent.elapsed().as_secs_f64() * 1000.0),
                    Err(err) => last_error = Some(format!("{:#}", err)),
                }
            }
            (latencies, last_error)
        });
    }

    let mut latencies = Vec::with_capacity(requests);
    let mut last_error = None;
    while let Some(joined) = workers.join_next().await {
        let (worker_latencies, worker_error) = joined?;
        latencies.extend(worker_latencies);
        last_error = worker_error.or(last_error);
    }

    let report = BenchReport::from_samples(
        requests,
        concurrency,
        latencies,
        started.elapsed().as_secs_f64(),
    );

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => print_report(&report),
    }
    if let Some(err) = last_error {
        print_warning(&format!("Last failure: {}", err));
    }

    Ok(())
}

fn print_report(report: &BenchReport) {
    println!();
    println!("{}", "Benchmark Results".bold());
    println!("{}", "=".repeat(50));
    println!("Requests:               {}", report.requests);
    println!(
        "Successful:             {} ({:.1}%)",
        report.successes,
        report.success_rate * 100.0
    );
    let failures = report.failures.to_string();
    println!(
        "Failed:                 {}",
        if report.failures > 0 { failures.red() } else { failures.green() }
    );
    println!("Elapsed:                {:.2}s", report.elapsed_secs);
    println!("Throughput:             {:.1} req/s", report.throughput_rps);
    println!();
    println!("{}", "Latency".bold());
    println!("{}", "-".repeat(50));
    println!("Average:                {}", format_millis(report.avg_ms));
    println!("p50:                    {}", format_millis(report.p50_ms));
    println!("p95:                    {}", format_millis(report.p95_ms));
    println!("p99:                    {}", format_millis(report.p99_ms));
}
