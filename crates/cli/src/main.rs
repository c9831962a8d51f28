//! Model server CLI
//!
//! A command-line tool for probing a running model server, inspecting the
//! loaded bundle, requesting predictions and load-testing the service.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{bench, metrics, predict, status};
use std::path::PathBuf;

/// Model server CLI
#[derive(Parser)]
#[command(name = "servectl")]
#[command(author, version, about = "CLI for the model inference server", long_about = None)]
pub struct Cli {
    /// Server URL (can also be set via SERVECTL_URL env var)
    #[arg(long, env = "SERVECTL_URL", default_value = "http://localhost:8080")]
    pub url: String,

    /// Output format
    #[arg(long, short, value_enum, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show liveness and readiness
    Status,

    /// Show the loaded model's metadata
    Info,

    /// Classify one feature vector
    Predict {
        /// Feature values in model order
        #[arg(required = true, num_args = 1.., allow_negative_numbers = true)]
        features: Vec<f64>,
    },

    /// Classify several feature vectors
    Batch {
        /// Comma-separated feature vector; repeat for more items
        #[arg(long = "input", short = 'i')]
        inputs: Vec<String>,

        /// JSON file with a "batch" array or a bare array of vectors
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Print the Prometheus metrics exposition
    Metrics,

    /// Run a load benchmark against the prediction endpoint
    Bench {
        /// Total number of requests
        #[arg(long, short = 'n', default_value_t = 1000)]
        requests: usize,

        /// Number of concurrent workers
        #[arg(long, short = 'c', default_value_t = 10)]
        concurrency: usize,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        output::print_error(&format!("{:#}", err));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let client = client::ApiClient::new(&cli.url)?;

    match cli.command {
        Commands::Status => status::show_status(&client, cli.format).await?,
        Commands::Info => status::show_info(&client, cli.format).await?,
        Commands::Predict { features } => predict::predict(&client, &features, cli.format).await?,
        Commands::Batch { inputs, file } => {
            predict::batch(&client, &inputs, file.as_deref(), cli.format).await?
        }
        Commands::Metrics => metrics::show_metrics(&client, cli.format).await?,
        Commands::Bench {
            requests,
            concurrency,
        } => bench::run(&client, requests, concurrency, cli.format).await?,
    }

    Ok(())
}
