//! Probe and metadata commands

use anyhow::{bail, Result};
use colored::Colorize;
use serde_json::json;

use crate::client::ApiClient;
use crate::output::{
    color_status, format_timestamp, format_uptime, print_error, print_json, print_success,
    OutputFormat,
};

/// Show liveness and readiness; fails when the server is not ready
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health = client.health().await?;
    let readiness = client.readiness().await?;

    match format {
        OutputFormat::Json => {
            print_json(&json!({ "health": health, "readiness": readiness }))?;
        }
        OutputFormat::Table => {
            println!("{}", "Server Status".bold());
            println!("{}", "=".repeat(50));
            println!("Endpoint:               {}", client.base_url().as_str().cyan());
            println!("Liveness:               {}", color_status(&health.status));
            println!("Readiness:              {}", color_status(&readiness.status));
            println!(
                "Model loaded:           {}",
                if readiness.model_loaded { "yes".green() } else { "no".red() }
            );
            println!(
                "Checked at:             {}",
                format_timestamp(&readiness.timestamp).dimmed()
            );
            println!();

            if readiness.is_ready() {
                print_success("Server is ready to serve predictions");
            } else if let Some(reason) = &readiness.error {
                print_error(&format!("Not ready: {}", reason));
            }
        }
    }

    if !readiness.is_ready() {
        bail!("server is not ready");
    }
    Ok(())
}

/// Show the loaded bundle's metadata
pub async fn show_info(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let info = client.info().await?;

    match format {
        OutputFormat::Json => print_json(&info)?,
        OutputFormat::Table => {
            println!("{}", "Model Information".bold());
            println!("{}", "=".repeat(50));
            println!("Model:                  {}", info.model.cyan());
            println!("Version:                {}", info.version);
            println!("Dataset:                {}", info.dataset);
            println!("Accuracy:               {:.2}%", info.accuracy * 100.0);
            println!("Classes:                {}", info.classes.join(", "));
            println!("Features:               {}", info.features.join(", "));
            println!("Uptime:                 {}", format_uptime(info.uptime_seconds));
        }
    }

    Ok(())
}
