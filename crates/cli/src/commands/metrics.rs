//! Metrics command

use anyhow::Result;

use crate::client::ApiClient;
use crate::output::{print_json, OutputFormat};

/// Print the server's Prometheus exposition
pub async fn show_metrics(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let text = client.metrics().await?;

    match format {
        OutputFormat::Table => print!("{}", text),
        OutputFormat::Json => {
            let samples: Vec<(&str, f64)> = text.lines().filter_map(parse_sample).collect();
            let map: serde_json::Map<String, serde_json::Value> = samples
                .into_iter()
                .map(|(name, value)| (name.to_string(), value.into()))
                .collect();
            print_json(&map)?;
        }
    }

    Ok(())
}

/// Split one exposition line into series and value; comments are skipped
fn parse_sample(line: &str) -> Option<(&str, f64)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (series, value) = line.rsplit_once(' ')?;
    Some((series, value.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sample() {
        assert_eq!(parse_sample("ml_active_requests 2"), Some(("ml_active_requests", 2.0)));
        assert_eq!(
            parse_sample("ml_errors_total{type=\"invalid_input\"} 3"),
            Some(("ml_errors_total{type=\"invalid_input\"}", 3.0))
        );
        assert_eq!(parse_sample("# HELP ml_active_requests Number"), None);
        assert_eq!(parse_sample(""), None);
    }
}
