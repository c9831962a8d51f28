//! Output formatting utilities

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Pretty-print any response as JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a rounded table, or a notice when there is nothing to show
pub fn print_table<T: Tabled>(rows: &[T]) {
    if rows.is_empty() {
        println!("{}", "No items found".yellow());
        return;
    }
    println!("{}", Table::new(rows).with(Style::rounded()));
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Format a probability as percentage
pub fn format_probability(p: f64) -> String {
    format!("{:.2}%", p * 100.0)
}

/// Format milliseconds with sensible precision
pub fn format_millis(ms: f64) -> String {
    if ms >= 100.0 {
        format!("{:.0}ms", ms)
    } else {
        format!("{:.2}ms", ms)
    }
}

/// Format a duration in seconds as `1h 2m 3s`
pub fn format_uptime(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{}h {}m {}s", h, m, s)
    } else if m > 0 {
        format!("{}m {}s", m, s)
    } else {
        format!("{}s", s)
    }
}

/// Render an RFC 3339 timestamp in UTC, passing through anything unparsable
pub fn format_timestamp(timestamp: &str) -> String {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|dt| dt.with_timezone(&Utc).format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|_| timestamp.to_string())
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" | "ready" => status.green().to_string(),
        "not_ready" | "unhealthy" | "error" => status.red().to_string(),
        _ => status.yellow().to_string(),
    }
}

/// Color confidence based on value
pub fn color_confidence(confidence: f64) -> String {
    let formatted = format_probability(confidence);
    if confidence >= 0.8 {
        formatted.green().to_string()
    } else if confidence >= 0.6 {
        formatted.yellow().to_string()
    } else {
        formatted.red().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_probability() {
        assert_eq!(format_probability(1.0), "100.00%");
        assert_eq!(format_probability(0.12345), "12.35%");
    }

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(0.256), "0.26ms");
        assert_eq!(format_millis(250.4), "250ms");
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(5.9), "5s");
        assert_eq!(format_uptime(125.0), "2m 5s");
        assert_eq!(format_uptime(3723.0), "1h 2m 3s");
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(
            format_timestamp("2024-03-01T10:20:30+02:00"),
            "2024-03-01 08:20:30 UTC"
        );
        assert_eq!(format_timestamp("yesterday"), "yesterday");
    }
}
