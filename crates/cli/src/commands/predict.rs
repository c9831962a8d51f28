//! Prediction commands

use anyhow::{bail, Context, Result};
use colored::Colorize;
use serde_json::Value;
use std::path::Path;
use tabled::Tabled;

use crate::client::{ApiClient, BatchEntry, Prediction};
use crate::output::{
    color_confidence, format_millis, format_probability, print_json, print_table, print_warning,
    OutputFormat,
};

/// Row for the class probability table
#[derive(Tabled)]
struct ProbabilityRow {
    #[tabled(rename = "Class")]
    class: String,
    #[tabled(rename = "Probability")]
    probability: String,
}

/// Row for the batch result table
#[derive(Tabled)]
struct BatchRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Class")]
    class: String,
    #[tabled(rename = "Confidence")]
    confidence: String,
    #[tabled(rename = "Latency")]
    latency: String,
    #[tabled(rename = "Error")]
    error: String,
}

/// Classify one feature vector
pub async fn predict(client: &ApiClient, features: &[f64], format: OutputFormat) -> Result<()> {
    let prediction = client.predict(features).await?;

    match format {
        OutputFormat::Json => print_json(&prediction)?,
        OutputFormat::Table => print_prediction(&prediction),
    }

    Ok(())
}

fn print_prediction(prediction: &Prediction) {
    println!(
        "{} {} ({})",
        "Prediction:".bold(),
        prediction.class.cyan().bold(),
        color_confidence(prediction.confidence)
    );
    println!(
        "Latency:    {}",
        format_millis(prediction.processing_time_ms).dimmed()
    );
    println!();

    let rows: Vec<ProbabilityRow> = prediction
        .probabilities
        .iter()
        .map(|(class, p)| ProbabilityRow {
            class: class.to_string(),
            probability: format_probability(p),
        })
        .collect();
    print_table(&rows);
}

/// Classify several feature vectors from `-i` flags and/or a JSON file
pub async fn batch(
    client: &ApiClient,
    inputs: &[String],
    file: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let mut items = Vec::new();
    for input in inputs {
        let features = parse_features(input)?;
        items.push(Value::from(features));
    }
    if let Some(path) = file {
        items.extend(read_batch_file(path)?);
    }
    if items.is_empty() {
        bail!("no inputs given; use -i \"f1,f2,f3,f4\" or --file");
    }

    let response = client.batch_predict(&items).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            let rows: Vec<BatchRow> = response
                .results
                .iter()
                .enumerate()
                .map(|(index, entry)| match entry {
                    BatchEntry::Prediction(p) => BatchRow {
                        index,
                        class: p.class.clone(),
                        confidence: format_probability(p.confidence),
                        latency: format_millis(p.processing_time_ms),
                        error: String::new(),
                    },
                    BatchEntry::Error { error } => BatchRow {
                        index,
                        class: "-".to_string(),
                        confidence: "-".to_string(),
                        latency: "-".to_string(),
                        error: error.clone(),
                    },
                })
                .collect();
            print_table(&rows);

            let failed = rows.iter().filter(|row| !row.error.is_empty()).count();
            if failed > 0 {
                print_warning(&format!("{} of {} items failed", failed, response.count));
            }
        }
    }

    Ok(())
}

/// Parse `"5.1, 3.5, 1.4, 0.2"` into a feature vector
pub fn parse_features(input: &str) -> Result<Vec<f64>> {
    input
        .split(',')
        .map(|part| {
            let part = part.trim();
            part.parse::<f64>()
                .with_context(|| format!("invalid feature value '{}' in \"{}\"", part, input))
        })
        .collect()
}

/// Accept either `{"batch": [...]}` or a bare array of items
fn read_batch_file(path: &Path) -> Result<Vec<Value>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read batch file {}", path.display()))?;
    let value: Value = serde_json::from_str(&content).context("Failed to parse batch file")?;

    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("batch") {
            Some(Value::Array(items)) => Ok(items),
            _ => bail!("batch file must contain a \"batch\" array"),
        },
        _ => bail!("batch file must be a JSON array or an object with a \"batch\" array"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_parse_features() {
        assert_eq!(
            parse_features("5.1, 3.5,1.4 ,0.2").unwrap(),
            vec![5.1, 3.5, 1.4, 0.2]
        );
        assert!(parse_features("5.1,abc").is_err());
        assert!(parse_features("").is_err());
    }

    #[test]
    fn test_read_batch_file_object() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"batch": [[5.1, 3.5, 1.4, 0.2], [1, 2]]}}"#).unwrap();

        let items = read_batch_file(file.path()).unwrap();
        assert_eq!(items, vec![json!([5.1, 3.5, 1.4, 0.2]), json!([1, 2])]);
    }

    #[test]
    fn test_read_batch_file_bare_array() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[[6.7, 3.0, 5.2, 2.3]]").unwrap();

        assert_eq!(read_batch_file(file.path()).unwrap().len(), 1);
    }

    #[test]
    fn test_read_batch_file_rejects_other_shapes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"items": []}}"#).unwrap();

        assert!(read_batch_file(file.path()).is_err());
    }
}
