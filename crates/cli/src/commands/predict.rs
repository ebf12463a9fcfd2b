//! Prediction commands

use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::Value;
use std::path::Path;
use tabled::Tabled;

use crate::client::{ApiClient, BatchResult, Prediction, PredictRequest};
use crate::output::{
    color_power, format_importance, print_error, print_json, print_success, print_table,
    print_warning, OutputFormat,
};

/// Canonical feature names, in display order
const FEATURES: [&str; 4] = [
    "Temperature",
    "AmbientPressure",
    "RelativeHumidity",
    "ExhaustVacuum",
];

/// Row for batch results table
#[derive(Tabled)]
struct BatchRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Predicted")]
    predicted: String,
    #[tabled(rename = "Scaling")]
    scaling: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

/// Predict output for a single set of readings
pub async fn predict(client: &ApiClient, request: PredictRequest, format: OutputFormat) -> Result<()> {
    let prediction = client.predict(&request).await?;

    match format {
        OutputFormat::Json => print_json(&prediction)?,
        OutputFormat::Table => print_prediction(&prediction),
    }

    Ok(())
}

fn print_prediction(prediction: &Prediction) {
    println!(
        "Predicted output: {}",
        color_power(prediction.predicted_power, prediction.out_of_range).bold()
    );
    println!("Scaling:          {}", prediction.scaling);
    if prediction.out_of_range {
        print_warning("Prediction is outside the plausible output band");
    }

    let inputs = &prediction.input_values;
    println!();
    println!("{}", "Inputs".bold());
    println!("{}", "-".repeat(50));
    println!("Temperature:        {} °C", inputs.temperature);
    println!("Ambient Pressure:   {} mbar", inputs.ambient_pressure);
    println!("Relative Humidity:  {} %", inputs.relative_humidity);
    println!("Exhaust Vacuum:     {} cm Hg", inputs.exhaust_vacuum);

    if !prediction.feature_importance.is_empty() {
        println!();
        println!("{}", "Feature Importance".bold());
        println!("{}", "-".repeat(50));
        for name in FEATURES {
            if let Some(weight) = prediction.feature_importance.get(name) {
                println!("{:<20}{}", name, format_importance(*weight));
            }
        }
    }
}

/// Predict every record of a JSON file
///
/// The file holds either an array of records or `{"records": [...]}`.
pub async fn batch(client: &ApiClient, file: &Path, format: OutputFormat) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let records = read_records(&content)?;

    let response = client.batch_predict(records).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            let failed = response
                .results
                .iter()
                .filter(|r| matches!(r, BatchResult::Failed(_)))
                .count();

            let rows: Vec<BatchRow> = response
                .results
                .iter()
                .enumerate()
                .map(|(index, result)| batch_row(index, result))
                .collect();
            print_table(rows);

            let succeeded = response.results.len() - failed;
            if failed == 0 {
                print_success(&format!("{} records predicted", succeeded));
            } else {
                print_error(&format!("{} records predicted, {} failed", succeeded, failed));
            }
        }
    }

    Ok(())
}

fn batch_row(index: usize, result: &BatchResult) -> BatchRow {
    match result {
        BatchResult::Prediction(p) => BatchRow {
            index,
            predicted: color_power(p.predicted_power, p.out_of_range),
            scaling: p.scaling.clone(),
            detail: if p.out_of_range {
                "out of range".to_string()
            } else {
                String::new()
            },
        },
        BatchResult::Failed(err) => BatchRow {
            index: err.index,
            predicted: "-".to_string(),
            scaling: "-".to_string(),
            detail: format!("{}: {}", err.kind, err.error),
        },
    }
}

fn read_records(content: &str) -> Result<Vec<Value>> {
    let value: Value = serde_json::from_str(content).context("Batch file is not valid JSON")?;
    match value {
        Value::Array(records) => Ok(records),
        Value::Object(mut body) => match body.remove("records") {
            Some(Value::Array(records)) => Ok(records),
            _ => anyhow::bail!("Batch file object must contain a \"records\" array"),
        },
        _ => anyhow::bail!("Batch file must be an array of records"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::BatchError;

    #[test]
    fn test_read_records_accepts_array_and_envelope() {
        let records = read_records(r#"[{"temperature": 20.0}, {"temperature": 21.0}]"#).unwrap();
        assert_eq!(records.len(), 2);

        let records = read_records(r#"{"records": [{"temperature": 20.0}]}"#).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_read_records_rejects_other_shapes() {
        assert!(read_records("42").is_err());
        assert!(read_records(r#"{"rows": []}"#).is_err());
        assert!(read_records("not json").is_err());
    }

    #[test]
    fn test_failed_row_keeps_server_index() {
        let row = batch_row(
            0,
            &BatchResult::Failed(BatchError {
                index: 7,
                error: "value is missing".to_string(),
                kind: "invalid_input".to_string(),
            }),
        );
        assert_eq!(row.index, 7);
        assert!(row.detail.starts_with("invalid_input"));
    }
}
