//! Model introspection commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, ModelInfo};
use crate::output::{
    color_status, format_bytes, format_importance, format_power, print_json, print_table,
    print_warning, OutputFormat,
};

/// Row for the feature table
#[derive(Tabled)]
struct FeatureRow {
    #[tabled(rename = "Feature")]
    feature: String,
    #[tabled(rename = "Importance")]
    importance: String,
    #[tabled(rename = "Min")]
    min: String,
    #[tabled(rename = "Max")]
    max: String,
    #[tabled(rename = "Unit")]
    unit: String,
}

/// Show the loaded model and its calibration
pub async fn show_model_info(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let info = client.model_info().await?;

    match format {
        OutputFormat::Json => print_json(&info)?,
        OutputFormat::Table => print_model_info(&info),
    }

    Ok(())
}

fn print_model_info(info: &ModelInfo) {
    println!("{}", "Model Info".bold());
    println!("{}", "=".repeat(50));

    if !info.is_loaded() {
        println!("Status:       {}", color_status(&info.status));
        if let Some(message) = &info.message {
            print_warning(message);
        }
        println!("Features:     {}", info.feature_names.join(", "));
        return;
    }

    let status = if info.calibrated {
        info.status.clone()
    } else {
        "uncalibrated".to_string()
    };
    println!("Status:       {}", color_status(&status));
    println!(
        "Model Type:   {}",
        info.model_type.as_deref().unwrap_or("unknown").cyan()
    );
    println!("Format:       {}", info.format.as_deref().unwrap_or("-"));
    if let Some(n) = info.n_estimators {
        println!("Estimators:   {}", n);
    }
    println!("Path:         {}", info.path.as_deref().unwrap_or("-"));
    if let Some(size) = info.size_bytes {
        println!("Size:         {}", format_bytes(size));
    }
    if let Some(checksum) = &info.checksum {
        println!("Checksum:     {}", short_checksum(checksum));
    }
    if let Some(ts) = info.loaded_at {
        println!("Loaded At:    {}", format_timestamp(ts));
    }

    println!();
    println!("{}", "Calibration".bold());
    println!("{}", "-".repeat(50));
    match (info.scaling(), &info.calibration_error) {
        (Some(scaling), _) => {
            println!("Scaling:      {}", scaling);
            println!("Rule:         {}", info.calibration_rule().unwrap_or("-"));
        }
        (None, Some(error)) => print_warning(error),
        (None, None) => println!("Scaling:      -"),
    }
    if let Some(band) = &info.plausible_band {
        println!(
            "Band:         {} - {}",
            format_power(band.min),
            format_power(band.max)
        );
    }

    println!();
    let rows: Vec<FeatureRow> = info
        .feature_names
        .iter()
        .map(|name| {
            let range = info.input_ranges.iter().find(|r| &r.feature == name);
            FeatureRow {
                feature: name.clone(),
                importance: info
                    .feature_importance
                    .get(name)
                    .map(|w| format_importance(*w))
                    .unwrap_or_else(|| "-".to_string()),
                min: range.map(|r| r.min.to_string()).unwrap_or_default(),
                max: range.map(|r| r.max.to_string()).unwrap_or_default(),
                unit: range.map(|r| r.unit.clone()).unwrap_or_default(),
            }
        })
        .collect();
    print_table(rows);
}

fn short_checksum(checksum: &str) -> String {
    if checksum.len() > 12 {
        format!("{}...", &checksum[..12])
    } else {
        checksum.to_string()
    }
}

fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_checksum() {
        assert_eq!(short_checksum("abc"), "abc");
        assert_eq!(
            short_checksum("0123456789abcdef0123"),
            "0123456789ab..."
        );
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00 UTC");
    }
}
