//! Service health commands

use anyhow::Result;
use colored::Colorize;
use serde_json::json;

use crate::client::{ApiClient, HealthResponse, ReadinessResponse};
use crate::output::{color_status, print_info, print_json, OutputFormat};

/// Show liveness and readiness of the prediction service
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let (_, health): (u16, HealthResponse) = client.probe("healthz").await?;
    let (_, readiness): (u16, ReadinessResponse) = client.probe("readyz").await?;

    match format {
        OutputFormat::Json => print_json(&json!({ "health": health, "readiness": readiness }))?,
        OutputFormat::Table => {
            println!("{}", "Service Health".bold());
            println!("{}", "=".repeat(50));
            println!("Status:       {}", color_status(&health.status));
            let ready = if readiness.ready { "ready" } else { "not ready" };
            println!("Readiness:    {}", color_status(ready));
            if let Some(reason) = &readiness.reason {
                print_info(reason);
            }

            println!();
            println!("{}", "Components".bold());
            println!("{}", "-".repeat(50));
            let mut components: Vec<_> = health.components.iter().collect();
            components.sort_by(|a, b| a.0.cmp(b.0));
            for (name, component) in components {
                match &component.message {
                    Some(message) => println!(
                        "{:<14}{}  {}",
                        name,
                        color_status(&component.status),
                        message
                    ),
                    None => println!("{:<14}{}", name, color_status(&component.status)),
                }
            }
        }
    }

    Ok(())
}
