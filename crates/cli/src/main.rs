//! Power Plant Predictor CLI
//!
//! A command-line tool for querying the power output prediction service:
//! model introspection, single and batch predictions, and service health.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{health, model, predict};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Power Plant Predictor CLI
#[derive(Parser)]
#[command(name = "ppp")]
#[command(author, version, about = "CLI for the Power Plant Predictor", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via PPP_API_URL env var)
    #[arg(long, env = "PPP_API_URL")]
    pub api_url: Option<String>,

    /// Output format [default: table]
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect the loaded model
    #[command(subcommand)]
    Model(ModelCommands),

    /// Predict net electrical output from ambient readings
    #[command(allow_negative_numbers = true)]
    Predict {
        /// Ambient temperature (°C)
        #[arg(long, short = 't')]
        temperature: f64,

        /// Ambient pressure (mbar)
        #[arg(long, short = 'p')]
        ambient_pressure: f64,

        /// Relative humidity (%)
        #[arg(long, short = 'r')]
        relative_humidity: f64,

        /// Exhaust vacuum (cm Hg)
        #[arg(long, short = 'e')]
        exhaust_vacuum: f64,
    },

    /// Predict every record of a JSON file
    Batch {
        /// File with an array of records or {"records": [...]}
        file: PathBuf,
    },

    /// Show service health and readiness
    Health,
}

#[derive(Subcommand)]
pub enum ModelCommands {
    /// Show model type, calibration and feature details
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .with_writer(std::io::stderr)
            .init();
    }

    let config = config::Config::load()?;
    let format = config.resolve_format(cli.format);
    let client = client::ApiClient::new(&config.resolve_api_url(cli.api_url.as_deref()))?;

    match cli.command {
        Commands::Model(ModelCommands::Info) => {
            model::show_model_info(&client, format).await?;
        }
        Commands::Predict {
            temperature,
            ambient_pressure,
            relative_humidity,
            exhaust_vacuum,
        } => {
            let request = client::PredictRequest {
                temperature,
                ambient_pressure,
                relative_humidity,
                exhaust_vacuum,
            };
            predict::predict(&client, request, format).await?;
        }
        Commands::Batch { file } => {
            predict::batch(&client, &file, format).await?;
        }
        Commands::Health => {
            health::show_health(&client, format).await?;
        }
    }

    Ok(())
}
