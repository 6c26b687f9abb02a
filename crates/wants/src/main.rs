// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::{error, info};

use wantcore::config::EngineConfig;

#[derive(Parser)]
#[command(name = "wantrun", version, about = "Executes declarative want graphs.")]
struct Cli {
    #[command(flatten)]
    config: EngineConfig,

    /// Path to the JSON graph specification.
    graph: std::path::PathBuf,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match wantrun::run_file(cli.config, &cli.graph).await {
        Ok(summary) => {
            for report in &summary.wants {
                info!(
                    want = %report.name,
                    status = %report.status,
                    error = report.error_message.as_deref().unwrap_or(""),
                    "final status"
                );
            }
            if !summary.all_achieved() {
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("fatal: {e:#}");
            std::process::exit(1);
        }
    }
}
