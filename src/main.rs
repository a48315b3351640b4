//! Clipframe CLI entry point.

use anyhow::Result;
use clap::Parser;
use clipframe::cli::{commands, Cli, Commands};
use clipframe::config::Settings;
use clipframe::loader::LoadOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let settings = Settings::load_from(cli.config.as_ref())?;

    // Initialize logging
    let log_level = match cli.verbose {
        0 => settings.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("clipframe={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Execute command
    match cli.command {
        Commands::Scan => {
            commands::run_scan(&settings)?;
        }

        Commands::Load {
            dry_run,
            workers,
            limit,
            videos,
            report,
        } => {
            let options = LoadOptions {
                limit,
                videos,
                workers,
            };
            commands::run_load(options, dry_run, report, settings).await?;
        }

        Commands::Search {
            queries,
            objects,
            limit,
            min_score,
        } => {
            commands::run_search(&queries, &objects, limit, min_score, settings).await?;
        }

        Commands::Info => {
            commands::run_info(&settings).await?;
        }

        Commands::Serve { host, port } => {
            commands::run_serve(host, port, settings).await?;
        }

        Commands::Config { action } => {
            commands::run_config(&action, settings, cli.config.as_ref())?;
        }
    }

    Ok(())
}
