use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aimglyze::{
    analyzer::build_analyzer,
    config::{Config, defaults::DEFAULT_CONFIDENCE_THRESHOLD},
    web::{AppState, WebServer},
};

#[derive(Parser)]
#[command(name = "aimglyze")]
#[command(version)]
#[command(about = "AI image analysis server with a content-addressed result cache")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server (default)
    Serve,
    /// Delete expired cache entries
    CleanCache,
    /// Delete retained uploads whose cached confidence is below a threshold
    CleanUploads {
        /// Confidence threshold
        #[arg(short, long, default_value_t = DEFAULT_CONFIDENCE_THRESHOLD)]
        threshold: f64,

        /// Report what would be removed without deleting anything
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration before logging so the debug flag can raise the level
    let mut config = Config::load_from_file(&cli.config)?;

    let level = if config.server.debug {
        "debug"
    } else {
        cli.log_level.as_str()
    };
    let log_filter = if level == "trace" {
        format!("aimglyze={level},tower_http=trace")
    } else {
        format!("aimglyze={level}")
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting aimglyze v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from: {}", cli.config);

    // Override config with CLI arguments
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let analyzer = build_analyzer(&config.analyzer)?;
    let state = AppState::initialize(config, analyzer).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let web_server = WebServer::new(state)?;
            info!(
                "Starting web server on {}:{}",
                web_server.host(),
                web_server.port()
            );
            web_server.serve().await?;
        }
        Command::CleanCache => {
            let report = state.maintenance().sweep_expired_cache().await?;
            println!("Deleted {} expired cache entries", report.deleted_count());
        }
        Command::CleanUploads { threshold, dry_run } => {
            let report = state
                .maintenance()
                .prune_low_confidence_uploads(threshold, dry_run)
                .await;
            if dry_run {
                println!(
                    "Found {} uploads with confidence below {} (dry run)",
                    report.affected_count(),
                    threshold
                );
            } else {
                println!(
                    "Removed {} uploads with confidence below {}",
                    report.affected_count(),
                    threshold
                );
            }
        }
    }

    Ok(())
}
