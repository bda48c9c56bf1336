//! CLI application for the invoice document pipeline.

mod commands;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use commands::{config, ingest, list, serve, upload_url};

/// Invoice document pipeline - extract, store, and validate uploaded invoices
#[derive(Parser)]
#[command(name = "idp")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP facade and the pipeline
    Serve(serve::ServeArgs),

    /// Upload local files and run them through the pipeline
    Ingest(ingest::IngestArgs),

    /// List stored invoices
    List(list::ListArgs),

    /// Mint an upload URL
    UploadUrl(upload_url::UploadUrlArgs),

    /// Manage configuration
    Config(config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let filter = match std::env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => {
            let level = match cli.verbose {
                0 => Level::WARN,
                1 => Level::INFO,
                2 => Level::DEBUG,
                _ => Level::TRACE,
            };
            EnvFilter::new(level.to_string())
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Serve(args) => serve::run(args, config_path).await,
        Commands::Ingest(args) => ingest::run(args, config_path).await,
        Commands::List(args) => list::run(args, config_path).await,
        Commands::UploadUrl(args) => upload_url::run(args, config_path).await,
        Commands::Config(args) => config::run(args, config_path).await,
    }
}
