mod config;
mod uploader;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use serde_json::Map;
use std::path::PathBuf;
use tracing::info;

use config::{Settings, detect_environment};
use uploader::{ChatLogUploader, UploaderOptions};

#[derive(Parser, Debug)]
#[command(
    name = "chatlog-upload",
    version = env!("CARGO_PKG_VERSION"),
    about = "Upload AI chat logs to object storage via presigned URLs",
    long_about = "Uploads chat-log files to object storage through a two-phase protocol: \
                  request a short-lived presigned URL from the configured Lambda function URL, \
                  then PUT the content to that URL. Configure via environment variables or .env.",
    after_help = "Examples:\n  \
                  chatlog-upload --test\n  \
                  chatlog-upload --upload ./chat-log.json\n\n\
                  Environment Variables:\n  \
                  LAMBDA_FUNCTION_URL   URL of the presigned URL generator Lambda function"
)]
struct Cli {
    /// Run a built-in synthetic chat-log upload against the endpoint
    #[arg(long)]
    test: bool,

    /// Upload a specific chat-log file
    #[arg(long, value_name = "FILE")]
    upload: Option<PathBuf>,

    /// Lambda function URL (overrides LAMBDA_FUNCTION_URL)
    #[arg(long, value_name = "URL")]
    function_url: Option<String>,

    /// Environment label (dev, staging, prod); auto-detected when omitted
    #[arg(long, value_name = "LABEL")]
    env: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file early to get LOG_LEVEL
    dotenv::dotenv().ok();
    init_tracing();

    let cli = Cli::try_parse().unwrap_or_else(|e| {
        let _ = e.print();
        std::process::exit(if e.use_stderr() { 1 } else { 0 });
    });

    let environment = cli.env.clone().unwrap_or_else(detect_environment);
    let settings = Settings::load(&environment);
    info!(
        "Chat Log Uploader v{} (environment: {environment})",
        env!("CARGO_PKG_VERSION")
    );

    let function_url = cli
        .function_url
        .clone()
        .or_else(|| {
            settings
                .get_str("lambda.functionUrl")
                .filter(|url| !url.is_empty())
        })
        .unwrap_or_else(|| {
            eprintln!(
                "{} Lambda function URL is required. Set LAMBDA_FUNCTION_URL or use --function-url.",
                style("Error:").red().bold()
            );
            std::process::exit(1);
        });

    let uploader = ChatLogUploader::new(function_url, UploaderOptions::from_settings(&settings))
        .context("Failed to construct uploader")?;

    let result = if cli.test {
        uploader
            .run_integration_test(&environment)
            .await
            .context("Content upload failed")
    } else if let Some(path) = &cli.upload {
        uploader
            .upload_from_path(path, Map::new())
            .await
            .context("Upload failed")
    } else {
        eprintln!(
            "{} Please specify --test or --upload. Use --help for usage information.",
            style("Error:").red().bold()
        );
        std::process::exit(1);
    };

    match result {
        Ok(result) => {
            println!(
                "\n{} Upload completed successfully!",
                style("✓").green().bold()
            );
            println!(
                "Upload details: {}",
                serde_json::to_string_pretty(&result)?
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("\n{} {:#}", style("✗").red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let log_level = std::env::var("LOG_LEVEL")
        .ok()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| "info".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(&log_level))
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();
}
