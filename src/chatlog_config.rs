mod config;

use clap::Parser;
use console::style;
use serde_json::Value;

use config::{Settings, detect_environment};

#[derive(Parser, Debug)]
#[command(
    name = "chatlog-config",
    version = env!("CARGO_PKG_VERSION"),
    about = "Inspect and validate chat-log uploader configuration",
    after_help = "Examples:\n  \
                  chatlog-config --validate\n  \
                  chatlog-config --export\n  \
                  chatlog-config --get lambda.functionUrl"
)]
struct Cli {
    /// Validate required configuration
    #[arg(long)]
    validate: bool,

    /// Export the merged configuration as JSON
    #[arg(long)]
    export: bool,

    /// Include sensitive information in the export
    #[arg(long)]
    include_secrets: bool,

    /// Print a single configuration value by dotted path
    #[arg(long, value_name = "PATH")]
    get: Option<String>,

    /// Environment label (dev, staging, prod); auto-detected when omitted
    #[arg(long, value_name = "LABEL")]
    env: Option<String>,
}

fn main() {
    dotenv::dotenv().ok();
    init_tracing();

    let cli = Cli::try_parse().unwrap_or_else(|e| {
        let _ = e.print();
        std::process::exit(if e.use_stderr() { 1 } else { 0 });
    });

    let environment = cli.env.clone().unwrap_or_else(detect_environment);
    let settings = Settings::load(&environment);

    if cli.validate {
        match settings.validate() {
            Ok(()) => println!("{} Configuration is valid", style("✓").green()),
            Err(e) => {
                eprintln!(
                    "{} Configuration validation failed: {e}",
                    style("✗").red()
                );
                std::process::exit(1);
            }
        }
    } else if cli.export {
        match settings.export_json(cli.include_secrets) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("{} Export failed: {e}", style("✗").red());
                std::process::exit(1);
            }
        }
    } else if let Some(path) = &cli.get {
        match settings.get(path) {
            // strings print raw, everything else as JSON
            Some(Value::String(s)) => println!("{s}"),
            Some(value) => println!("{value}"),
            None => println!("undefined"),
        }
    } else {
        print_usage(settings.environment());
    }
}

fn print_usage(environment: &str) {
    println!(
        "\
Configuration Management Utility

Usage: chatlog-config [OPTIONS]

Options:
  --validate              Validate configuration
  --export                Export configuration as JSON
  --include-secrets       Include sensitive information in export
  --get <PATH>            Get specific configuration value

Environment: {environment}

Examples:
  chatlog-config --validate
  chatlog-config --export
  chatlog-config --get lambda.functionUrl"
    );
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
