//! ARM deployment agent - Entry Point
//!
//! Reads an install payload on stdin and deploys the Azure Resource Manager
//! template it describes.

use std::collections::HashMap;
use std::env;
use std::process::ExitCode;

use armagent::app::config::Config;
use armagent::app::options::AgentOptions;
use armagent::app::run::install;
use armagent::logs::{init_logging, LogOptions};
use armagent::utils::version_info;

use tokio::io::AsyncReadExt;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else {
            // Handle flags and subcommands like --version or install
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Failed to serialize version: {e}");
                return ExitCode::FAILURE;
            }
        }
        return ExitCode::SUCCESS;
    }

    if !cli_args.contains_key("install") {
        eprintln!("Usage: armagent install < payload.yaml");
        eprintln!("       armagent --version");
        return ExitCode::FAILURE;
    }

    // Initialize logging
    if let Err(e) = init_logging(LogOptions::from_env()) {
        eprintln!("Failed to initialize logging: {e}");
    }
    info!(version = %version.version, git_hash = %version.git_hash, "Starting armagent");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut payload = Vec::new();
    if let Err(e) = tokio::io::stdin().read_to_end(&mut payload).await {
        error!("Unable to read the install payload: {e}");
        return ExitCode::FAILURE;
    }

    match install(&payload, config, AgentOptions::default()).await {
        Ok(report) => {
            info!(state = ?report.state, "Install completed");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Install failed: {e}");
            ExitCode::FAILURE
        }
    }
}
