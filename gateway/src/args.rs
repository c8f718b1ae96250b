use std::path::PathBuf;

use clap::Parser;

/// Command-line entry point for the gateway binary.
#[derive(Debug, Parser)]
#[command(name = "gateway", version, about = "CLI-backed LLM gateway")]
pub struct Args {
    /// Path to the gateway's YAML configuration file.
    #[arg(short, long, env = "GATEWAY_CONFIG", default_value = "gateway.yaml")]
    pub config: PathBuf,

    /// Override the configured listen address (host:port).
    #[arg(long, env = "GATEWAY_LISTEN_ADDRESS")]
    pub listen_address: Option<String>,

    /// Override the configured log filter (e.g. "info", "gateway=debug").
    #[arg(long, env = "GATEWAY_LOG_FILTER")]
    pub log_filter: Option<String>,
}
