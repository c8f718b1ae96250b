//! Gateway configuration structures mapping the `gateway.yaml` configuration file.

#![deny(missing_docs)]

mod error;
mod job_manager;
mod loader;
mod provider;
mod server;
mod telemetry;

use std::path::Path;

pub use error::Error;
pub use job_manager::JobManagerConfig;
pub use provider::{
    AuthCommandsConfig, CommandSpecConfig, InputMode, ModelConfig, OutputMode, ProviderConfig, ProviderType,
    ResponseCommandConfig,
};
use serde::Deserialize;
pub use server::ServerConfig;
pub use telemetry::TelemetryConfig;

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Background job manager settings.
    pub job_manager: JobManagerConfig,
    /// Logging settings.
    pub telemetry: TelemetryConfig,
    /// Provider bindings (§6 of the specification).
    pub providers: Vec<ProviderConfig>,
}

impl Config {
    /// Load and validate configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        loader::load(path)
    }

    /// Validate invariants that are resolvable without a live registry:
    /// unique provider ids, unique model ids, at least one provider.
    pub fn validate(&self) -> anyhow::Result<()> {
        loader::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config: Config = serde_yaml::from_str("").unwrap();
        assert_eq!(config.server.listen_address, "0.0.0.0:8080");
        assert_eq!(config.job_manager.max_log_lines, 300);
        assert_eq!(config.telemetry.log_filter, "info");
        assert!(config.providers.is_empty());
    }
}
