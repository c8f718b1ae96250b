use serde::Deserialize;

fn default_log_filter() -> String {
    "info".to_string()
}

/// Logging configuration. Metrics/trace export is out of this gateway's scope;
/// see DESIGN.md.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    /// `logforth` `EnvFilter` string, e.g. `"info"` or `"core=debug,server=info"`.
    pub log_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
        }
    }
}
