use serde::Deserialize;

fn default_max_log_lines() -> usize {
    300
}

/// Settings for the background job manager (§4.6): login jobs and generic-CLI jobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobManagerConfig {
    /// Ring-buffer cap on retained log lines per job.
    pub max_log_lines: usize,
    /// Basename allow-list gating the generic-CLI job variant. Empty means "deny all".
    pub allowed_executables: Vec<String>,
}

impl Default for JobManagerConfig {
    fn default() -> Self {
        Self {
            max_log_lines: default_max_log_lines(),
            allowed_executables: Vec::new(),
        }
    }
}
