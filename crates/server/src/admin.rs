//! Thin serializations of the core's snapshot types, backing `/admin/*` (§3.1, §6.1).

use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ProviderSummary {
    pub id: String,
    pub models: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ProvidersResponse {
    pub providers: Vec<ProviderSummary>,
}

#[derive(Debug, Serialize)]
pub struct ProviderStatusResponse {
    pub ok: bool,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl From<core::CommandProbe> for ProviderStatusResponse {
    fn from(probe: core::CommandProbe) -> Self {
        Self { ok: probe.ok, exit_code: probe.exit_code, signal: probe.signal, stdout: probe.stdout, stderr: probe.stderr }
    }
}

#[derive(Debug, Serialize)]
pub struct JobsResponse {
    pub jobs: Vec<core::JobSummary>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub started_at: String,
    pub fallback_transitions: u64,
    pub models: Vec<core::ModelStatsSnapshot>,
}
