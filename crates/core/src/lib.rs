//! Protocol-agnostic core: templating, CLI execution, output parsing, provider
//! binding, health tracking, background jobs, and the fallback dispatcher.
//!
//! The `server` crate is the only thing in this workspace that speaks HTTP or
//! OpenAI's wire format; everything here operates on [`model::UnifiedRequest`]
//! and [`model::ProviderResult`].

mod error;
mod executor;
mod health;
mod job;
mod model;
mod parser;
mod provider;
mod registry;
mod template;

pub use error::{Error, Result};
pub use health::{FailureEvent, FailureKind, ModelStatsSnapshot, SuggestedState};
pub use job::{ExecutableGate, JobManager, JobStatus, JobSummary};
pub use model::{
    dedup_tool_definitions, synthesize_tool_call_id, ChatMessage, CommandSpec, FinishReason, ProviderResult, Role,
    ToolCall, ToolDefinition, UnifiedRequest,
};
pub use provider::{CommandProbe, Provider, ProviderId};
pub use registry::Registry;
pub use template::Engine;

/// Everything the `server` crate needs to answer a request: the provider
/// registry (dispatch + health) and the background job manager.
pub struct Core {
    pub registry: Registry,
    pub jobs: JobManager,
}

impl Core {
    /// Build the registry and job manager from a loaded [`config::Config`].
    ///
    /// The template engine is shared across every provider: user-controlled
    /// values (currently just `prompt`) are never shell-escaped since commands
    /// are exec'd directly, never through a shell (§4.1/§4.2).
    pub fn build(config: &config::Config) -> Result<Self> {
        let template_engine = Engine::new();
        let registry = Registry::build(config.providers.clone(), template_engine)?;
        let jobs = JobManager::new(&config.job_manager);

        Ok(Self { registry, jobs })
    }
}
