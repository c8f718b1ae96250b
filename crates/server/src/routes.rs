//! Route handlers translating HTTP to/from the core's types (§6.1).

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::admin::{HealthResponse, JobsResponse, ProviderStatusResponse, ProviderSummary, ProvidersResponse};
use crate::error::{ApiError, ApiResult};
use crate::wire::{ChatCompletionRequest, ChatCompletionResponse, ModelCard, ModelsResponse};
use crate::AppState;

pub async fn health() -> &'static str {
    "ok"
}

pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatCompletionRequest>,
) -> ApiResult<Json<ChatCompletionResponse>> {
    let request_id = Uuid::new_v4().to_string();
    let model = request.model.clone();
    let unified = request.into_unified(request_id.clone())?;

    let result = state.core.registry.run_model(&model, unified).await?;
    let created = jiff::Timestamp::now().as_second();

    Ok(Json(ChatCompletionResponse::from_result(request_id, created, model, result)))
}

pub async fn list_models(State(state): State<Arc<AppState>>) -> Json<ModelsResponse> {
    let data = state
        .core
        .registry
        .list_models()
        .map(|(model_id, provider_id)| ModelCard { id: model_id.to_string(), object: "model", owned_by: provider_id.to_string() })
        .collect();

    Json(ModelsResponse { object: "list", data })
}

pub async fn list_providers(State(state): State<Arc<AppState>>) -> Json<ProvidersResponse> {
    let providers = state
        .core
        .registry
        .list_providers()
        .map(|provider| ProviderSummary { id: provider.id().to_string(), models: provider.model_ids().map(str::to_string).collect() })
        .collect();

    Json(ProvidersResponse { providers })
}

pub async fn provider_status(State(state): State<Arc<AppState>>, Path(provider_id): Path<String>) -> ApiResult<Json<ProviderStatusResponse>> {
    let provider = state.core.registry.get_provider(&provider_id).ok_or(ApiError::ProviderNotFound(provider_id))?;
    Ok(Json(provider.check_auth_status().await.into()))
}

pub async fn provider_rate_limits(
    State(state): State<Arc<AppState>>,
    Path(provider_id): Path<String>,
) -> ApiResult<Json<ProviderStatusResponse>> {
    let provider = state.core.registry.get_provider(&provider_id).ok_or(ApiError::ProviderNotFound(provider_id))?;
    Ok(Json(provider.check_rate_limits().await.into()))
}

pub async fn provider_login(State(state): State<Arc<AppState>>, Path(provider_id): Path<String>) -> ApiResult<Json<core::JobSummary>> {
    let provider = state.core.registry.get_provider(&provider_id).ok_or(ApiError::ProviderNotFound(provider_id))?;
    let summary = provider.start_login_job(&state.core.jobs).await?;
    Ok(Json(summary))
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    #[serde(default = "default_jobs_limit")]
    pub limit: usize,
}

fn default_jobs_limit() -> usize {
    50
}

pub async fn list_jobs(State(state): State<Arc<AppState>>, Query(query): Query<ListJobsQuery>) -> Json<JobsResponse> {
    Json(JobsResponse { jobs: state.core.jobs.list_jobs(query.limit).await })
}

pub async fn get_job(State(state): State<Arc<AppState>>, Path(job_id): Path<Uuid>) -> ApiResult<Json<core::JobSummary>> {
    state
        .core
        .jobs
        .get_job(job_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::JobNotFound(job_id.to_string()))
}

pub async fn health_snapshot(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        started_at: state.core.registry.started_at().to_string(),
        fallback_transitions: state.core.registry.health().fallback_transitions(),
        models: state.core.registry.all_model_stats_snapshots().await,
    })
}

pub async fn model_health_snapshot(State(state): State<Arc<AppState>>, Path(model_id): Path<String>) -> ApiResult<Json<core::ModelStatsSnapshot>> {
    state
        .core
        .registry
        .model_stats_snapshot(&model_id)
        .await
        .map(Json)
        .ok_or(ApiError::ModelNotFound(model_id))
}
