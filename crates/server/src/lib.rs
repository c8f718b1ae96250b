//! Gateway server library: an Axum router exposing the OpenAI-compatible and
//! admin endpoints, translating HTTP to/from `core`'s types.

#![deny(missing_docs)]

mod admin;
mod auth;
mod error;
mod routes;
mod wire;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::anyhow;
use axum::routing::{get, post};
use axum::Router;
use config::Config;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

/// Shared state handed to every route handler.
pub struct AppState {
    config: Config,
    core: core::Core,
}

/// Everything needed to start serving.
pub struct ServeConfig {
    /// Socket address the server binds to.
    pub listen_address: SocketAddr,
    /// The loaded and validated gateway configuration.
    pub config: Config,
    /// Version string logged once at startup.
    pub version: String,
    /// Resolved on successful bind, so the caller learns the address when port 0 was requested.
    pub bound_addr_sender: Option<tokio::sync::oneshot::Sender<SocketAddr>>,
}

/// Assemble the route table: `/health` is unauthenticated, everything else
/// runs behind [`auth::require_bearer_token`].
fn build_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/v1/chat/completions", post(routes::chat_completions))
        .route("/v1/models", get(routes::list_models))
        .route("/admin/providers", get(routes::list_providers))
        .route("/admin/providers/{id}/status", get(routes::provider_status))
        .route("/admin/providers/{id}/rate-limits", get(routes::provider_rate_limits))
        .route("/admin/providers/{id}/login", post(routes::provider_login))
        .route("/admin/jobs", get(routes::list_jobs))
        .route("/admin/jobs/{id}", get(routes::get_job))
        .route("/admin/health", get(routes::health_snapshot))
        .route("/admin/health/{modelId}", get(routes::model_health_snapshot))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), auth::require_bearer_token));

    Router::new().route("/health", get(routes::health)).merge(protected).layer(CorsLayer::permissive()).with_state(state)
}

/// Build the core from `config` and serve until a shutdown signal arrives.
pub async fn serve(
    ServeConfig { listen_address, config, version, bound_addr_sender }: ServeConfig,
) -> anyhow::Result<()> {
    log::info!("gateway {version}");

    let gateway_core = core::Core::build(&config).map_err(|err| anyhow!("failed to build provider registry: {err}"))?;
    let state = Arc::new(AppState { config, core: gateway_core });
    let app = build_router(state);

    let listener = TcpListener::bind(listen_address)
        .await
        .map_err(|err| anyhow!("failed to bind to {listen_address}: {err}"))?;

    if let Some(sender) = bound_addr_sender {
        let _ = sender.send(listener.local_addr()?);
    }

    log::info!("listening on {listen_address}");

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        log::info!("received shutdown signal, shutting down gracefully");
    };

    axum::serve(listener, app).with_graceful_shutdown(shutdown).await.map_err(|err| anyhow!("server error: {err}"))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use secrecy::SecretString;
    use tower::ServiceExt;

    use super::*;

    fn test_config(api_key: Option<&str>) -> Config {
        let mut config = Config::default();
        config.server.api_key = api_key.map(|key| SecretString::from(key.to_string()));
        config.providers = vec![config::ProviderConfig {
            id: "echo".to_string(),
            provider_type: config::ProviderType::Cli,
            description: None,
            models: vec![config::ModelConfig {
                id: "echo-model".to_string(),
                provider_model: None,
                description: None,
                fallback_models: Vec::new(),
            }],
            response_command: config::ResponseCommandConfig {
                command: config::CommandSpecConfig {
                    executable: "/bin/echo".to_string(),
                    args: Vec::new(),
                    env: None,
                    cwd: None,
                    timeout_ms: 5_000,
                },
                input: config::InputMode::PromptStdin,
                output: config::OutputMode::TextPlain,
            },
            auth: None,
        }];
        config
    }

    fn test_router(api_key: Option<&str>) -> Router {
        let config = test_config(api_key);
        let gateway_core = core::Core::build(&config).expect("test config builds a valid registry");
        build_router(Arc::new(AppState { config, core: gateway_core }))
    }

    #[tokio::test]
    async fn health_is_reachable_without_a_token() {
        let response =
            test_router(Some("secret")).oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn protected_routes_reject_a_missing_token_when_an_api_key_is_configured() {
        let response =
            test_router(Some("secret")).oneshot(Request::builder().uri("/v1/models").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn protected_routes_accept_the_configured_bearer_token() {
        let request = Request::builder().uri("/v1/models").header("authorization", "Bearer secret").body(Body::empty()).unwrap();
        let response = test_router(Some("secret")).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn protected_routes_are_open_when_no_api_key_is_configured() {
        let response =
            test_router(None).oneshot(Request::builder().uri("/v1/models").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
