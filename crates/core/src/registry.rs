//! Provider registry construction and the fallback-chain dispatcher (§4.5).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use config::ProviderConfig;
use jiff::Timestamp;

use crate::error::{Error, Result};
use crate::health::{FailureKind, HealthTracker, ModelStatsSnapshot};
use crate::model::UnifiedRequest;
use crate::provider::{BoundModel, Provider};
use crate::template::Engine;

/// Immutable, process-lifetime registry of providers and the models they expose.
///
/// Built once from config; reads never take a lock, matching §5's
/// "Provider/Model registry is immutable after construction".
pub struct Registry {
    providers: HashMap<String, Arc<Provider>>,
    model_owner: HashMap<String, String>,
    health: HealthTracker,
}

impl Registry {
    /// Validate and build the registry. Rejects an empty provider list,
    /// duplicate provider ids, and duplicate model ids across providers.
    pub fn build(provider_configs: Vec<ProviderConfig>, template_engine: Engine) -> Result<Self> {
        if provider_configs.is_empty() {
            return Err(Error::ConfigError("at least one provider must be configured".to_string()));
        }

        let mut providers = HashMap::new();
        let mut model_owner = HashMap::new();

        for config in provider_configs {
            let provider_id = config.id.clone();

            if providers.contains_key(&provider_id) {
                return Err(Error::ConfigError(format!("duplicate provider id: {provider_id}")));
            }

            let provider = Provider::from_config(config, template_engine.clone());

            for model_id in provider.model_ids() {
                if model_owner.insert(model_id.to_string(), provider_id.clone()).is_some() {
                    return Err(Error::ConfigError(format!("duplicate model id: {model_id}")));
                }
            }

            providers.insert(provider_id, Arc::new(provider));
        }

        let health = HealthTracker::new(model_owner.keys().cloned());

        Ok(Self { providers, model_owner, health })
    }

    pub fn health(&self) -> &HealthTracker {
        &self.health
    }

    pub fn get_provider(&self, provider_id: &str) -> Option<Arc<Provider>> {
        self.providers.get(provider_id).cloned()
    }

    pub fn list_providers(&self) -> impl Iterator<Item = Arc<Provider>> + '_ {
        self.providers.values().cloned()
    }

    pub fn list_models(&self) -> impl Iterator<Item = (&str, &str)> {
        self.model_owner.iter().map(|(model_id, provider_id)| (model_id.as_str(), provider_id.as_str()))
    }

    pub fn model_owner(&self, model_id: &str) -> Option<&str> {
        self.model_owner.get(model_id).map(String::as_str)
    }

    fn bound_model(&self, model_id: &str) -> Option<(Arc<Provider>, BoundModel)> {
        let provider_id = self.model_owner.get(model_id)?;
        let provider = self.providers.get(provider_id)?.clone();
        let bound = provider.model(model_id)?.clone();
        Some((provider, bound))
    }

    pub async fn model_stats_snapshot(&self, model_id: &str) -> Option<ModelStatsSnapshot> {
        self.health.snapshot(model_id).await
    }

    pub async fn all_model_stats_snapshots(&self) -> Vec<ModelStatsSnapshot> {
        self.health.snapshot_all().await
    }

    /// Run `model_id`, falling through its configured fallback chain on failure.
    ///
    /// `request` carries every field except `model`/`provider_model`, which this
    /// function fills in per attempt. The initial model being unknown fails
    /// immediately as [`Error::InvalidModel`] without consuming a fallback slot;
    /// a later dangling fallback instead terminates the chain as a
    /// [`Error::ConfigError`], folded into the final [`Error::ChainExhausted`].
    pub async fn run_model(&self, model_id: &str, mut request: UnifiedRequest) -> Result<crate::model::ProviderResult> {
        if !self.model_owner.contains_key(model_id) {
            return Err(Error::InvalidModel(model_id.to_string()));
        }

        let mut attempted: Vec<String> = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut current = Some(model_id.to_string());
        let mut last_error: Option<Error> = None;

        while let Some(current_model) = current.take() {
            if visited.contains(&current_model) {
                break;
            }
            visited.insert(current_model.clone());
            attempted.push(current_model.clone());

            let Some((provider, bound)) = self.bound_model(&current_model) else {
                self.health.record_attempt(&current_model).await;
                self.health.record_failure(&current_model, 0, "Configuration error: dangling fallback model reference").await;
                last_error = Some(Error::ConfigError(format!("Fallback model not found: {current_model}")));
                break;
            };

            request.model = current_model.clone();
            request.provider_model = bound.provider_model.clone();

            self.health.record_attempt(&current_model).await;
            let started_at = std::time::Instant::now();

            match provider.run(&request).await {
                Ok(result) => {
                    let duration_ms = started_at.elapsed().as_millis() as u64;
                    self.health.record_success(&current_model, duration_ms).await;
                    return Ok(result);
                }
                Err(error) => {
                    let duration_ms = started_at.elapsed().as_millis() as u64;
                    let kind = self.health.record_failure(&current_model, duration_ms, &error.to_string()).await;

                    // Upgrade provider-opaque errors the classifier recognizes as an upstream
                    // condition, so the HTTP layer can map them to a distinct status (§7.1)
                    // instead of a generic 502/504.
                    let error = match kind {
                        FailureKind::RateLimited | FailureKind::CapacityExhausted | FailureKind::QuotaExhausted | FailureKind::Auth => {
                            Error::Upstream { kind, message: error.to_string() }
                        }
                        _ => error,
                    };

                    let next = bound.fallback_models.iter().find(|candidate| !visited.contains(*candidate)).cloned();
                    last_error = Some(error);

                    match next {
                        Some(next_model) => {
                            self.health.record_fallback(&current_model, &next_model).await;
                            current = Some(next_model);
                        }
                        None => break,
                    }
                }
            }
        }

        let last_error = last_error.unwrap_or_else(|| Error::ConfigError("no attempts were made".to_string()));

        if attempted.len() <= 1 {
            Err(last_error)
        } else {
            Err(Error::ChainExhausted { chain: attempted.join(" -> "), last_error: last_error.to_string() })
        }
    }

    pub fn started_at(&self) -> Timestamp {
        self.health.started_at()
    }
}
