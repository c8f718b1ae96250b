//! Model-health tracking: failure classification, per-model stats, cooldowns (§4.7).

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

const FAILURE_RING_CAPACITY: usize = 200;
const FAILURE_MESSAGE_MAX_CHARS: usize = 1200;

/// The reason an invocation was counted as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidModel,
    Config,
    QuotaExhausted,
    CapacityExhausted,
    RateLimited,
    Timeout,
    Auth,
    ProviderExit,
    Unknown,
}

impl FailureKind {
    /// Every variant, used to seed per-kind counters and iterate failure tables.
    const ALL: [FailureKind; 9] = [
        FailureKind::InvalidModel,
        FailureKind::Config,
        FailureKind::QuotaExhausted,
        FailureKind::CapacityExhausted,
        FailureKind::RateLimited,
        FailureKind::Timeout,
        FailureKind::Auth,
        FailureKind::ProviderExit,
        FailureKind::Unknown,
    ];
}

/// Classify a provider failure message by ordered substring match (§4.7).
///
/// Case-insensitive, evaluated in this fixed precedence order; the first rule
/// to match wins even if a later rule's substring also appears.
pub fn classify(message: &str) -> FailureKind {
    let lower = message.to_lowercase();

    const RULES: &[(FailureKind, &[&str])] = &[
        (FailureKind::InvalidModel, &["unknown model:"]),
        (
            FailureKind::Config,
            &["fallback model not found", "duplicate model id", "does not expose model"],
        ),
        (
            FailureKind::QuotaExhausted,
            &["insufficient_quota", "quota", "billing", "credit balance", "out of credits"],
        ),
        (
            FailureKind::CapacityExhausted,
            &[
                "resource_exhausted",
                "capacity",
                "model exhausted",
                "overloaded",
                "no available",
                "temporarily unavailable",
            ],
        ),
        (
            FailureKind::RateLimited,
            &["rate limit", "too many requests", "status code: 429", "http 429", "retry later"],
        ),
        (FailureKind::Timeout, &["timed out", "timeout"]),
        (
            FailureKind::Auth,
            &[
                "unauthorized",
                "forbidden",
                "invalid api key",
                "authentication",
                "not authenticated",
                "permission denied",
                "access denied",
            ],
        ),
        (FailureKind::ProviderExit, &["provider command"]),
    ];

    for (kind, needles) in RULES {
        if needles.iter().any(|needle| lower.contains(needle)) {
            return *kind;
        }
    }

    FailureKind::Unknown
}

/// Base cooldown in seconds for a failure kind, before the consecutive-failure multiplier.
fn base_cooldown_secs(kind: FailureKind) -> u64 {
    match kind {
        FailureKind::RateLimited => 60,
        FailureKind::CapacityExhausted => 120,
        FailureKind::QuotaExhausted => 3600,
        FailureKind::Timeout => 30,
        FailureKind::Auth => 600,
        FailureKind::ProviderExit | FailureKind::Config | FailureKind::InvalidModel | FailureKind::Unknown => 0,
    }
}

/// Coarse state an admin endpoint or dispatcher can act on without reading raw stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedState {
    RateLimited,
    CapacityExhausted,
    QuotaExhausted,
    AuthBlocked,
    Cooldown,
    Degraded,
    Healthy,
}

/// One entry in the global failure ring buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureEvent {
    pub model_id: String,
    pub kind: FailureKind,
    pub message: String,
    pub occurred_at: Timestamp,
}

/// Read-only view of a model's stats, suitable for an admin dashboard response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStatsSnapshot {
    pub model_id: String,
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub failures_by_kind: HashMap<FailureKind, u64>,
    pub consecutive_failures: u32,
    pub average_attempt_duration_ms: f64,
    pub average_success_duration_ms: f64,
    pub last_attempt_at: Option<Timestamp>,
    pub last_success_at: Option<Timestamp>,
    pub last_failure_at: Option<Timestamp>,
    pub last_failure_kind: Option<FailureKind>,
    pub last_failure_message: Option<String>,
    pub fallback_in_count: u64,
    pub fallback_out_count: u64,
    pub cooldown_remaining_secs: u64,
    pub suggested_state: SuggestedState,
}

/// Mutable per-model counters. Guarded by a per-model lock in the registry
/// (a `DashMap<String, Mutex<ModelStats>>`), never one lock for the whole map.
#[derive(Debug, Clone)]
pub struct ModelStats {
    attempts: u64,
    successes: u64,
    failures: u64,
    failures_by_kind: HashMap<FailureKind, u64>,
    consecutive_failures: u32,
    consecutive_by_kind: HashMap<FailureKind, u32>,
    cumulative_attempt_duration_ms: u64,
    cumulative_success_duration_ms: u64,
    last_attempt_at: Option<Timestamp>,
    last_success_at: Option<Timestamp>,
    last_failure_at: Option<Timestamp>,
    last_failure_kind: Option<FailureKind>,
    last_failure_message: Option<String>,
    fallback_in_count: u64,
    fallback_out_count: u64,
}

impl Default for ModelStats {
    fn default() -> Self {
        Self {
            attempts: 0,
            successes: 0,
            failures: 0,
            failures_by_kind: HashMap::new(),
            consecutive_failures: 0,
            consecutive_by_kind: FailureKind::ALL.into_iter().map(|kind| (kind, 0)).collect(),
            cumulative_attempt_duration_ms: 0,
            cumulative_success_duration_ms: 0,
            last_attempt_at: None,
            last_success_at: None,
            last_failure_at: None,
            last_failure_kind: None,
            last_failure_message: None,
            fallback_in_count: 0,
            fallback_out_count: 0,
        }
    }
}

impl ModelStats {
    pub fn record_attempt(&mut self, now: Timestamp) {
        self.attempts += 1;
        self.last_attempt_at = Some(now);
    }

    pub fn record_success(&mut self, now: Timestamp, duration_ms: u64) {
        self.successes += 1;
        self.cumulative_success_duration_ms += duration_ms;
        self.consecutive_failures = 0;
        for count in self.consecutive_by_kind.values_mut() {
            *count = 0;
        }
        self.last_success_at = Some(now);
    }

    /// Classify `message`, record the failure, and return the classified kind.
    pub fn record_failure(&mut self, now: Timestamp, duration_ms: u64, message: &str) -> FailureKind {
        let kind = classify(message);

        self.failures += 1;
        self.cumulative_attempt_duration_ms += duration_ms;
        *self.failures_by_kind.entry(kind).or_insert(0) += 1;
        self.consecutive_failures += 1;

        for (candidate, count) in self.consecutive_by_kind.iter_mut() {
            *count = if *candidate == kind { *count + 1 } else { 0 };
        }

        let mut truncated = message.to_string();
        if truncated.chars().count() > FAILURE_MESSAGE_MAX_CHARS {
            truncated = truncated.chars().take(FAILURE_MESSAGE_MAX_CHARS).collect();
        }

        self.last_failure_at = Some(now);
        self.last_failure_kind = Some(kind);
        self.last_failure_message = Some(truncated);

        kind
    }

    pub fn record_fallback_out(&mut self) {
        self.fallback_out_count += 1;
    }

    pub fn record_fallback_in(&mut self) {
        self.fallback_in_count += 1;
    }

    /// Remaining cooldown in whole seconds, rounded up; zero once expired.
    fn cooldown_remaining_secs(&self, now: Timestamp) -> u64 {
        let Some(kind) = self.last_failure_kind else { return 0 };
        let Some(last_failure_at) = self.last_failure_at else { return 0 };

        let base = base_cooldown_secs(kind);
        if base == 0 {
            return 0;
        }

        let multiplier = self.consecutive_by_kind.get(&kind).copied().unwrap_or(1).clamp(1, 8) as u64;
        let cooldown_ms = base * 1000 * multiplier;

        let elapsed_ms = now.duration_since(last_failure_at).as_millis().max(0) as u64;
        if elapsed_ms >= cooldown_ms {
            return 0;
        }

        (cooldown_ms - elapsed_ms).div_ceil(1000)
    }

    fn suggested_state(&self, now: Timestamp) -> SuggestedState {
        let remaining = self.cooldown_remaining_secs(now);

        if remaining > 0 {
            return match self.last_failure_kind {
                Some(FailureKind::RateLimited) => SuggestedState::RateLimited,
                Some(FailureKind::CapacityExhausted) => SuggestedState::CapacityExhausted,
                Some(FailureKind::QuotaExhausted) => SuggestedState::QuotaExhausted,
                Some(FailureKind::Auth) => SuggestedState::AuthBlocked,
                _ => SuggestedState::Cooldown,
            };
        }

        let failure_rate = if self.attempts == 0 {
            0.0
        } else {
            self.failures as f64 / self.attempts as f64
        };

        if self.attempts >= 6 && failure_rate >= 0.5 {
            return SuggestedState::Degraded;
        }

        SuggestedState::Healthy
    }

    pub fn snapshot(&self, model_id: impl Into<String>, now: Timestamp) -> ModelStatsSnapshot {
        let average = |total_ms: u64, count: u64| {
            if count == 0 {
                0.0
            } else {
                total_ms as f64 / count as f64
            }
        };

        ModelStatsSnapshot {
            model_id: model_id.into(),
            attempts: self.attempts,
            successes: self.successes,
            failures: self.failures,
            failures_by_kind: self.failures_by_kind.clone(),
            consecutive_failures: self.consecutive_failures,
            average_attempt_duration_ms: average(self.cumulative_attempt_duration_ms, self.failures),
            average_success_duration_ms: average(self.cumulative_success_duration_ms, self.successes),
            last_attempt_at: self.last_attempt_at,
            last_success_at: self.last_success_at,
            last_failure_at: self.last_failure_at,
            last_failure_kind: self.last_failure_kind,
            last_failure_message: self.last_failure_message.clone(),
            fallback_in_count: self.fallback_in_count,
            fallback_out_count: self.fallback_out_count,
            cooldown_remaining_secs: self.cooldown_remaining_secs(now),
            suggested_state: self.suggested_state(now),
        }
    }
}

/// Bounded, most-recent-first log of failures across every model, used by the
/// admin health endpoint for incident triage without re-deriving it from stats.
#[derive(Debug, Default)]
pub struct FailureRing {
    events: Mutex<VecDeque<FailureEvent>>,
}

impl FailureRing {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(FAILURE_RING_CAPACITY)),
        }
    }

    pub async fn push(&self, event: FailureEvent) {
        let mut events = self.events.lock().await;
        if events.len() == FAILURE_RING_CAPACITY {
            events.pop_back();
        }
        events.push_front(event);
    }

    pub async fn snapshot(&self) -> Vec<FailureEvent> {
        self.events.lock().await.iter().cloned().collect()
    }
}

/// Process-wide health state: one striped lock per model plus the global
/// failure ring and fallback-transition counter (§4.7, §5).
pub struct HealthTracker {
    started_at: Timestamp,
    stats: DashMap<String, Mutex<ModelStats>>,
    failure_ring: FailureRing,
    fallback_transitions: AtomicU64,
}

impl HealthTracker {
    pub fn new(model_ids: impl IntoIterator<Item = String>) -> Self {
        let stats = DashMap::new();
        for model_id in model_ids {
            stats.insert(model_id, Mutex::new(ModelStats::default()));
        }

        Self {
            started_at: Timestamp::now(),
            stats,
            failure_ring: FailureRing::new(),
            fallback_transitions: AtomicU64::new(0),
        }
    }

    pub async fn record_attempt(&self, model_id: &str) {
        if let Some(entry) = self.stats.get(model_id) {
            entry.lock().await.record_attempt(Timestamp::now());
        }
    }

    pub async fn record_success(&self, model_id: &str, duration_ms: u64) {
        if let Some(entry) = self.stats.get(model_id) {
            entry.lock().await.record_success(Timestamp::now(), duration_ms);
        }
    }

    /// Classify `message`, record the failure against `model_id`, push it to the
    /// global ring, and return the classified kind.
    pub async fn record_failure(&self, model_id: &str, duration_ms: u64, message: &str) -> FailureKind {
        let now = Timestamp::now();

        let kind = if let Some(entry) = self.stats.get(model_id) {
            entry.lock().await.record_failure(now, duration_ms, message)
        } else {
            classify(message)
        };

        self.failure_ring
            .push(FailureEvent { model_id: model_id.to_string(), kind, message: message.to_string(), occurred_at: now })
            .await;

        kind
    }

    pub async fn record_fallback(&self, from_model: &str, to_model: &str) {
        if let Some(entry) = self.stats.get(from_model) {
            entry.lock().await.record_fallback_out();
        }
        if let Some(entry) = self.stats.get(to_model) {
            entry.lock().await.record_fallback_in();
        }
        self.fallback_transitions.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn snapshot(&self, model_id: &str) -> Option<ModelStatsSnapshot> {
        let entry = self.stats.get(model_id)?;
        Some(entry.lock().await.snapshot(model_id, Timestamp::now()))
    }

    pub async fn snapshot_all(&self) -> Vec<ModelStatsSnapshot> {
        let mut snapshots = Vec::with_capacity(self.stats.len());
        for entry in self.stats.iter() {
            let snapshot = entry.value().lock().await.snapshot(entry.key().clone(), Timestamp::now());
            snapshots.push(snapshot);
        }
        snapshots
    }

    pub async fn recent_failures(&self) -> Vec<FailureEvent> {
        self.failure_ring.snapshot().await
    }

    pub fn fallback_transitions(&self) -> u64 {
        self.fallback_transitions.load(Ordering::Relaxed)
    }

    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(epoch_secs: i64) -> Timestamp {
        Timestamp::from_second(epoch_secs).unwrap()
    }

    #[test]
    fn classifies_invalid_model_before_config() {
        assert_eq!(classify("Unknown model: gpt-9"), FailureKind::InvalidModel);
    }

    #[test]
    fn classifies_quota_before_capacity_even_when_both_substrings_present() {
        assert_eq!(classify("quota exceeded, capacity also low"), FailureKind::QuotaExhausted);
    }

    #[test]
    fn classifies_rate_limited_over_generic_timeout_wording() {
        assert_eq!(classify("rate limit hit, request will timeout"), FailureKind::RateLimited);
    }

    #[test]
    fn classifies_provider_exit_last_before_unknown() {
        assert_eq!(classify("provider command exited with status 1"), FailureKind::ProviderExit);
    }

    #[test]
    fn falls_back_to_unknown() {
        assert_eq!(classify("the sky is falling"), FailureKind::Unknown);
    }

    #[test]
    fn truncates_failure_message_to_1200_chars() {
        let mut stats = ModelStats::default();
        let long_message = "x".repeat(2000);
        stats.record_failure(ts(0), 10, &long_message);
        assert_eq!(stats.last_failure_message.unwrap().chars().count(), FAILURE_MESSAGE_MAX_CHARS);
    }

    #[test]
    fn cooldown_scales_with_per_kind_consecutive_failures_and_clamps_at_eight() {
        let mut stats = ModelStats::default();
        for _ in 0..20 {
            stats.record_failure(ts(0), 10, "rate limit exceeded");
        }

        // clamp(20, 1, 8) * 60s = 480s
        assert_eq!(stats.cooldown_remaining_secs(ts(0)), 480);
    }

    #[test]
    fn interleaved_failure_kinds_reset_each_others_consecutive_counter() {
        let mut stats = ModelStats::default();
        stats.record_failure(ts(0), 10, "rate limit exceeded");
        stats.record_failure(ts(0), 10, "rate limit exceeded");
        stats.record_failure(ts(0), 10, "request timed out");

        // The timeout failure reset rate_limited's streak to 0 and started its own at 1.
        assert_eq!(stats.cooldown_remaining_secs(ts(0)), 30);
    }

    #[test]
    fn cooldown_expires_once_enough_time_has_passed() {
        let mut stats = ModelStats::default();
        stats.record_failure(ts(0), 10, "request timed out");
        assert_eq!(stats.cooldown_remaining_secs(ts(30)), 0);
    }

    #[test]
    fn suggested_state_healthy_with_no_history() {
        let stats = ModelStats::default();
        assert_eq!(stats.suggested_state(ts(0)), SuggestedState::Healthy);
    }

    #[test]
    fn suggested_state_degrades_past_six_attempts_at_half_failure_rate() {
        let mut stats = ModelStats::default();
        for _ in 0..3 {
            stats.record_attempt(ts(0));
            stats.record_success(ts(0), 10);
        }
        for _ in 0..3 {
            stats.record_attempt(ts(0));
            stats.record_failure(ts(0), 10, "provider command exited with status 1");
        }
        assert_eq!(stats.suggested_state(ts(1_000_000)), SuggestedState::Degraded);
    }

    #[tokio::test]
    async fn failure_ring_evicts_oldest_past_capacity() {
        let ring = FailureRing::new();
        for i in 0..(FAILURE_RING_CAPACITY + 5) {
            ring.push(FailureEvent {
                model_id: "m1".into(),
                kind: FailureKind::Unknown,
                message: format!("failure {i}"),
                occurred_at: ts(i as i64),
            })
            .await;
        }

        let snapshot = ring.snapshot().await;
        assert_eq!(snapshot.len(), FAILURE_RING_CAPACITY);
        assert_eq!(snapshot[0].message, format!("failure {}", FAILURE_RING_CAPACITY + 4));
    }

    #[tokio::test]
    async fn tracker_records_fallback_transitions_on_both_models() {
        let tracker = HealthTracker::new(["m1".to_string(), "m2".to_string()]);
        tracker.record_fallback("m1", "m2").await;

        let from_snapshot = tracker.snapshot("m1").await.unwrap();
        let to_snapshot = tracker.snapshot("m2").await.unwrap();
        assert_eq!(from_snapshot.fallback_out_count, 1);
        assert_eq!(to_snapshot.fallback_in_count, 1);
        assert_eq!(tracker.fallback_transitions(), 1);
    }

    #[tokio::test]
    async fn tracker_ignores_updates_for_unregistered_models() {
        let tracker = HealthTracker::new(["m1".to_string()]);
        tracker.record_attempt("unregistered").await;
        assert!(tracker.snapshot("unregistered").await.is_none());
    }
}
