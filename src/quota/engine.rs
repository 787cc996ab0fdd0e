//! Core quota evaluation engine.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::window::WindowRecord;
use crate::config::QuotaConfig;
use crate::store::{StoreError, WindowStore};

/// Failure modes of a quota evaluation.
#[derive(Debug, Error)]
pub enum QuotaError {
    /// The window store could not serve the evaluation. Callers must fail
    /// closed rather than admit unmetered traffic.
    #[error("window store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<StoreError> for QuotaError {
    fn from(err: StoreError) -> Self {
        QuotaError::StoreUnavailable(err.to_string())
    }
}

/// The outcome of one quota evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request may proceed
    pub admitted: bool,
    /// Requests left in the window after this decision
    pub remaining: u32,
    /// Unix timestamp at which the window resets
    pub resets_at: i64,
}

/// A non-consuming view of a client's current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowStatus {
    /// Quota ceiling per window
    pub limit: u32,
    /// Requests left in the current window
    pub remaining: u32,
    /// Unix timestamp at which the window resets
    pub reset: i64,
}

/// The engine applying the fixed-window algorithm against the shared
/// window store.
///
/// Evaluations for the same client identifier are strictly ordered through a
/// striped lock, so two concurrent requests can never both observe and spend
/// the last remaining slot. Evaluations for distinct clients do not contend.
#[derive(Clone)]
pub struct QuotaEngine {
    /// Shared window store holding one record per client
    store: Arc<dyn WindowStore>,
    /// Immutable quota policy, fixed at construction
    quota: QuotaConfig,
    /// Per-client serialization points for the load-decide-persist sequence
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl QuotaEngine {
    /// Create an engine enforcing `quota` against `store`.
    pub fn new(store: Arc<dyn WindowStore>, quota: QuotaConfig) -> Self {
        Self {
            store,
            quota,
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Get the quota policy this engine enforces.
    pub fn quota(&self) -> &QuotaConfig {
        &self.quota
    }

    /// Whether the backing window store is currently reachable.
    pub async fn store_ready(&self) -> bool {
        self.store.is_ready().await
    }

    /// Decide whether to admit a request from `client_id` arriving at `now`.
    ///
    /// The load-decide-persist sequence runs on its own task: an abandoned
    /// request must not leave a half-applied decrement behind.
    pub async fn evaluate(&self, client_id: &str, now: i64) -> Result<Decision, QuotaError> {
        let engine = self.clone();
        let client = client_id.to_string();
        match tokio::spawn(async move { engine.evaluate_serialized(&client, now).await }).await {
            Ok(decision) => decision,
            Err(e) => Err(QuotaError::StoreUnavailable(format!(
                "evaluation task failed: {}",
                e
            ))),
        }
    }

    async fn evaluate_serialized(
        &self,
        client_id: &str,
        now: i64,
    ) -> Result<Decision, QuotaError> {
        let lock = self.locks.entry(client_id.to_string()).or_default().clone();
        let _serialized = lock.lock().await;

        let active = self
            .store
            .load(client_id)
            .await?
            .filter(|record| record.is_active(now));

        let decision = match active {
            Some(record) if record.remaining == 0 => {
                debug!(client_id, resets_at = record.expires_at, "Quota exhausted");
                // nothing changed; skip the write
                Decision {
                    admitted: false,
                    remaining: 0,
                    resets_at: record.expires_at,
                }
            }
            Some(mut record) => {
                record.remaining -= 1;
                self.persist(client_id, &record).await;
                Decision {
                    admitted: true,
                    remaining: record.remaining,
                    resets_at: record.expires_at,
                }
            }
            None => {
                let record = WindowRecord::open(now, &self.quota);
                debug!(client_id, expires_at = record.expires_at, "Opened new window");
                self.persist(client_id, &record).await;
                Decision {
                    admitted: true,
                    remaining: record.remaining,
                    resets_at: record.expires_at,
                }
            }
        };

        Ok(decision)
    }

    /// Write back a record whose admission has already been decided. Failures
    /// are reported as a consistency warning, never as a rejection.
    async fn persist(&self, client_id: &str, record: &WindowRecord) {
        if let Err(e) = self.store.store(client_id, record).await {
            warn!(client_id, error = %e, "Failed to persist window record after admit");
        }
    }

    /// Project the current window for `client_id` without consuming quota.
    ///
    /// Absent or expired records are reported as a hypothetical fresh window.
    /// Nothing is persisted.
    pub async fn peek(&self, client_id: &str, now: i64) -> Result<WindowStatus, QuotaError> {
        let active = self
            .store
            .load(client_id)
            .await?
            .filter(|record| record.is_active(now));

        let status = match active {
            Some(record) => WindowStatus {
                limit: self.quota.limit,
                remaining: record.remaining,
                reset: record.expires_at,
            },
            None => WindowStatus {
                limit: self.quota.limit,
                remaining: self.quota.limit,
                reset: now + self.quota.window_secs,
            },
        };

        Ok(status)
    }
}
