//! Redis-backed window store.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::debug;

use super::{StoreError, WindowStore};
use crate::config::StoreConfig;
use crate::quota::WindowRecord;

const FIELD_START: &str = "start";
const FIELD_END: &str = "end";
const FIELD_REMAINING: &str = "remaining";

/// Window store backed by a shared Redis instance.
///
/// Each client identifier maps to one hash at `{key_prefix}{client_id}` with
/// `start`, `end`, and `remaining` fields. Every operation is bounded by the
/// configured timeout, so a hung connection degrades to
/// [`StoreError::Timeout`] instead of stalling the caller.
pub struct RedisWindowStore {
    conn: MultiplexedConnection,
    key_prefix: String,
    op_timeout: Duration,
    /// Tracks the outcome of the most recent operation. While false, readiness
    /// probes ping the server before traffic is let through again.
    ready: RwLock<bool>,
}

impl RedisWindowStore {
    /// Connect to the Redis instance named by the configuration.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let op_timeout = Duration::from_millis(config.op_timeout_ms);
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        let conn = tokio::time::timeout(op_timeout, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| StoreError::Timeout)?
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        debug!(url = %config.url, "Connected to Redis window store");

        Ok(Self {
            conn,
            key_prefix: config.key_prefix.clone(),
            op_timeout,
            ready: RwLock::new(true),
        })
    }

    fn key(&self, client_id: &str) -> String {
        format!("{}{}", self.key_prefix, client_id)
    }

    /// Run one Redis operation under the store deadline, updating the
    /// readiness flag from its outcome.
    async fn bounded<T>(
        &self,
        op: impl Future<Output = redis::RedisResult<T>>,
    ) -> Result<T, StoreError> {
        let result = match tokio::time::timeout(self.op_timeout, op).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(StoreError::Connection(e.to_string())),
            Err(_) => Err(StoreError::Timeout),
        };
        *self.ready.write() = result.is_ok();
        result
    }
}

#[async_trait]
impl WindowStore for RedisWindowStore {
    async fn load(&self, client_id: &str) -> Result<Option<WindowRecord>, StoreError> {
        let key = self.key(client_id);
        let mut conn = self.conn.clone();
        let lookup = key.clone();
        let fields: HashMap<String, String> =
            self.bounded(async move { conn.hgetall(lookup).await }).await?;

        if fields.is_empty() {
            return Ok(None);
        }
        record_from_fields(&key, &fields).map(Some)
    }

    async fn store(&self, client_id: &str, record: &WindowRecord) -> Result<(), StoreError> {
        let key = self.key(client_id);
        let mut conn = self.conn.clone();
        let items = [
            (FIELD_START, record.started_at.to_string()),
            (FIELD_END, record.expires_at.to_string()),
            (FIELD_REMAINING, record.remaining.to_string()),
        ];
        self.bounded(async move { conn.hset_multiple(key, &items).await })
            .await
    }

    async fn is_ready(&self) -> bool {
        if *self.ready.read() {
            return true;
        }
        let mut conn = self.conn.clone();
        self.bounded(async move {
            let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok(pong)
        })
        .await
        .is_ok()
    }
}

fn record_from_fields(
    key: &str,
    fields: &HashMap<String, String>,
) -> Result<WindowRecord, StoreError> {
    Ok(WindowRecord {
        started_at: parse_field(key, fields, FIELD_START)?,
        expires_at: parse_field(key, fields, FIELD_END)?,
        remaining: parse_field(key, fields, FIELD_REMAINING)?,
    })
}

fn parse_field<T: std::str::FromStr>(
    key: &str,
    fields: &HashMap<String, String>,
    name: &str,
) -> Result<T, StoreError> {
    let raw = fields.get(name).ok_or_else(|| StoreError::Corrupt {
        key: key.to_string(),
        reason: format!("missing field {}", name),
    })?;
    raw.parse().map_err(|_| StoreError::Corrupt {
        key: key.to_string(),
        reason: format!("unparsable field {}", name),
    })
}
