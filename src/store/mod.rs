//! Data Store (spec §4.C): transactional repositories over SQLite.
//!
//! Connection handling follows the teacher backend's heavier-duty storage
//! (`signals::db_storage::DbSignalStorage`): a single connection guarded by
//! a `parking_lot::Mutex`, with blocking calls moved onto a blocking thread
//! via `spawn_blocking` and bounded by `store.opTimeoutMs` (spec §4.C: "no
//! store operation blocks more than 500 ms under normal load; on timeout,
//! return StoreTimeout").

pub mod agent_results;
pub mod analyses;
mod schema;
pub mod shame;
pub mod users;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use rusqlite::Connection;

use crate::error::StoreError;

/// Max attempts for a single `run_blocking` call, including the first try
/// (spec §4.C / §7: "retried with jittered backoff up to 3 attempts inside
/// any single transition").
const MAX_STORE_ATTEMPTS: u32 = 3;

/// Jittered backoff between `run_blocking` retries: grows with attempt
/// number, ±20% jitter, same shape as the Broker Client's reconnect jitter
/// (spec §4.B) but on a much shorter base since this guards a single store
/// call rather than a reconnect.
fn store_retry_backoff(attempt: u32) -> Duration {
    let base_ms = 20u64 * (1u64 << attempt.saturating_sub(1).min(4));
    let jitter = rand::thread_rng().gen_range(0.8..1.2);
    Duration::from_millis((base_ms as f64 * jitter) as u64)
}

#[derive(Clone)]
pub struct Store {
    pub(crate) conn: Arc<Mutex<Connection>>,
    pub(crate) op_timeout: Duration,
}

impl Store {
    pub fn open(path: &str, op_timeout: Duration) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        schema::init(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            op_timeout,
        })
    }

    /// In-memory store, used by tests and by demo-mode fixtures.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        schema::init(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            op_timeout: Duration::from_millis(500),
        })
    }

    /// Run a blocking closure against the shared connection on a blocking
    /// thread, bounded by `op_timeout`. Every repository method funnels
    /// through this so the 500ms/StoreTimeout contract (spec §4.C) is
    /// enforced in one place. On timeout the call is retried with jittered
    /// backoff up to `MAX_STORE_ATTEMPTS` times before `StoreTimeout` is
    /// surfaced to the caller (spec §7).
    pub(crate) async fn run_blocking<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Clone + Send + 'static,
        T: Send + 'static,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let conn = self.conn.clone();
            let f = f.clone();
            let task = tokio::task::spawn_blocking(move || {
                let guard = conn.lock();
                f(&guard)
            });

            match tokio::time::timeout(self.op_timeout, task).await {
                Ok(joined) => return joined?,
                Err(_elapsed) if attempt < MAX_STORE_ATTEMPTS => {
                    tracing::debug!(attempt, "store operation timed out, retrying with backoff");
                    tokio::time::sleep(store_retry_backoff(attempt)).await;
                }
                Err(_elapsed) => return Err(StoreError::Timeout),
            }
        }
    }
}
