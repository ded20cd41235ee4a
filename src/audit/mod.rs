//! Audit log of completed queries
//!
//! Every query that reaches a final answer is kept with its trace and usage,
//! plus a hash of the trace so later tampering can be detected.

use crate::models::{TraceEntry, UsageCounters};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRecord {
    pub query_id: Uuid,
    pub session_id: String,
    pub question: String,
    pub answer: String,
    pub trace: Arc<Vec<TraceEntry>>,
    pub usage: UsageCounters,
    pub trace_hash: String,
    pub started_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub execution_time_ms: u64,
}

/// Default number of records kept before the oldest are dropped.
pub const DEFAULT_MAX_RECORDS: usize = 1000;

#[derive(Default)]
struct AuditStore {
    records: HashMap<Uuid, QueryRecord>,
    /// Insertion order, oldest first
    order: VecDeque<Uuid>,
}

/// In-memory audit trail storage, bounded to the most recent records
pub struct AuditLog {
    inner: Arc<RwLock<AuditStore>>,
    max_records: usize,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_RECORDS)
    }

    /// Keep at most `max_records` (at least one).
    pub fn with_capacity(max_records: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(AuditStore::default())),
            max_records: max_records.max(1),
        }
    }

    pub fn max_records(&self) -> usize {
        self.max_records
    }

    /// Store a record, dropping the oldest ones beyond the cap.
    pub async fn record(&self, record: QueryRecord) -> Result<Uuid> {
        let query_id = record.query_id;
        let mut store = self.inner.write().await;

        if store.records.insert(query_id, record).is_none() {
            store.order.push_back(query_id);
        }

        let mut dropped = 0usize;
        while store.order.len() > self.max_records {
            if let Some(oldest) = store.order.pop_front() {
                store.records.remove(&oldest);
                dropped += 1;
            }
        }
        if dropped > 0 {
            debug!(dropped, cap = self.max_records, "Dropped oldest audit records");
        }

        Ok(query_id)
    }

    pub async fn get(&self, query_id: Uuid) -> Result<Option<QueryRecord>> {
        let store = self.inner.read().await;
        Ok(store.records.get(&query_id).cloned())
    }

    /// Query ids for a session, oldest first
    pub async fn list_for_session(&self, session_id: &str) -> Result<Vec<Uuid>> {
        let store = self.inner.read().await;

        let mut items: Vec<_> = store
            .records
            .values()
            .filter(|record| record.session_id == session_id)
            .map(|record| (record.query_id, record.created_at))
            .collect();

        items.sort_by_key(|(_, created_at)| *created_at);

        Ok(items.into_iter().map(|(id, _)| id).collect())
    }

    /// Recompute the trace hash and compare with the stored one.
    /// Unknown ids are reported as not intact.
    pub async fn verify_integrity(&self, query_id: Uuid) -> Result<bool> {
        let store = self.inner.read().await;

        match store.records.get(&query_id) {
            Some(record) => Ok(compute_trace_hash(&record.trace) == record.trace_hash),
            None => Ok(false),
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.records.is_empty()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// SHA-256 of the serialized trace, hex encoded.
/// JSON is streamed straight into the hasher.
pub fn compute_trace_hash(trace: &[TraceEntry]) -> String {
    let mut hasher = Sha256::new();

    if serde_json::to_writer(&mut HashWriter(&mut hasher), trace).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into a Digest via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
