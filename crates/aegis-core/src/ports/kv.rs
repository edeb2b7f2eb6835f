//! Key/value store port (spec §4.2). One `KvStore` handle is scoped to a
//! single bucket (`service_registry`, `sticky_active`, ...); `Transport`
//! hands out bucket-scoped handles so the registry/election layers never
//! see the bucket name as a runtime parameter.

use async_trait::async_trait;

use crate::error::Result;

/// A stored value plus the revision it was written at. Revisions are
/// strictly increasing per key and form the basis of optimistic
/// concurrency (spec §4.2 "optimistic concurrency").
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub value: Vec<u8>,
    pub revision: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchOp {
    Put,
    Delete,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchEvent {
    pub op: WatchOp,
    pub entry: Entry,
}

/// Optional compare-and-swap precondition for [`KvStore::put`]. `None`
/// means an unconditional write (create-or-overwrite); `Some(revision)`
/// fails with `CoreError::cas_conflict` if the key's current revision
/// does not match.
#[derive(Clone, Copy, Debug, Default)]
pub struct CasOptions {
    pub expected_revision: Option<u64>,
}

impl CasOptions {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn expect(revision: u64) -> Self {
        Self {
            expected_revision: Some(revision),
        }
    }

    /// Create-if-absent: succeeds only if the key does not exist yet.
    /// Used by the election repository's `try_acquire` (spec §4.3).
    pub fn create_if_absent() -> Self {
        Self::expect(0)
    }
}

/// A live feed of [`WatchEvent`]s on a key or prefix. Represents the
/// "lazy sequence of events" spec §9 asks watches to be: callers pull one
/// event at a time and explicitly close the watch to release substrate
/// resources (a JetStream consumer, in the NATS adapter).
#[async_trait]
pub trait Watch: Send {
    /// Await the next event, or `None` once the watch has been closed or
    /// the underlying subscription has ended.
    async fn next(&mut self) -> Option<WatchEvent>;

    /// Release substrate resources. Idempotent; calling `next` after
    /// `close` always returns `None`.
    async fn close(&mut self);
}

/// Port over a single KV bucket (spec §4.2).
///
/// # Contract
/// - `get` returns `Ok(None)` for a missing key, never an error.
/// - `put` returns the new revision on success; violates `opts` with
///   `CoreError::cas_conflict` otherwise.
/// - `list` returns all entries whose key starts with `prefix`, in no
///   particular order; callers that need staleness filtering (the
///   registry) do it themselves, not here.
/// - `watch` MUST NOT replay historical events by default: it observes
///   changes from the moment it is opened.
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<Entry>>;

    async fn put(&self, key: &str, value: Vec<u8>, opts: CasOptions) -> Result<u64>;

    async fn delete(&self, key: &str) -> Result<()>;

    async fn list(&self, prefix: &str) -> Result<Vec<Entry>>;

    async fn watch(&self, key_or_prefix: &str) -> Result<Box<dyn Watch>>;
}
