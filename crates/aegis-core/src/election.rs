//! Election repository (spec §4.3): atomic create-if-absent on a leader
//! key, lease refresh, release, and a watch-based observer.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tracing::instrument;

use crate::error::{CoreError, Result};
use crate::ids::InstanceId;
use crate::model::election::ElectionRecord;
use crate::ports::kv::{CasOptions, KvStore, Watch, WatchOp};

#[derive(Debug)]
pub enum AcquireOutcome {
    Acquired { revision: u64 },
    HeldBy { owner: InstanceId },
}

#[derive(Debug)]
pub enum RefreshOutcome {
    Refreshed { revision: u64 },
    Lost,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LeaderState {
    HeldBy(InstanceId),
    Vacant,
}

/// Port over the election mechanism (spec §4.3). `key` is the full KV key
/// (`elections.{service}.{group}`); callers build it via
/// [`crate::registry::election_key`].
#[async_trait]
pub trait ElectionRepository: Send + Sync + 'static {
    async fn try_acquire(
        &self,
        key: &str,
        owner_id: &InstanceId,
        lease: Duration,
    ) -> Result<AcquireOutcome>;

    async fn refresh(
        &self,
        key: &str,
        owner_id: &InstanceId,
        expected_revision: u64,
        lease: Duration,
    ) -> Result<RefreshOutcome>;

    async fn release(&self, key: &str, owner_id: &InstanceId) -> Result<()>;

    async fn observe(&self, key: &str) -> Result<Box<dyn Watch>>;
}

/// The only production implementation: a KV-backed repository generic
/// over any [`KvStore`] (the teacher's port/impl split, applied here —
/// see `registry::Registry` for the sibling layered on the same trait).
pub struct KvElectionRepository {
    kv: Arc<dyn KvStore>,
}

impl KvElectionRepository {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    fn encode(record: &ElectionRecord) -> Result<Vec<u8>> {
        serde_json::to_vec(record).map_err(|e| CoreError::new("INVALID_REQUEST", e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<ElectionRecord> {
        serde_json::from_slice(bytes).map_err(|e| CoreError::new("INVALID_REQUEST", e.to_string()))
    }
}

#[async_trait]
impl ElectionRepository for KvElectionRepository {
    #[instrument(skip(self), fields(%key, %owner_id))]
    async fn try_acquire(
        &self,
        key: &str,
        owner_id: &InstanceId,
        lease: Duration,
    ) -> Result<AcquireOutcome> {
        let now = SystemTime::now();
        let record = ElectionRecord::new(owner_id.clone(), now, lease);
        let payload = Self::encode(&record)?;

        match self
            .kv
            .put(key, payload, CasOptions::create_if_absent())
            .await
        {
            Ok(revision) => Ok(AcquireOutcome::Acquired { revision }),
            Err(err) if err.code() == "CAS_CONFLICT" => {
                // Someone else holds (or held) the key. If their record is
                // itself expired (safety-net staleness, spec §4.3), the
                // retention system just hasn't caught up yet; report the
                // current holder either way and let the caller retry on
                // the next election tick.
                match self.kv.get(key).await? {
                    Some(entry) => {
                        let existing = Self::decode(&entry.value)?;
                        Ok(AcquireOutcome::HeldBy {
                            owner: existing.leader_instance_id,
                        })
                    }
                    None => Err(err), // raced with a delete; caller retries
                }
            }
            Err(err) => Err(err),
        }
    }

    #[instrument(skip(self), fields(%key, %owner_id, expected_revision))]
    async fn refresh(
        &self,
        key: &str,
        owner_id: &InstanceId,
        expected_revision: u64,
        lease: Duration,
    ) -> Result<RefreshOutcome> {
        let current = match self.kv.get(key).await? {
            Some(entry) => entry,
            None => return Ok(RefreshOutcome::Lost),
        };
        if current.revision != expected_revision {
            return Ok(RefreshOutcome::Lost);
        }
        let existing = Self::decode(&current.value)?;
        if !existing.held_by(owner_id) {
            return Ok(RefreshOutcome::Lost);
        }

        let mut renewed = existing;
        renewed.renew(SystemTime::now(), lease);
        let payload = Self::encode(&renewed)?;

        match self
            .kv
            .put(key, payload, CasOptions::expect(expected_revision))
            .await
        {
            Ok(revision) => Ok(RefreshOutcome::Refreshed { revision }),
            Err(err) if err.code() == "CAS_CONFLICT" => Ok(RefreshOutcome::Lost),
            Err(err) => Err(err),
        }
    }

    async fn release(&self, key: &str, owner_id: &InstanceId) -> Result<()> {
        if let Some(entry) = self.kv.get(key).await? {
            let existing = Self::decode(&entry.value)?;
            if !existing.held_by(owner_id) {
                return Ok(()); // not ours; best-effort, ignored
            }
        }
        match self.kv.delete(key).await {
            Ok(()) => Ok(()),
            Err(_) => Ok(()), // best-effort (spec §4.3)
        }
    }

    async fn observe(&self, key: &str) -> Result<Box<dyn Watch>> {
        self.kv.watch(key).await
    }
}

/// Translate a raw [`crate::ports::kv::WatchEvent`] on an election key
/// into the higher-level [`LeaderState`] the single-active runtime's
/// observer task reacts to.
pub fn leader_state_from_watch(op: WatchOp, value: &[u8]) -> Result<LeaderState> {
    match op {
        WatchOp::Delete => Ok(LeaderState::Vacant),
        WatchOp::Put => {
            let record: ElectionRecord = serde_json::from_slice(value)
                .map_err(|e| CoreError::new("INVALID_REQUEST", e.to_string()))?;
            Ok(LeaderState::HeldBy(record.leader_instance_id))
        }
    }
}
