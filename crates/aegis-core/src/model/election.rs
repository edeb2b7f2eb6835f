use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::ids::InstanceId;

/// The leader record stored at `elections.{service}.{group}` (spec §3,
/// §4.3). Holds the lease: whoever currently holds an unexpired lease is
/// the active instance for that `(service, group)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ElectionRecord {
    pub leader_instance_id: InstanceId,
    #[serde(with = "crate::rfc3339")]
    pub acquired_at: SystemTime,
    #[serde(with = "crate::rfc3339")]
    pub lease_expires_at: SystemTime,
}

impl ElectionRecord {
    pub fn new(leader_instance_id: InstanceId, now: SystemTime, lease: Duration) -> Self {
        Self {
            leader_instance_id,
            acquired_at: now,
            lease_expires_at: now + lease,
        }
    }

    /// True once `now` has passed `lease_expires_at`. A stale-but-present
    /// record is treated the same as no record by `try_acquire` (spec §4.3
    /// safety-net staleness check, independent of KV-native TTL).
    pub fn is_expired(&self, now: SystemTime) -> bool {
        now >= self.lease_expires_at
    }

    pub fn renew(&mut self, now: SystemTime, lease: Duration) {
        self.acquired_at = now;
        self.lease_expires_at = now + lease;
    }

    pub fn held_by(&self, instance_id: &InstanceId) -> bool {
        &self.leader_instance_id == instance_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ServiceName;

    #[test]
    fn expires_exactly_at_lease_boundary() {
        let leader = InstanceId::generate(&ServiceName::parse("orders").unwrap());
        let now = SystemTime::now();
        let record = ElectionRecord::new(leader, now, Duration::from_secs(30));
        assert!(!record.is_expired(now));
        assert!(record.is_expired(now + Duration::from_secs(30)));
        assert!(record.is_expired(now + Duration::from_secs(31)));
    }

    #[test]
    fn renew_extends_lease_from_new_now() {
        let leader = InstanceId::generate(&ServiceName::parse("orders").unwrap());
        let now = SystemTime::now();
        let mut record = ElectionRecord::new(leader, now, Duration::from_secs(30));
        let later = now + Duration::from_secs(20);
        record.renew(later, Duration::from_secs(30));
        assert_eq!(record.lease_expires_at, later + Duration::from_secs(30));
    }
}
