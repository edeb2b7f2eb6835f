//! The six named end-to-end scenarios, one file per scenario.

pub mod s1_load_balanced_fanout;
pub mod s2_single_active_failover;
pub mod s3_stale_entry_filtering;
pub mod s4_discovery_cache_invalidation;
pub mod s5_event_redelivery;
pub mod s6_cas_protected_registration;
