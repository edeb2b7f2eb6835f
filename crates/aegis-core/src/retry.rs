//! Client-side `RetryPolicy` and server-side `FailoverPolicy` (spec
//! §4.8). The backoff formula is the closed form spec §4.8 gives
//! directly; the jitter technique (hash the inputs, derive a
//! deterministic-looking but actually `rand`-seeded multiplier) is
//! grounded on `spark-core::governance::retry::adaptive::compute`, which
//! does the same shape of clamp-then-jitter for its own adaptive wait —
//! adapted here to the plain exponential-backoff formula the spec
//! actually asks for instead of the teacher's backlog/RTT-weighted one.

use std::time::Duration;

use rand::Rng;

use crate::error::ErrorCode;

/// Immutable value object (spec §9: "value objects that validate at
/// construction"). Use [`RetryPolicyBuilder`] or [`RetryPolicy::default`]
/// plus `with_*` methods; there is no public constructor that accepts
/// pre-validated-elsewhere fields, so an invalid policy cannot exist.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f64,
    jitter_factor: f64,
    retryable_errors: Vec<ErrorCode>,
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_retryable(&self, code: ErrorCode) -> bool {
        self.retryable_errors.contains(&code)
    }

    /// `min(max_delay, initial * multiplier^attempt) * (1 ± jitter)`
    /// (spec §4.8, literal formula). `attempt` is 0-based (the delay
    /// before the *first* retry, i.e. after attempt 0 failed, is
    /// `delay_for(0)`).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = self.backoff_multiplier.powi(attempt as i32);
        let raw_millis = (self.initial_delay.as_millis() as f64) * exponent;
        let capped_millis = raw_millis.min(self.max_delay.as_millis() as f64);

        let mut rng = rand::thread_rng();
        let jitter_span = capped_millis * self.jitter_factor;
        let jittered = capped_millis + rng.gen_range(-jitter_span..=jitter_span);
        Duration::from_millis(jittered.max(0.0) as u64)
    }

    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::default()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicyBuilder::default().build()
    }
}

pub struct RetryPolicyBuilder {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f64,
    jitter_factor: f64,
    retryable_errors: Vec<ErrorCode>,
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(5000),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
            retryable_errors: vec![
                ErrorCode::NotActive,
                ErrorCode::ServiceUnavailable,
                ErrorCode::Timeout,
                ErrorCode::Electing,
            ],
        }
    }
}

impl RetryPolicyBuilder {
    pub fn max_attempts(mut self, value: u32) -> Self {
        self.max_attempts = value.max(1);
        self
    }

    pub fn initial_delay(mut self, value: Duration) -> Self {
        self.initial_delay = value;
        self
    }

    pub fn max_delay(mut self, value: Duration) -> Self {
        self.max_delay = value.max(self.initial_delay);
        self
    }

    pub fn backoff_multiplier(mut self, value: f64) -> Self {
        self.backoff_multiplier = value.max(1.0);
        self
    }

    pub fn jitter_factor(mut self, value: f64) -> Self {
        self.jitter_factor = value.clamp(0.0, 1.0);
        self
    }

    pub fn retryable_errors(mut self, value: Vec<ErrorCode>) -> Self {
        self.retryable_errors = value;
        self
    }

    pub fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: self.initial_delay,
            max_delay: self.max_delay.max(self.initial_delay),
            backoff_multiplier: self.backoff_multiplier,
            jitter_factor: self.jitter_factor,
            retryable_errors: self.retryable_errors,
        }
    }
}

/// Named presets for [`FailoverPolicy`] (spec §4.7 "Failover time
/// budget").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailoverPreset {
    Aggressive,
    Balanced,
    Conservative,
}

/// Server-side triple governing lease TTL, refresh cadence, and observer
/// responsiveness (spec §4.8 "FailoverPolicy").
#[derive(Clone, Debug)]
pub struct FailoverPolicy {
    pub leader_ttl: Duration,
    pub refresh_interval: Duration,
    pub observer_responsiveness: Duration,
}

impl FailoverPolicy {
    pub fn preset(preset: FailoverPreset) -> Self {
        match preset {
            FailoverPreset::Aggressive => Self {
                leader_ttl: Duration::from_secs(2),
                refresh_interval: Duration::from_millis(500),
                observer_responsiveness: Duration::from_millis(500),
            },
            FailoverPreset::Balanced => Self {
                leader_ttl: Duration::from_secs(4),
                refresh_interval: Duration::from_secs(1),
                observer_responsiveness: Duration::from_secs(1),
            },
            FailoverPreset::Conservative => Self {
                leader_ttl: Duration::from_secs(8),
                refresh_interval: Duration::from_secs_f64(8.0 / 3.0),
                observer_responsiveness: Duration::from_secs(2),
            },
        }
    }

    /// `leader_ttl_seconds / 3`, the refresh cadence spec §4.7 mandates
    /// regardless of preset, for a caller that only configured a custom
    /// `leader_ttl`.
    pub fn from_leader_ttl(leader_ttl: Duration) -> Self {
        Self {
            leader_ttl,
            refresh_interval: leader_ttl / 3,
            observer_responsiveness: Duration::from_millis(500),
        }
    }
}

impl Default for FailoverPolicy {
    fn default() -> Self {
        Self::preset(FailoverPreset::Balanced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_never_exceeds_max_delay_even_unjittered_high() {
        let policy = RetryPolicy::builder()
            .initial_delay(Duration::from_millis(100))
            .max_delay(Duration::from_millis(500))
            .backoff_multiplier(2.0)
            .jitter_factor(0.0)
            .build();
        for attempt in 0..10 {
            assert!(policy.delay_for(attempt) <= Duration::from_millis(500));
        }
    }

    #[test]
    fn default_retryable_set_matches_spec() {
        let policy = RetryPolicy::default();
        assert!(policy.is_retryable(ErrorCode::NotActive));
        assert!(policy.is_retryable(ErrorCode::ServiceUnavailable));
        assert!(policy.is_retryable(ErrorCode::Timeout));
        assert!(policy.is_retryable(ErrorCode::Electing));
        assert!(!policy.is_retryable(ErrorCode::InvalidRequest));
    }

    #[test]
    fn aggressive_preset_targets_sub_two_second_failover() {
        let policy = FailoverPolicy::preset(FailoverPreset::Aggressive);
        assert_eq!(policy.leader_ttl, Duration::from_secs(2));
        assert_eq!(policy.refresh_interval, Duration::from_millis(500));
    }
}
