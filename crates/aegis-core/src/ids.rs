//! Validating newtypes for the identifiers threaded through every port.
//!
//! Value objects validate once at construction and are immutable thereafter;
//! wire decoding goes through the same constructors (spec §9, "static
//! records with constructors that reject invalid input").

use std::fmt;
use std::sync::Arc;

use crate::error::CoreError;

fn invalid(field: &'static str, value: &str, rule: &str) -> CoreError {
    CoreError::new(
        "INVALID_REQUEST",
        format!("{field} {value:?} does not satisfy {rule}"),
    )
}

/// DNS-compatible service name: `^[a-z][a-z0-9-]*$`, length 1-63.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceName(Arc<str>);

impl ServiceName {
    pub fn parse(value: impl AsRef<str>) -> crate::error::Result<Self> {
        let value = value.as_ref();
        if value.is_empty() || value.len() > 63 {
            return Err(invalid("service_name", value, "length 1..=63"));
        }
        let mut chars = value.chars();
        let first = chars.next().unwrap();
        if !first.is_ascii_lowercase() {
            return Err(invalid("service_name", value, "^[a-z]"));
        }
        if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
            return Err(invalid("service_name", value, "[a-z0-9-]*$"));
        }
        Ok(Self(Arc::from(value)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ServiceName {
    type Error = CoreError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ServiceName> for String {
    fn from(value: ServiceName) -> Self {
        value.0.to_string()
    }
}

/// Unique-within-a-service instance identifier. Auto-derived as
/// `{service_name}-{8-hex}` when not supplied (spec §3).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstanceId(Arc<str>);

impl InstanceId {
    pub fn parse(value: impl AsRef<str>) -> crate::error::Result<Self> {
        let value = value.as_ref();
        if value.is_empty() {
            return Err(invalid("instance_id", value, "non-empty"));
        }
        Ok(Self(Arc::from(value)))
    }

    /// Derive a fresh instance id as `{service_name}-{8 hex digits}`.
    pub fn generate(service_name: &ServiceName) -> Self {
        let suffix: u32 = rand_suffix();
        Self(Arc::from(format!("{service_name}-{suffix:08x}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Kept dependency-free (no `rand` in aegis-core): a simple counter-seeded
// splitmix64 step gives enough spread for a human-readable suffix without
// pulling an RNG crate into the port-definition crate.
fn rand_suffix() -> u32 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let mut z = nanos.wrapping_add(0x9E3779B97F4A7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    ((z ^ (z >> 31)) & 0xFFFF_FFFF) as u32
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for InstanceId {
    type Error = CoreError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<InstanceId> for String {
    fn from(value: InstanceId) -> Self {
        value.0.to_string()
    }
}

/// `\d+\.\d+\.\d+` semantic version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SemVer {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SemVer {
    pub fn parse(value: impl AsRef<str>) -> crate::error::Result<Self> {
        let value = value.as_ref();
        let mut parts = value.split('.');
        let (Some(major), Some(minor), Some(patch), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid("version", value, r"\d+\.\d+\.\d+"));
        };
        let parse_segment = |s: &str| {
            s.parse::<u32>()
                .map_err(|_| invalid("version", value, r"\d+\.\d+\.\d+"))
        };
        Ok(Self {
            major: parse_segment(major)?,
            minor: parse_segment(minor)?,
            patch: parse_segment(patch)?,
        })
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl TryFrom<String> for SemVer {
    type Error = CoreError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<SemVer> for String {
    fn from(value: SemVer) -> Self {
        value.to_string()
    }
}

/// A uuid-shaped, non-empty message/trace/correlation identifier. Unlike
/// `ServiceName`/`InstanceId`, these are generated fresh per message, never
/// parsed from a restricted alphabet, so the only contract is "non-empty".
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct MessageId(Arc<str>);

impl MessageId {
    pub fn new() -> Self {
        Self(Arc::from(uuid::Uuid::new_v4().to_string()))
    }

    pub fn parse(value: impl AsRef<str>) -> crate::error::Result<Self> {
        let value = value.as_ref();
        if value.is_empty() {
            return Err(invalid("message_id", value, "non-empty"));
        }
        Ok(Self(Arc::from(value)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_name_accepts_lowercase_dns_token() {
        assert!(ServiceName::parse("order-service").is_ok());
        assert!(ServiceName::parse("a").is_ok());
    }

    #[test]
    fn service_name_rejects_uppercase_and_leading_digit() {
        assert!(ServiceName::parse("Order-Service").is_err());
        assert!(ServiceName::parse("1order").is_err());
        assert!(ServiceName::parse("").is_err());
        assert!(ServiceName::parse("a".repeat(64)).is_err());
    }

    #[test]
    fn instance_id_generation_is_prefixed_by_service_name() {
        let name = ServiceName::parse("echo").unwrap();
        let id = InstanceId::generate(&name);
        assert!(id.as_str().starts_with("echo-"));
        assert_eq!(id.as_str().len(), "echo-".len() + 8);
    }

    #[test]
    fn semver_round_trips() {
        let v = SemVer::parse("1.2.3").unwrap();
        assert_eq!(v.to_string(), "1.2.3");
        assert!(SemVer::parse("1.2").is_err());
        assert!(SemVer::parse("1.2.x").is_err());
    }
}
