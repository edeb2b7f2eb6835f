use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::MessageId;

/// Fields common to every message on the wire (spec §3 "Message envelope").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    pub message_id: MessageId,
    pub trace_id: MessageId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<MessageId>,
    #[serde(with = "crate::rfc3339")]
    pub timestamp: SystemTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl Envelope {
    /// A fresh envelope for an outbound message: new `message_id`, a fresh
    /// `trace_id` (callers that want to continue an existing trace should
    /// use [`Envelope::continuing`]), timestamped now.
    pub fn new() -> Self {
        Self {
            message_id: MessageId::new(),
            trace_id: MessageId::new(),
            correlation_id: None,
            timestamp: SystemTime::now(),
            source: None,
            target: None,
        }
    }

    /// An envelope that propagates an existing `trace_id` across a hop
    /// (spec §3: "trace_id propagated across hops").
    pub fn continuing(trace_id: MessageId) -> Self {
        Self {
            trace_id,
            ..Self::new()
        }
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcRequest {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub method: String,
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
    /// Seconds; must be positive. Default 5 (spec §3).
    pub timeout: u64,
}

impl RpcRequest {
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout.max(1))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<crate::error::ErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RpcResponse {
    pub fn ok(request: &RpcRequest, result: Value) -> Self {
        Self {
            envelope: Envelope {
                correlation_id: Some(request.envelope.message_id.clone()),
                trace_id: request.envelope.trace_id.clone(),
                ..Envelope::new()
            },
            success: true,
            result: Some(result),
            error: None,
            message: None,
        }
    }

    pub fn err(
        request: &RpcRequest,
        error: crate::error::ErrorCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            envelope: Envelope {
                correlation_id: Some(request.envelope.message_id.clone()),
                trace_id: request.envelope.trace_id.clone(),
                ..Envelope::new()
            },
            success: false,
            result: None,
            error: Some(error),
            message: Some(message.into()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub domain: String,
    pub event_type: String,
    #[serde(default)]
    pub payload: BTreeMap<String, Value>,
    #[serde(default = "default_event_version")]
    pub version: String,
}

fn default_event_version() -> String {
    "1.0".to_string()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Command {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub command: String,
    #[serde(default)]
    pub payload: BTreeMap<String, Value>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_command_timeout")]
    pub timeout: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_command_timeout() -> u64 {
    300
}

impl Command {
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout.max(1))
    }
}

/// Progress notification published on `commands.{service}.{command}.progress.{message_id}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommandProgress {
    pub percent: u8,
    pub message: String,
}

/// Final outcome published on `commands.{service}.{command}.result.{message_id}`
/// once the handler resolves (spec §4.5).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_request_defaults_to_five_second_timeout_when_unset_by_caller() {
        let req = RpcRequest {
            envelope: Envelope::new(),
            method: "echo".into(),
            params: BTreeMap::new(),
            timeout: 5,
        };
        assert_eq!(req.timeout_duration(), Duration::from_secs(5));
    }

    #[test]
    fn response_echoes_correlation_id_from_request() {
        let req = RpcRequest {
            envelope: Envelope::new(),
            method: "echo".into(),
            params: BTreeMap::new(),
            timeout: 5,
        };
        let resp = RpcResponse::ok(&req, Value::Null);
        assert_eq!(
            resp.envelope.correlation_id.as_ref(),
            Some(&req.envelope.message_id)
        );
        assert_eq!(resp.envelope.trace_id, req.envelope.trace_id);
    }

    #[test]
    fn command_defaults_match_spec() {
        let json = serde_json::json!({
            "message_id": "m1",
            "trace_id": "t1",
            "timestamp": "2025-01-01T00:00:00Z",
            "command": "rebalance",
        });
        let command: Command = serde_json::from_value(json).unwrap();
        assert_eq!(command.priority, Priority::Normal);
        assert_eq!(command.max_retries, 3);
        assert_eq!(command.timeout, 300);
    }
}
