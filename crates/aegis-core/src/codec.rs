//! Envelope wire codec (spec §4.1): msgpack-first with a JSON fallback.
//! `Router` uses this to encode/decode `RpcRequest`/`RpcResponse`/`Event`/
//! `Command`; `Transport` adapters deal only in opaque bytes.

use serde::{de::DeserializeOwned, Serialize};

use crate::error::CoreError;

/// Encode preferring compact msgpack (spec §4.1 "compact binary form").
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CoreError> {
    rmp_serde::to_vec_named(value).map_err(|e| CoreError::new("INVALID_REQUEST", e.to_string()))
}

/// Encode for a reply that must go out regardless (router error paths):
/// falls back to JSON if msgpack serialization somehow fails, rather than
/// dropping the reply on the floor.
pub fn encode_best_effort<T: Serialize>(value: &T) -> Vec<u8> {
    encode(value).unwrap_or_else(|_| {
        serde_json::to_vec(value).unwrap_or_else(|_| b"{}".to_vec())
    })
}

/// Decode by attempting msgpack first, then falling back to JSON (spec
/// §4.1: "decoder auto-detects by attempting binary first, then falling
/// back"). A message that is neither is `INVALID_REQUEST`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CoreError> {
    match rmp_serde::from_slice(bytes) {
        Ok(value) => Ok(value),
        Err(msgpack_err) => serde_json::from_slice(bytes).map_err(|json_err| {
            CoreError::new(
                "INVALID_REQUEST",
                format!(
                    "message is neither valid msgpack ({msgpack_err}) nor valid JSON ({json_err})"
                ),
            )
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Envelope;
    use std::collections::BTreeMap;

    #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
    struct Sample {
        #[serde(flatten)]
        envelope: Envelope,
        value: u32,
    }

    #[test]
    fn round_trips_through_msgpack() {
        let sample = Sample {
            envelope: Envelope::new(),
            value: 42,
        };
        let bytes = encode(&sample).unwrap();
        let back: Sample = decode(&bytes).unwrap();
        assert_eq!(back.value, 42);
    }

    #[test]
    fn falls_back_to_json_for_json_input() {
        let mut map = BTreeMap::new();
        map.insert("value".to_string(), 7u32);
        let json = serde_json::json!({
            "message_id": "m1",
            "trace_id": "t1",
            "timestamp": "2025-01-01T00:00:00Z",
            "value": 7,
        });
        let bytes = serde_json::to_vec(&json).unwrap();
        let decoded: Sample = decode(&bytes).unwrap();
        assert_eq!(decoded.value, 7);
    }

    #[test]
    fn rejects_garbage_as_invalid_request() {
        let err = decode::<Sample>(b"not valid anything \xff\xfe").unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");
    }
}
