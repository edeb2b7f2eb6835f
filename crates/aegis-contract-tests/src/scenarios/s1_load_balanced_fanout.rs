//! S1 — load-balanced RPC fan-out. Three `echo` instances share a queue
//! group on `rpc.echo.echo`; six calls with `{"message":"x"}` land two
//! per instance, each reply shaped `{success:true, result:{"echo":"x",
//! "from":"echo-N"}}`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use aegis_core::codec;
use aegis_core::model::{Envelope, RpcRequest, RpcResponse};
use aegis_core::ports::transport::{HandlerOutcome, MessageHandler, Transport};
use aegis_core::test_stubs::MockTransport;

struct EchoHandler {
    name: &'static str,
}

#[async_trait]
impl MessageHandler for EchoHandler {
    async fn handle(&self, _subject: &str, payload: Vec<u8>) -> HandlerOutcome {
        let request: RpcRequest = match codec::decode(&payload) {
            Ok(request) => request,
            Err(_) => return HandlerOutcome::Nack,
        };
        let message = request.params.get("message").cloned().unwrap_or(Value::Null);
        let mut result = serde_json::Map::new();
        result.insert("echo".to_string(), message);
        result.insert("from".to_string(), Value::String(self.name.to_string()));
        let response = RpcResponse::ok(&request, Value::Object(result));
        HandlerOutcome::Reply(codec::encode_best_effort(&response))
    }
}

pub async fn run() -> Result<(), String> {
    let transport = Arc::new(MockTransport::new());
    transport.connect(&[]).await.map_err(|e| e.to_string())?;
    let subject = "rpc.echo.echo";
    for name in ["echo-1", "echo-2", "echo-3"] {
        let handler = Arc::new(EchoHandler { name }) as Arc<dyn MessageHandler>;
        transport
            .subscribe(subject, Some("echo-workers"), handler)
            .await
            .map_err(|e| e.to_string())?;
    }

    let mut tally: BTreeMap<String, usize> = BTreeMap::new();
    for _ in 0..6 {
        let mut params = BTreeMap::new();
        params.insert("message".to_string(), Value::String("x".to_string()));
        let request = RpcRequest {
            envelope: Envelope::new(),
            method: "echo".to_string(),
            params,
            timeout: 5,
        };
        let payload = codec::encode(&request).map_err(|e| e.to_string())?;
        let bytes = transport
            .request(subject, payload, Duration::from_secs(1))
            .await
            .map_err(|e| e.to_string())?;
        let response: RpcResponse = codec::decode(&bytes).map_err(|e| e.to_string())?;
        if !response.success {
            return Err("expected a successful echo response".to_string());
        }
        let result = response.result.ok_or("reply carried no result")?;
        let echoed = result.get("echo").and_then(Value::as_str).unwrap_or_default();
        if echoed != "x" {
            return Err(format!("expected echo == \"x\", got {echoed:?}"));
        }
        let from = result
            .get("from")
            .and_then(Value::as_str)
            .ok_or("reply result missing \"from\"")?
            .to_string();
        *tally.entry(from).or_insert(0) += 1;
    }

    if tally.len() != 3 {
        return Err(format!("expected all three instances to answer, only {} did", tally.len()));
    }
    for (name, count) in &tally {
        if *count != 2 {
            return Err(format!("instance {name} handled {count} calls, expected exactly 2"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_balanced_fanout_splits_evenly() {
        run().await.unwrap();
    }
}
