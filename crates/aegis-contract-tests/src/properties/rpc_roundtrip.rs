//! Property 3 ("round-trip"): the response a caller observes for any RPC
//! carries `correlation_id == request.message_id`, driven straight
//! through `Router` so the assertion holds independent of any transport.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use aegis_core::codec;
use aegis_core::error::ErrorCode;
use aegis_core::ids::ServiceName;
use aegis_core::model::{Envelope, RpcRequest, RpcResponse};
use aegis_core::ports::transport::{HandlerOutcome, MessageHandler, Transport};
use aegis_core::router::{HandlerRegistry, Router, RpcHandler};
use aegis_core::test_stubs::MockTransport;

struct EchoHandler;

#[async_trait]
impl RpcHandler for EchoHandler {
    async fn handle(&self, params: BTreeMap<String, serde_json::Value>) -> Result<serde_json::Value, (ErrorCode, String)> {
        Ok(serde_json::Value::Object(params.into_iter().collect()))
    }
}

pub async fn run() -> Result<(), String> {
    let registry = Arc::new(HandlerRegistry::new());
    registry.register_rpc("echo", Arc::new(EchoHandler));
    let transport = Arc::new(MockTransport::new());
    transport.connect(&[]).await.map_err(|e| e.to_string())?;
    let router = Router::new(registry, transport, ServiceName::parse("echo").unwrap());

    let request = RpcRequest {
        envelope: Envelope::new(),
        method: "echo".to_string(),
        params: BTreeMap::new(),
        timeout: 5,
    };
    let payload = codec::encode(&request).map_err(|e| e.to_string())?;

    match router.handle("rpc.echo.echo", payload).await {
        HandlerOutcome::Reply(bytes) => {
            let response: RpcResponse = codec::decode(&bytes).map_err(|e| e.to_string())?;
            if response.envelope.correlation_id.as_ref() != Some(&request.envelope.message_id) {
                return Err("response correlation_id did not echo the request's message_id".to_string());
            }
            Ok(())
        }
        other => Err(format!("expected a Reply outcome for an RPC dispatch, got {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rpc_roundtrip_preserves_correlation_id() {
        run().await.unwrap();
    }
}
