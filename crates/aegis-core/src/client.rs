//! Client-side RPC helper (spec §4.8): wires `Discovery` + `Transport` +
//! `RetryPolicy` together so a caller gets one `call()` instead of having
//! to hand-roll the select/send/retry loop itself. `SingleActiveRuntime`'s
//! exclusive-RPC gate (spec §4.6) is the thing on the other end of this:
//! the gate never retries or delays on its own, "the client drives retry"
//! (spec §4.6) — this is that client.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::codec;
use crate::discovery::{Discovery, SelectionStrategy};
use crate::error::{CoreError, ErrorCode, Result};
use crate::ids::ServiceName;
use crate::model::{Envelope, RpcRequest, RpcResponse};
use crate::ports::transport::Transport;
use crate::retry::RetryPolicy;

/// Calls an RPC method on a discovered instance of `service_name`,
/// retrying per `RetryPolicy` on a retryable error code and invalidating
/// the discovery cache entry first when the error was `NOT_ACTIVE` (spec
/// §4.8: "so the next attempt may resolve a new leader").
pub struct RpcClient {
    transport: Arc<dyn Transport>,
    discovery: Arc<dyn Discovery>,
    retry: RetryPolicy,
    strategy: SelectionStrategy,
}

impl RpcClient {
    pub fn new(transport: Arc<dyn Transport>, discovery: Arc<dyn Discovery>, retry: RetryPolicy) -> Self {
        Self {
            transport,
            discovery,
            retry,
            strategy: SelectionStrategy::RoundRobin,
        }
    }

    pub fn with_strategy(mut self, strategy: SelectionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub async fn call(
        &self,
        service_name: &ServiceName,
        method: &str,
        params: BTreeMap<String, Value>,
        timeout: Duration,
    ) -> Result<Value> {
        let mut last_err =
            CoreError::from_code(ErrorCode::ServiceUnavailable, format!("no healthy instance of {service_name}"));

        for attempt in 0..self.retry.max_attempts() {
            if attempt > 0 {
                tokio::time::sleep(self.retry.delay_for(attempt - 1)).await;
            }

            match self.discovery.select_instance(service_name, self.strategy, None).await {
                Ok(Some(_instance)) => {}
                Ok(None) => {
                    last_err = CoreError::from_code(
                        ErrorCode::ServiceUnavailable,
                        format!("no healthy instance of {service_name}"),
                    );
                    continue;
                }
                Err(err) => {
                    last_err = err;
                    continue;
                }
            };

            match self.attempt(service_name, method, &params, timeout).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let code = err.as_error_code();
                    if code == Some(ErrorCode::NotActive) {
                        debug!(%service_name, "NOT_ACTIVE response; invalidating discovery cache entry before retrying");
                        self.discovery.invalidate(service_name).await;
                    }
                    if !code.is_some_and(|code| self.retry.is_retryable(code)) {
                        return Err(err);
                    }
                    last_err = err;
                }
            }
        }

        warn!(%service_name, method, attempts = self.retry.max_attempts(), "rpc call exhausted retry policy");
        Err(last_err)
    }

    async fn attempt(
        &self,
        service_name: &ServiceName,
        method: &str,
        params: &BTreeMap<String, Value>,
        timeout: Duration,
    ) -> Result<Value> {
        let subject = format!("rpc.{service_name}.{method}");
        let request = RpcRequest {
            envelope: Envelope::new(),
            method: method.to_string(),
            params: params.clone(),
            timeout: timeout.as_secs().max(1),
        };
        let payload = codec::encode(&request)?;
        let reply = self.transport.request(&subject, payload, timeout).await?;
        let response: RpcResponse = codec::decode(&reply)?;
        if response.success {
            Ok(response.result.unwrap_or(Value::Null))
        } else {
            let code = response.error.unwrap_or(ErrorCode::InternalError);
            Err(CoreError::from_code(code, response.message.unwrap_or_default()))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::ids::{InstanceId, SemVer};
    use crate::model::instance::{ServiceInstance, ServiceStatus};
    use crate::ports::transport::{HandlerOutcome, MessageHandler};
    use crate::test_stubs::MockTransport;

    struct SingleInstanceDiscovery {
        instance: ServiceInstance,
        invalidated: AtomicU32,
    }

    #[async_trait]
    impl Discovery for SingleInstanceDiscovery {
        async fn discover_instances(&self, _service_name: &ServiceName, _only_healthy: bool) -> Result<Vec<ServiceInstance>> {
            Ok(vec![self.instance.clone()])
        }

        async fn select_instance(
            &self,
            _service_name: &ServiceName,
            _strategy: SelectionStrategy,
            _preferred: Option<&InstanceId>,
        ) -> Result<Option<ServiceInstance>> {
            Ok(Some(self.instance.clone()))
        }

        async fn invalidate(&self, _service_name: &ServiceName) {
            self.invalidated.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FlakyExclusiveHandler {
        fails_remaining: AtomicU32,
    }

    #[async_trait]
    impl MessageHandler for FlakyExclusiveHandler {
        async fn handle(&self, subject: &str, payload: Vec<u8>) -> HandlerOutcome {
            let request: RpcRequest = codec::decode(&payload).unwrap();
            if self.fails_remaining.fetch_sub(1, Ordering::SeqCst) > 0 {
                let response = RpcResponse::err(&request, ErrorCode::NotActive, "standing by");
                return HandlerOutcome::Reply(codec::encode(&response).unwrap());
            }
            let _ = subject;
            let response = RpcResponse::ok(&request, Value::Bool(true));
            HandlerOutcome::Reply(codec::encode(&response).unwrap())
        }
    }

    fn instance() -> ServiceInstance {
        ServiceInstance {
            service_name: ServiceName::parse("critical").unwrap(),
            instance_id: InstanceId::parse("critical-a1b2c3d4").unwrap(),
            version: SemVer::parse("1.0.0").unwrap(),
            status: ServiceStatus::Active,
            sticky_active_group: None,
            sticky_active_status: None,
            last_heartbeat: std::time::SystemTime::now(),
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn retries_not_active_and_invalidates_cache_before_succeeding() {
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
        transport.connect(&[]).await.unwrap();
        transport
            .subscribe(
                "rpc.critical.promote",
                None,
                Arc::new(FlakyExclusiveHandler {
                    fails_remaining: AtomicU32::new(1),
                }),
            )
            .await
            .unwrap();

        let discovery = Arc::new(SingleInstanceDiscovery {
            instance: instance(),
            invalidated: AtomicU32::new(0),
        });
        let retry = RetryPolicy::builder()
            .max_attempts(3)
            .initial_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(2))
            .build();
        let client = RpcClient::new(Arc::clone(&transport), Arc::clone(&discovery) as Arc<dyn Discovery>, retry);

        let result = client
            .call(
                &ServiceName::parse("critical").unwrap(),
                "promote",
                BTreeMap::new(),
                Duration::from_secs(1),
            )
            .await;

        assert!(result.is_ok());
        assert_eq!(discovery.invalidated.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn surfaces_last_error_once_max_attempts_is_exhausted() {
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
        transport.connect(&[]).await.unwrap();
        transport
            .subscribe(
                "rpc.critical.promote",
                None,
                Arc::new(FlakyExclusiveHandler {
                    fails_remaining: AtomicU32::new(u32::MAX),
                }),
            )
            .await
            .unwrap();

        let discovery = Arc::new(SingleInstanceDiscovery {
            instance: instance(),
            invalidated: AtomicU32::new(0),
        });
        let retry = RetryPolicy::builder()
            .max_attempts(2)
            .initial_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(2))
            .build();
        let client = RpcClient::new(transport, discovery as Arc<dyn Discovery>, retry);

        let err = client
            .call(
                &ServiceName::parse("critical").unwrap(),
                "promote",
                BTreeMap::new(),
                Duration::from_secs(1),
            )
            .await
            .unwrap_err();

        assert_eq!(err.as_error_code(), Some(ErrorCode::NotActive));
    }
}
