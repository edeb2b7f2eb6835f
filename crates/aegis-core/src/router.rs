//! Handler registry and dispatch (spec §4.5). `HandlerRegistry` owns the
//! three disjoint maps (rpc/events/commands); `Router` implements
//! [`MessageHandler`] and is what actually gets handed to
//! `Transport::subscribe`/`durable_subscribe`.
//!
//! The route table is swapped atomically via [`arc_swap::ArcSwap`], the
//! same no-lock-on-read / replace-the-whole-table pattern
//! `spark-router::DefaultRouter` uses: registration is single-writer
//! during startup, but spec §4.5 permits registering after `start()`, so
//! reads must never block on a writer.

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{error, warn};

use crate::error::ErrorCode;
use crate::ids::ServiceName;
use crate::model::{Command, CommandProgress, CommandResult, Event, Priority, RpcRequest, RpcResponse};
use crate::ports::transport::{DurableMode, HandlerOutcome, MessageHandler, Transport};

#[async_trait]
pub trait RpcHandler: Send + Sync + 'static {
    async fn handle(&self, params: BTreeMap<String, Value>) -> Result<Value, (ErrorCode, String)>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckDecision {
    Ack,
    Nack,
}

#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle(&self, event: Event) -> AckDecision;
}

/// Progress callback handed to command handlers; publishing is the
/// router's job (spec §4.5), handlers just call it.
pub type ProgressCallback = Arc<dyn Fn(u8, String) + Send + Sync>;

#[async_trait]
pub trait CommandHandler: Send + Sync + 'static {
    async fn handle(&self, command: Command, progress: ProgressCallback) -> AckDecision;
}

/// Registered RPC/event/command handlers (spec §4.5). Registration is
/// permitted at any time; `HandlerRegistry` guards its maps with
/// `ArcSwap` so concurrent reads from in-flight dispatch never block.
#[derive(Default)]
pub struct HandlerRegistry {
    rpc: ArcSwap<BTreeMap<String, Arc<dyn RpcHandler>>>,
    events: ArcSwap<BTreeMap<String, (DurableMode, Arc<dyn EventHandler>)>>,
    commands: ArcSwap<BTreeMap<String, Arc<dyn CommandHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            rpc: ArcSwap::from_pointee(BTreeMap::new()),
            events: ArcSwap::from_pointee(BTreeMap::new()),
            commands: ArcSwap::from_pointee(BTreeMap::new()),
        }
    }

    /// `rpc.{service}.{method}` will be subscribed once the runtime
    /// starts; unregistered methods are never subscribed (spec §4.5
    /// "Unknown methods are not subscribed").
    pub fn register_rpc(&self, method: impl Into<String>, handler: Arc<dyn RpcHandler>) {
        let mut next = (**self.rpc.load()).clone();
        next.insert(method.into(), handler);
        self.rpc.store(Arc::new(next));
    }

    /// `mode` dictates the durable-consumer shape `subscribe_handlers`
    /// builds for this pattern (spec §4.5: COMPETE shared queue group,
    /// BROADCAST per-instance durable, EXCLUSIVE single-consumer durable).
    pub fn register_event(
        &self,
        subject_pattern: impl Into<String>,
        mode: DurableMode,
        handler: Arc<dyn EventHandler>,
    ) {
        let mut next = (**self.events.load()).clone();
        next.insert(subject_pattern.into(), (mode, handler));
        self.events.store(Arc::new(next));
    }

    pub fn register_command(&self, command: impl Into<String>, handler: Arc<dyn CommandHandler>) {
        let mut next = (**self.commands.load()).clone();
        next.insert(command.into(), handler);
        self.commands.store(Arc::new(next));
    }

    pub fn rpc_methods(&self) -> Vec<String> {
        self.rpc.load().keys().cloned().collect()
    }

    /// Pattern plus the `DurableMode` it was registered with, so
    /// `subscribe_handlers` can shape each durable consumer accordingly.
    pub fn event_patterns(&self) -> Vec<(String, DurableMode)> {
        self.events
            .load()
            .iter()
            .map(|(pattern, (mode, _))| (pattern.clone(), *mode))
            .collect()
    }

    pub fn command_names(&self) -> Vec<String> {
        self.commands.load().keys().cloned().collect()
    }

    fn rpc_handler(&self, method: &str) -> Option<Arc<dyn RpcHandler>> {
        self.rpc.load().get(method).cloned()
    }

    fn event_handler(&self, pattern: &str) -> Option<Arc<dyn EventHandler>> {
        self.events.load().get(pattern).map(|(_, handler)| Arc::clone(handler))
    }

    fn command_handler(&self, name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.commands.load().get(name).cloned()
    }
}

/// Dispatches inbound messages decoded by the wire codec to the
/// registered handler, encoding the result back per spec §4.5.
///
/// Also owns the command progress/result side-channel: publishing those
/// is the router's job, not the handler's (spec §4.5), so `Router` needs
/// its own `Transport` handle and the owning service's name to build the
/// `commands.{service}.{command}.progress|result.{message_id}` subjects.
pub struct Router {
    registry: Arc<HandlerRegistry>,
    transport: Arc<dyn Transport>,
    service_name: ServiceName,
}

impl Router {
    pub fn new(registry: Arc<HandlerRegistry>, transport: Arc<dyn Transport>, service_name: ServiceName) -> Self {
        Self {
            registry,
            transport,
            service_name,
        }
    }

    async fn dispatch_rpc(&self, payload: &[u8]) -> HandlerOutcome {
        let request: RpcRequest = match crate::codec::decode(payload) {
            Ok(request) => request,
            Err(err) => {
                error!(error = %err, "failed to decode RPC request");
                return HandlerOutcome::Reply(crate::codec::encode_best_effort(&err_response(
                    ErrorCode::InvalidRequest,
                    err.to_string(),
                )));
            }
        };

        let Some(handler) = self.registry.rpc_handler(&request.method) else {
            let response = RpcResponse::err(
                &request,
                ErrorCode::InvalidRequest,
                format!("no handler registered for method {:?}", request.method),
            );
            return HandlerOutcome::Reply(crate::codec::encode_best_effort(&response));
        };

        let response = match handler.handle(request.params.clone()).await {
            Ok(result) => RpcResponse::ok(&request, result),
            Err((code, message)) => RpcResponse::err(&request, code, message),
        };
        HandlerOutcome::Reply(crate::codec::encode_best_effort(&response))
    }

    async fn dispatch_event(&self, pattern: &str, payload: &[u8]) -> HandlerOutcome {
        let event: Event = match crate::codec::decode(payload) {
            Ok(event) => event,
            Err(err) => {
                error!(error = %err, "failed to decode event; nacking for redelivery");
                return HandlerOutcome::Nack;
            }
        };
        let Some(handler) = self.registry.event_handler(pattern) else {
            return HandlerOutcome::Nack;
        };
        match handler.handle(event).await {
            AckDecision::Ack => HandlerOutcome::Ack,
            AckDecision::Nack => HandlerOutcome::Nack,
        }
    }

    async fn dispatch_command(&self, name: &str, payload: &[u8]) -> HandlerOutcome {
        let command: Command = match crate::codec::decode(payload) {
            Ok(command) => command,
            Err(err) => {
                error!(error = %err, "failed to decode command; nacking for redelivery");
                return HandlerOutcome::Nack;
            }
        };
        let Some(handler) = self.registry.command_handler(name) else {
            return HandlerOutcome::Nack;
        };
        let message_id = command.envelope.message_id.clone();
        let progress = self.progress_callback(name, message_id.as_str());
        let outcome = handler.handle(command, progress).await;
        self.publish_command_result(name, message_id.as_str(), outcome).await;
        match outcome {
            AckDecision::Ack => HandlerOutcome::Ack,
            AckDecision::Nack => HandlerOutcome::Nack,
        }
    }

    /// Builds the callback handed to `CommandHandler::handle`; each call
    /// publishes fire-and-forget since `ProgressCallback` is a sync `Fn`,
    /// not an async one (spec §4.5 only asks that progress "publish", not
    /// that the handler wait on it).
    fn progress_callback(&self, command_name: &str, message_id: &str) -> ProgressCallback {
        let transport = Arc::clone(&self.transport);
        let subject = format!(
            "commands.{}.{command_name}.progress.{message_id}",
            self.service_name
        );
        Arc::new(move |percent, message| {
            let transport = Arc::clone(&transport);
            let subject = subject.clone();
            tokio::spawn(async move {
                let progress = CommandProgress { percent, message };
                let payload = crate::codec::encode_best_effort(&progress);
                if let Err(err) = transport.publish(&subject, payload).await {
                    warn!(error = %err, %subject, "failed to publish command progress");
                }
            });
        })
    }

    async fn publish_command_result(&self, command_name: &str, message_id: &str, outcome: AckDecision) {
        let subject = format!(
            "commands.{}.{command_name}.result.{message_id}",
            self.service_name
        );
        let result = CommandResult {
            success: outcome == AckDecision::Ack,
            message: None,
        };
        let payload = crate::codec::encode_best_effort(&result);
        if let Err(err) = self.transport.publish(&subject, payload).await {
            warn!(error = %err, %subject, "failed to publish command result");
        }
    }
}

fn err_response(code: ErrorCode, message: String) -> RpcResponse {
    RpcResponse {
        envelope: crate::model::Envelope::new(),
        success: false,
        result: None,
        error: Some(code),
        message: Some(message),
    }
}

#[async_trait]
impl MessageHandler for Router {
    /// `subject` carries enough information (leading token) to tell
    /// `rpc.*`, `events.*`, and `commands.*` apart; the runtime only ever
    /// subscribes a given `Router` to subjects of one kind, so this never
    /// has to guess across kinds.
    async fn handle(&self, subject: &str, payload: Vec<u8>) -> HandlerOutcome {
        let mut parts = subject.splitn(2, '.');
        match parts.next() {
            Some("rpc") => self.dispatch_rpc(&payload).await,
            Some("events") => {
                let pattern = subject
                    .strip_prefix("events.")
                    .and_then(|rest| rest.splitn(2, '.').nth(1))
                    .unwrap_or(subject);
                self.dispatch_event(pattern, &payload).await
            }
            Some("commands") => {
                let name = subject
                    .strip_prefix("commands.")
                    .and_then(|rest| rest.split('.').nth(1))
                    .unwrap_or(subject);
                self.dispatch_command(name, &payload).await
            }
            _ => {
                error!(%subject, "router received message on unrecognized subject family");
                HandlerOutcome::Nack
            }
        }
    }
}

/// Also implement [`Priority`] ordering helpers here since priority only
/// ever matters at dispatch/queueing time.
impl Priority {
    pub fn weight(self) -> u8 {
        match self {
            Priority::Low => 0,
            Priority::Normal => 1,
            Priority::High => 2,
            Priority::Critical => 3,
        }
    }
}
