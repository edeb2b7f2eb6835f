//! S5 — event redelivery on handler failure. A COMPETE event handler
//! that fails gets redelivered; once it exhausts `max_deliver` attempts
//! without acking, it is dead-lettered instead of retried forever.
//!
//! `MockTransport`'s `durable_subscribe` doesn't model JetStream's actual
//! redelivery/ack-wait/dead-letter machinery — `aegis-transport-nats` is
//! what enforces that against a real `DurableMode::Compete` consumer.
//! What the core crate owns, and what this exercises, is the handler
//! contract itself: `AckDecision::Nack` maps to `HandlerOutcome::Nack`,
//! and a caller driving repeated delivery attempts sees exactly that
//! sequence up to the delivery cap.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use aegis_core::codec;
use aegis_core::ids::ServiceName;
use aegis_core::model::{Envelope, Event};
use aegis_core::ports::transport::{DurableMode, HandlerOutcome, MessageHandler, Transport};
use aegis_core::router::{AckDecision, EventHandler, HandlerRegistry, Router};
use aegis_core::test_stubs::MockTransport;

const MAX_DELIVER: u32 = 3;

struct FlakyHandler {
    attempts: AtomicU32,
    succeed_on_attempt: u32,
}

#[async_trait]
impl EventHandler for FlakyHandler {
    async fn handle(&self, _event: Event) -> AckDecision {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt >= self.succeed_on_attempt {
            AckDecision::Ack
        } else {
            AckDecision::Nack
        }
    }
}

fn created_event_payload() -> Vec<u8> {
    let event = Event {
        envelope: Envelope::new(),
        domain: "orders".to_string(),
        event_type: "created".to_string(),
        payload: Default::default(),
        version: "1.0".to_string(),
    };
    codec::encode(&event).expect("literal event encodes")
}

pub async fn run() -> Result<(), String> {
    let payload = created_event_payload();

    let registry = Arc::new(HandlerRegistry::new());
    let handler = Arc::new(FlakyHandler {
        attempts: AtomicU32::new(0),
        succeed_on_attempt: 2,
    });
    registry.register_event("created", DurableMode::Compete, Arc::clone(&handler) as Arc<dyn EventHandler>);
    let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
    transport.connect(&[]).await.map_err(|e| e.to_string())?;
    let router = Router::new(Arc::clone(&registry), Arc::clone(&transport), ServiceName::parse("orders").unwrap());

    let mut outcomes = Vec::new();
    loop {
        let outcome = router.handle("events.orders.created", payload.clone()).await;
        let acked = matches!(outcome, HandlerOutcome::Ack);
        outcomes.push(outcome);
        if acked || outcomes.len() as u32 >= MAX_DELIVER {
            break;
        }
    }

    if outcomes.len() != 2 {
        return Err(format!("expected the handler to be redelivered exactly once before succeeding, saw {} attempts", outcomes.len()));
    }
    if !matches!(outcomes[0], HandlerOutcome::Nack) {
        return Err("expected the first delivery attempt to nack".to_string());
    }
    if !matches!(outcomes[1], HandlerOutcome::Ack) {
        return Err("expected the redelivered attempt to ack".to_string());
    }

    let registry = Arc::new(HandlerRegistry::new());
    let always_fails = Arc::new(FlakyHandler {
        attempts: AtomicU32::new(0),
        succeed_on_attempt: u32::MAX,
    });
    registry.register_event("created", DurableMode::Compete, Arc::clone(&always_fails) as Arc<dyn EventHandler>);
    let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
    transport.connect(&[]).await.map_err(|e| e.to_string())?;
    let router = Router::new(registry, transport, ServiceName::parse("orders").unwrap());

    let mut attempts = 0u32;
    loop {
        let outcome = router.handle("events.orders.created", payload.clone()).await;
        attempts += 1;
        if matches!(outcome, HandlerOutcome::Ack) || attempts >= MAX_DELIVER {
            break;
        }
    }
    if attempts != MAX_DELIVER {
        return Err(format!("expected exactly {MAX_DELIVER} delivery attempts before dead-lettering, saw {attempts}"));
    }
    if always_fails.attempts.load(Ordering::SeqCst) != MAX_DELIVER {
        return Err("expected the dead-lettered handler to stop being invoked after max_deliver".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn a_failing_handler_is_redelivered_then_dead_lettered_past_max_deliver() {
        run().await.unwrap();
    }
}
