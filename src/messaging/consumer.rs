use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;

use crate::domain::order::{OrderError, OrderEvent, OrderStatus};
use crate::metrics::Metrics;
use crate::notify::{EmailMessage, Mailer};
use crate::service::OrderService;
use crate::store::ProcessedEventStore;

// ============================================================================
// Inbound Event Consumer
// ============================================================================
//
// Turns at-least-once delivery into exactly one local effect per logical
// event: parse tolerantly, discard ids already in the processed set, run the
// side effect, then record the id. Side effects are chosen to be naturally
// idempotent (a repeated transition is a no-op, a rare duplicate email is an
// accepted cost), so a crash between effect and record followed by
// redelivery stays safe.
//
// ============================================================================

/// A consumer-specific side effect for one inbound event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Apply the effect. Business-level discards (unknown order, terminal
    /// order) return Ok so the event is recorded and never retried; only
    /// infrastructure failures return Err.
    async fn handle(&self, event: &OrderEvent) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// Effect applied and recorded.
    Handled,
    /// Event id was already processed; nothing happened.
    Duplicate,
    /// Message was malformed and dropped.
    Dropped,
    /// Transient failure; the message was not recorded and may be
    /// redelivered.
    Failed,
}

pub struct IdempotentConsumer {
    handler: Arc<dyn EventHandler>,
    processed: Arc<dyn ProcessedEventStore>,
    metrics: Arc<Metrics>,
}

impl IdempotentConsumer {
    pub fn new(
        handler: Arc<dyn EventHandler>,
        processed: Arc<dyn ProcessedEventStore>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            handler,
            processed,
            metrics,
        }
    }

    /// Process one raw message. Never panics and never returns an error; the
    /// outcome tells the listener whether the offset may be committed.
    pub async fn consume(&self, raw: &[u8]) -> ConsumeOutcome {
        let consumer = self.handler.name();

        let mut event: OrderEvent = match serde_json::from_slice(raw) {
            Ok(event) => event,
            Err(error) => {
                self.metrics.record_parse_failure(consumer);
                tracing::warn!(
                    consumer = %consumer,
                    error = %error,
                    "Dropping malformed inbound message"
                );
                return ConsumeOutcome::Dropped;
            }
        };

        let filled = event.payload_mut().fill_missing();
        if !filled.is_empty() {
            tracing::warn!(
                consumer = %consumer,
                event_id = %event.event_id(),
                fields = ?filled,
                "Inbound event missing optional fields, using placeholders"
            );
        }

        let event_id = event.event_id();

        match self.processed.is_processed(event_id).await {
            Ok(true) => {
                self.metrics.record_duplicate(consumer);
                tracing::info!(
                    consumer = %consumer,
                    event_id = %event_id,
                    "⏭️  Skipping already processed event"
                );
                return ConsumeOutcome::Duplicate;
            }
            Ok(false) => {}
            Err(error) => {
                tracing::error!(
                    consumer = %consumer,
                    event_id = %event_id,
                    error = %error,
                    "Dedup check failed, leaving event for redelivery"
                );
                return ConsumeOutcome::Failed;
            }
        }

        if let Err(error) = self.handler.handle(&event).await {
            tracing::error!(
                consumer = %consumer,
                event_id = %event_id,
                event_type = %event.type_name(),
                error = %error,
                "Event handler failed, leaving event for redelivery"
            );
            return ConsumeOutcome::Failed;
        }

        match self.processed.mark_processed(event_id).await {
            Ok(true) => {
                self.metrics.record_consumed(consumer);
                tracing::debug!(
                    consumer = %consumer,
                    event_id = %event_id,
                    "Recorded processed event"
                );
                ConsumeOutcome::Handled
            }
            Ok(false) => {
                // A concurrent delivery won the insert; its effect stands and
                // ours was the same no-op.
                self.metrics.record_duplicate(consumer);
                tracing::info!(
                    consumer = %consumer,
                    event_id = %event_id,
                    "Lost dedup race to a concurrent delivery"
                );
                ConsumeOutcome::Duplicate
            }
            Err(error) => {
                tracing::error!(
                    consumer = %consumer,
                    event_id = %event_id,
                    error = %error,
                    "Failed to record processed event; a redelivery will repeat the side effect"
                );
                ConsumeOutcome::Failed
            }
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Applies externally-sourced outcome events (delivered / cancelled /
/// processing-failed) as local status transitions.
pub struct StatusUpdateHandler {
    service: Arc<OrderService>,
}

impl StatusUpdateHandler {
    pub fn new(service: Arc<OrderService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl EventHandler for StatusUpdateHandler {
    fn name(&self) -> &'static str {
        "order-status"
    }

    async fn handle(&self, event: &OrderEvent) -> anyhow::Result<()> {
        let (target, comment) = match event {
            OrderEvent::Created(_) => {
                tracing::debug!(
                    order_number = %event.order_number(),
                    "Ignoring CREATED event on the outcome stream"
                );
                return Ok(());
            }
            OrderEvent::Delivered(p) => (OrderStatus::Delivered, p.reason.clone()),
            OrderEvent::Cancelled(p) => (OrderStatus::Cancelled, p.reason.clone()),
            OrderEvent::Error(p) => (OrderStatus::Error, p.reason.clone()),
        };

        match self
            .service
            .update_order_status(event.order_number(), target, comment, self.name())
            .await
        {
            Ok(()) => Ok(()),
            Err(OrderError::NotFound(order_number)) => {
                // Never create a phantom order for an unknown number.
                tracing::warn!(
                    order_number = %order_number,
                    event_id = %event.event_id(),
                    "Discarding event for unknown order"
                );
                Ok(())
            }
            Err(OrderError::IllegalTransition { from, to }) => {
                tracing::warn!(
                    order_number = %event.order_number(),
                    from = %from,
                    to = %to,
                    "Discarding event that would leave a terminal status"
                );
                Ok(())
            }
            Err(error) => Err(error.into()),
        }
    }
}

/// The notification consumer: one email per event.
pub struct NotificationHandler {
    mailer: Arc<dyn Mailer>,
}

impl NotificationHandler {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }
}

#[async_trait]
impl EventHandler for NotificationHandler {
    fn name(&self) -> &'static str {
        "order-notifications"
    }

    async fn handle(&self, event: &OrderEvent) -> anyhow::Result<()> {
        let payload = event.payload();
        let order_number = &payload.order_number;

        let (subject, body) = match event {
            OrderEvent::Created(_) => (
                format!("Order {order_number} received"),
                format!(
                    "Hi {},\n\nWe received your order {order_number} and will keep you posted.",
                    payload.customer.name
                ),
            ),
            OrderEvent::Delivered(_) => (
                format!("Order {order_number} delivered"),
                format!(
                    "Hi {},\n\nYour order {order_number} was delivered to {}, {}.",
                    payload.customer.name, payload.address.line1, payload.address.city
                ),
            ),
            OrderEvent::Cancelled(p) => (
                format!("Order {order_number} cancelled"),
                format!(
                    "Hi {},\n\nYour order {order_number} was cancelled. Reason: {}.",
                    payload.customer.name,
                    p.reason.as_deref().unwrap_or("not specified")
                ),
            ),
            OrderEvent::Error(p) => (
                format!("Problem with order {order_number}"),
                format!(
                    "Hi {},\n\nWe hit a problem processing order {order_number}: {}.\nOur team is looking into it.",
                    payload.customer.name,
                    p.reason.as_deref().unwrap_or("unexpected failure")
                ),
            ),
        };

        self.mailer
            .send(&EmailMessage {
                to: payload.customer.email.clone(),
                subject,
                body,
            })
            .await
    }
}

// ============================================================================
// Kafka Listener
// ============================================================================

/// Subscribe to `topics` and feed every message through the pipeline.
/// Manual commits after handling give at-least-once delivery; a Failed
/// outcome leaves the offset uncommitted so the event comes back after a
/// rebalance or restart. Per-message errors never end the loop.
pub async fn run_listener(
    brokers: &str,
    group: &str,
    topics: &[&str],
    pipeline: IdempotentConsumer,
) -> anyhow::Result<()> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .set("group.id", group)
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest")
        .set("session.timeout.ms", "6000")
        .create()?;

    consumer.subscribe(topics)?;

    tracing::info!(
        group = %group,
        topics = ?topics,
        "👂 Listening for inbound events"
    );

    let mut stream = consumer.stream();
    while let Some(result) = stream.next().await {
        match result {
            Ok(message) => {
                let Some(payload) = message.payload() else {
                    tracing::warn!(
                        topic = message.topic(),
                        offset = message.offset(),
                        "Skipping message without payload"
                    );
                    commit(&consumer, &message);
                    continue;
                };

                let outcome = pipeline.consume(payload).await;
                if outcome != ConsumeOutcome::Failed {
                    commit(&consumer, &message);
                }
            }
            Err(error) => {
                tracing::error!(error = %error, "Kafka receive error");
            }
        }
    }

    Ok(())
}

fn commit(consumer: &StreamConsumer, message: &rdkafka::message::BorrowedMessage<'_>) {
    if let Err(error) = consumer.commit_message(message, CommitMode::Async) {
        tracing::warn!(
            topic = message.topic(),
            offset = message.offset(),
            error = %error,
            "Failed to commit offset (message may be redelivered)"
        );
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::StaticCatalog;
    use crate::domain::order::{Address, Customer, EventPayload, OrderItem};
    use crate::domain::payment::ApproveAllGateway;
    use crate::store::{MemoryProcessedEvents, MemoryStore, OrderStore};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use tokio::sync::Mutex;
    use uuid::Uuid;

    struct RecordingMailer {
        sent: Mutex<Vec<EmailMessage>>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
            self.sent.lock().await.push(message.clone());
            Ok(())
        }
    }

    fn service(store: Arc<MemoryStore>) -> Arc<OrderService> {
        Arc::new(OrderService::new(
            store.clone(),
            store,
            Arc::new(StaticCatalog::new().with_product("P1", Decimal::from_str("10.00").unwrap())),
            Arc::new(ApproveAllGateway),
            Arc::new(Metrics::new().unwrap()),
        ))
    }

    fn status_pipeline(store: Arc<MemoryStore>) -> IdempotentConsumer {
        IdempotentConsumer::new(
            Arc::new(StatusUpdateHandler::new(service(store))),
            Arc::new(MemoryProcessedEvents::new()),
            Arc::new(Metrics::new().unwrap()),
        )
    }

    async fn seed_order(store: &MemoryStore, number: &str) {
        let order = crate::domain::order::Order::place(
            number.to_string(),
            "u1".to_string(),
            Customer {
                name: "Jane".to_string(),
                email: "jane@example.com".to_string(),
                phone: "555-0101".to_string(),
            },
            Address {
                line1: "1 Main St".to_string(),
                line2: None,
                city: "Springfield".to_string(),
                state: "IL".to_string(),
                zip: "62704".to_string(),
                country: "USA".to_string(),
            },
            vec![OrderItem {
                code: "P1".to_string(),
                name: "Widget".to_string(),
                price: Decimal::from_str("10.00").unwrap(),
                quantity: 1,
            }],
            None,
        )
        .unwrap();
        store.insert(&order, None).await.unwrap();
    }

    fn cancelled_event(order_number: &str) -> OrderEvent {
        OrderEvent::Cancelled(EventPayload {
            event_id: Uuid::new_v4(),
            order_number: order_number.to_string(),
            items: vec![],
            customer: Customer {
                name: "Jane".to_string(),
                email: "jane@example.com".to_string(),
                phone: "555-0101".to_string(),
            },
            address: Address {
                line1: "1 Main St".to_string(),
                line2: None,
                city: "Springfield".to_string(),
                state: "IL".to_string(),
                zip: "62704".to_string(),
                country: "USA".to_string(),
            },
            reason: Some("customer request".to_string()),
            created_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_duplicate_delivery_applies_exactly_once() {
        let store = Arc::new(MemoryStore::new());
        seed_order(&store, "O-1").await;

        let pipeline = status_pipeline(store.clone());
        let raw = serde_json::to_vec(&cancelled_event("O-1")).unwrap();

        assert_eq!(pipeline.consume(&raw).await, ConsumeOutcome::Handled);
        assert_eq!(pipeline.consume(&raw).await, ConsumeOutcome::Duplicate);

        let order = store.get("O-1").await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);

        let history = store.history("O-1").await.unwrap();
        let cancelled_rows: Vec<_> = history
            .iter()
            .filter(|change| change.new_status == OrderStatus::Cancelled)
            .collect();
        assert_eq!(cancelled_rows.len(), 1, "second delivery must be a no-op");
    }

    #[tokio::test]
    async fn test_malformed_message_is_dropped() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = status_pipeline(store);

        assert_eq!(
            pipeline.consume(b"not json at all").await,
            ConsumeOutcome::Dropped
        );
        assert_eq!(
            pipeline.consume(br#"{"type":"DELIVERED","data":{}}"#).await,
            ConsumeOutcome::Dropped,
            "a payload without an event id cannot be deduplicated"
        );
    }

    #[tokio::test]
    async fn test_sparse_payload_still_applies() {
        let store = Arc::new(MemoryStore::new());
        seed_order(&store, "O-2").await;

        let pipeline = status_pipeline(store.clone());
        let raw = format!(
            r#"{{"type":"DELIVERED","data":{{"event_id":"{}","order_number":"O-2"}}}}"#,
            Uuid::new_v4()
        );

        assert_eq!(pipeline.consume(raw.as_bytes()).await, ConsumeOutcome::Handled);
        let order = store.get("O-2").await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Delivered);
    }

    #[tokio::test]
    async fn test_unknown_order_is_discarded_without_side_effect() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = status_pipeline(store.clone());
        let raw = serde_json::to_vec(&cancelled_event("GHOST")).unwrap();

        // Discarded but recorded, so a redelivery is a plain duplicate.
        assert_eq!(pipeline.consume(&raw).await, ConsumeOutcome::Handled);
        assert!(store.get("GHOST").await.unwrap().is_none());
        assert!(store.history("GHOST").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_event_into_terminal_order_is_discarded() {
        let store = Arc::new(MemoryStore::new());
        seed_order(&store, "O-3").await;

        let pipeline = status_pipeline(store.clone());
        let cancel = serde_json::to_vec(&cancelled_event("O-3")).unwrap();
        assert_eq!(pipeline.consume(&cancel).await, ConsumeOutcome::Handled);

        // A DELIVERED event for the now-cancelled order is dropped, not an
        // endless redelivery loop.
        let deliver = format!(
            r#"{{"type":"DELIVERED","data":{{"event_id":"{}","order_number":"O-3"}}}}"#,
            Uuid::new_v4()
        );
        assert_eq!(
            pipeline.consume(deliver.as_bytes()).await,
            ConsumeOutcome::Handled
        );
        let order = store.get("O-3").await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_notification_handler_mails_once_per_event() {
        let mailer = Arc::new(RecordingMailer {
            sent: Mutex::new(Vec::new()),
        });
        let pipeline = IdempotentConsumer::new(
            Arc::new(NotificationHandler::new(mailer.clone())),
            Arc::new(MemoryProcessedEvents::new()),
            Arc::new(Metrics::new().unwrap()),
        );

        let raw = serde_json::to_vec(&cancelled_event("O-9")).unwrap();
        assert_eq!(pipeline.consume(&raw).await, ConsumeOutcome::Handled);
        assert_eq!(pipeline.consume(&raw).await, ConsumeOutcome::Duplicate);

        let sent = mailer.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "jane@example.com");
        assert!(sent[0].subject.contains("O-9"));
        assert!(sent[0].body.contains("customer request"));
    }
}
