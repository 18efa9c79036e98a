use std::sync::Arc;
use std::time::Instant;

use crate::config::Topics;
use crate::domain::order::OrderEvent;
use crate::metrics::Metrics;
use crate::store::{OutboxRecord, OutboxStore};
use crate::utils::{retry, Backoff};

use super::EventPublisher;

// ============================================================================
// Outbox Relay
// ============================================================================
//
// Bridges durable local state to the unreliable transport. Each tick drains
// the unpublished outbox rows oldest-first; a row is marked published only
// after the transport accepted it, so a crash mid-batch just means the next
// tick picks up where the rows say. One failing event never blocks the rest
// of the batch.
//
// ============================================================================

pub struct OutboxRelay {
    outbox: Arc<dyn OutboxStore>,
    publisher: Arc<dyn EventPublisher>,
    topics: Topics,
    metrics: Arc<Metrics>,
    backoff: Backoff,
}

impl OutboxRelay {
    pub fn new(
        outbox: Arc<dyn OutboxStore>,
        publisher: Arc<dyn EventPublisher>,
        topics: Topics,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            outbox,
            publisher,
            topics,
            metrics,
            backoff: Backoff::quick(),
        }
    }

    /// Scheduler entry point. Never returns an error; failures are logged and
    /// the affected events stay pending for the next tick.
    pub async fn relay_pending_events(&self) {
        let started = Instant::now();

        let pending = match self.outbox.fetch_unpublished().await {
            Ok(pending) => pending,
            Err(error) => {
                tracing::error!(error = %error, "Failed to fetch pending outbox events");
                return;
            }
        };

        if pending.is_empty() {
            tracing::debug!("No pending outbox events");
            return;
        }

        tracing::info!(batch = pending.len(), "📬 Relaying pending outbox events");

        for record in &pending {
            if let Err(error) = self.relay_one(record).await {
                // Per-event isolation: log and move on, the row stays pending.
                self.metrics.record_relay_failure(&record.event_type);
                tracing::warn!(
                    event_id = %record.event_id,
                    event_type = %record.event_type,
                    order_number = %record.order_number,
                    error = %error,
                    "Failed to publish outbox event, leaving pending for next tick"
                );
            }
        }

        self.metrics
            .relay_batch_duration
            .observe(started.elapsed().as_secs_f64());
    }

    async fn relay_one(&self, record: &OutboxRecord) -> anyhow::Result<()> {
        let event: OrderEvent = serde_json::from_str(&record.payload)?;
        let topic = self.topics.for_event(&event);

        retry(self.backoff, || {
            self.publisher
                .publish(topic, event.order_number(), &record.payload)
        })
        .await?;

        self.outbox.mark_published(record.event_id).await?;
        self.metrics.record_relayed(&record.event_type);

        tracing::info!(
            event_id = %record.event_id,
            event_type = %record.event_type,
            topic = %topic,
            "✅ Published outbox event"
        );
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
