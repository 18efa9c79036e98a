use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::order::{Order, OrderEvent, OrderStatus, StatusChange};

mod memory;
mod scylla;

pub use memory::{MemoryProcessedEvents, MemoryStore};
pub use self::scylla::{ScyllaProcessedEvents, ScyllaStore};

// ============================================================================
// Persistence Ports
// ============================================================================
//
// Three seams: the order aggregate + its audit trail, the outbox, and the
// consumer-side processed-event set. The multi-row write methods take every
// row of one state change together so an adapter can commit them atomically
// (the ScyllaDB adapter batches them; the in-memory adapter applies them
// under one lock).
//
// ============================================================================

/// Pending or published domain event, keyed by its globally unique event id.
/// Retention is mark-published-and-retain: `published_at` flips once and the
/// row stays behind as an audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub event_id: Uuid,
    pub event_type: String,
    pub order_number: String,
    pub payload: String,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

impl OutboxRecord {
    pub fn from_event(event: &OrderEvent) -> anyhow::Result<Self> {
        Ok(Self {
            event_id: event.event_id(),
            event_type: event.type_name().to_string(),
            order_number: event.order_number().to_string(),
            payload: serde_json::to_string(event)?,
            created_at: Utc::now(),
            published_at: None,
        })
    }
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist a new order and, when present, its CREATED outbox event in one
    /// transaction.
    async fn insert(&self, order: &Order, outbox: Option<&OutboxRecord>) -> anyhow::Result<()>;

    /// Persist an executed transition: updated order row, one history row,
    /// and optionally one outbox event, all in one transaction.
    async fn update(
        &self,
        order: &Order,
        change: &StatusChange,
        outbox: Option<&OutboxRecord>,
    ) -> anyhow::Result<()>;

    async fn get(&self, order_number: &str) -> anyhow::Result<Option<Order>>;

    async fn find_by_status(&self, status: OrderStatus) -> anyhow::Result<Vec<Order>>;

    async fn history(&self, order_number: &str) -> anyhow::Result<Vec<StatusChange>>;
}

#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Append a standalone event outside any order transaction (used by the
    /// payment-rejected re-notification path).
    async fn append(&self, record: &OutboxRecord) -> anyhow::Result<()>;

    /// All not-yet-published events, oldest first.
    async fn fetch_unpublished(&self) -> anyhow::Result<Vec<OutboxRecord>>;

    async fn mark_published(&self, event_id: Uuid) -> anyhow::Result<()>;
}

/// Consumer-side dedup set. One instance per consumer name; existence of an
/// id means the event was handled.
#[async_trait]
pub trait ProcessedEventStore: Send + Sync {
    async fn is_processed(&self, event_id: Uuid) -> anyhow::Result<bool>;

    /// Record the id. Returns false when another writer got there first; the
    /// loser treats the event as a duplicate.
    async fn mark_processed(&self, event_id: Uuid) -> anyhow::Result<bool>;
}
