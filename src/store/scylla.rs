use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scylla::client::session::Session;
use scylla::statement::batch::Batch;
use scylla::value::{CqlValue, Row};
use uuid::Uuid;

use crate::domain::order::{Address, Customer, Order, OrderItem, OrderStatus, StatusChange};

use super::{OrderStore, OutboxRecord, OutboxStore, ProcessedEventStore};

// ============================================================================
// ScyllaDB Adapter
// ============================================================================
//
// Orders, history and outbox rows for one state change go into a single
// batch, so either every row of a transition is visible or none is. Items,
// customer and address are stored as JSON text columns; the event payload
// column already is JSON.
//
// ============================================================================

pub struct ScyllaStore {
    session: Arc<Session>,
}

type OrderRow = (
    String,         // order_number
    String,         // user_id
    String,         // items json
    String,         // customer json
    String,         // address json
    String,         // status
    Option<String>, // comments
    DateTime<Utc>,  // created_at
);

impl ScyllaStore {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Create the tables this adapter reads and writes.
    pub async fn init(&self) -> anyhow::Result<()> {
        self.session
            .query_unpaged(
                "CREATE TABLE IF NOT EXISTS orders (
                    order_number text PRIMARY KEY,
                    user_id text,
                    items text,
                    customer text,
                    address text,
                    status text,
                    comments text,
                    created_at timestamp
                )",
                &[],
            )
            .await?;

        self.session
            .query_unpaged(
                "CREATE TABLE IF NOT EXISTS order_status_history (
                    order_number text,
                    changed_at timestamp,
                    previous_status text,
                    new_status text,
                    comment text,
                    changed_by text,
                    PRIMARY KEY ((order_number), changed_at)
                )",
                &[],
            )
            .await?;

        self.session
            .query_unpaged(
                "CREATE TABLE IF NOT EXISTS outbox_events (
                    event_id uuid PRIMARY KEY,
                    event_type text,
                    order_number text,
                    payload text,
                    created_at timestamp,
                    published_at timestamp,
                    pending boolean
                )",
                &[],
            )
            .await?;

        self.session
            .query_unpaged(
                "CREATE TABLE IF NOT EXISTS processed_events (
                    consumer text,
                    event_id uuid,
                    processed_at timestamp,
                    PRIMARY KEY ((consumer), event_id)
                )",
                &[],
            )
            .await?;

        tracing::info!("Order schema ready");
        Ok(())
    }

    fn order_values(order: &Order) -> anyhow::Result<OrderRow> {
        Ok((
            order.order_number.clone(),
            order.user_id.clone(),
            serde_json::to_string(&order.items)?,
            serde_json::to_string(&order.customer)?,
            serde_json::to_string(&order.address)?,
            order.status.as_str().to_string(),
            order.comments.clone(),
            order.created_at,
        ))
    }

    fn order_from_row(row: OrderRow) -> anyhow::Result<Order> {
        let (order_number, user_id, items, customer, address, status, comments, created_at) = row;

        let items: Vec<OrderItem> = serde_json::from_str(&items)?;
        let customer: Customer = serde_json::from_str(&customer)?;
        let address: Address = serde_json::from_str(&address)?;
        let status = OrderStatus::parse(&status)
            .ok_or_else(|| anyhow::anyhow!("Unknown order status in storage: {status}"))?;

        Ok(Order {
            order_number,
            user_id,
            items,
            customer,
            address,
            status,
            comments,
            created_at,
        })
    }
}

const INSERT_ORDER: &str = "INSERT INTO orders (
    order_number, user_id, items, customer, address, status, comments, created_at
) VALUES (?, ?, ?, ?, ?, ?, ?, ?)";

const UPDATE_ORDER: &str = "UPDATE orders SET status = ?, comments = ? WHERE order_number = ?";

const INSERT_HISTORY: &str = "INSERT INTO order_status_history (
    order_number, changed_at, previous_status, new_status, comment, changed_by
) VALUES (?, ?, ?, ?, ?, ?)";

const INSERT_OUTBOX: &str = "INSERT INTO outbox_events (
    event_id, event_type, order_number, payload, created_at, published_at, pending
) VALUES (?, ?, ?, ?, ?, null, true)";

type OutboxValues = (Uuid, String, String, String, DateTime<Utc>);

fn outbox_values(record: &OutboxRecord) -> OutboxValues {
    (
        record.event_id,
        record.event_type.clone(),
        record.order_number.clone(),
        record.payload.clone(),
        record.created_at,
    )
}

#[async_trait]
impl OrderStore for ScyllaStore {
    async fn insert(&self, order: &Order, outbox: Option<&OutboxRecord>) -> anyhow::Result<()> {
        let values = Self::order_values(order)?;

        match outbox {
            Some(record) => {
                let mut batch = Batch::default();
                batch.append_statement(INSERT_ORDER);
                batch.append_statement(INSERT_OUTBOX);
                self.session
                    .batch(&batch, (values, outbox_values(record)))
                    .await?;
            }
            None => {
                self.session.query_unpaged(INSERT_ORDER, values).await?;
            }
        }

        tracing::debug!(
            order_number = %order.order_number,
            status = %order.status,
            with_event = outbox.is_some(),
            "Persisted order"
        );
        Ok(())
    }

    async fn update(
        &self,
        order: &Order,
        change: &StatusChange,
        outbox: Option<&OutboxRecord>,
    ) -> anyhow::Result<()> {
        let order_values = (
            order.status.as_str().to_string(),
            order.comments.clone(),
            order.order_number.clone(),
        );
        let history_values = (
            change.order_number.clone(),
            change.changed_at,
            change.previous_status.as_str().to_string(),
            change.new_status.as_str().to_string(),
            change.comment.clone(),
            change.changed_by.clone(),
        );

        let mut batch = Batch::default();
        batch.append_statement(UPDATE_ORDER);
        batch.append_statement(INSERT_HISTORY);

        match outbox {
            Some(record) => {
                batch.append_statement(INSERT_OUTBOX);
                self.session
                    .batch(&batch, (order_values, history_values, outbox_values(record)))
                    .await?;
            }
            None => {
                self.session
                    .batch(&batch, (order_values, history_values))
                    .await?;
            }
        }

        tracing::debug!(
            order_number = %order.order_number,
            from = %change.previous_status,
            to = %change.new_status,
            with_event = outbox.is_some(),
            "Persisted status change"
        );
        Ok(())
    }

    async fn get(&self, order_number: &str) -> anyhow::Result<Option<Order>> {
        let result = self
            .session
            .query_unpaged(
                "SELECT order_number, user_id, items, customer, address, status, comments, created_at
                 FROM orders WHERE order_number = ?",
                (order_number,),
            )
            .await?;

        let rows_result = match result.into_rows_result() {
            Ok(rows) => rows,
            Err(_) => return Ok(None),
        };

        match rows_result.maybe_first_row::<OrderRow>() {
            Ok(Some(row)) => Ok(Some(Self::order_from_row(row)?)),
            _ => Ok(None),
        }
    }

    async fn find_by_status(&self, status: OrderStatus) -> anyhow::Result<Vec<Order>> {
        let result = self
            .session
            .query_unpaged(
                "SELECT order_number, user_id, items, customer, address, status, comments, created_at
                 FROM orders WHERE status = ? ALLOW FILTERING",
                (status.as_str(),),
            )
            .await?;

        let mut orders = Vec::new();
        let rows_result = match result.into_rows_result() {
            Ok(rows) => rows,
            Err(_) => return Ok(orders),
        };

        for row in rows_result.rows::<OrderRow>()? {
            orders.push(Self::order_from_row(row?)?);
        }

        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(orders)
    }

    async fn history(&self, order_number: &str) -> anyhow::Result<Vec<StatusChange>> {
        let result = self
            .session
            .query_unpaged(
                "SELECT order_number, changed_at, previous_status, new_status, comment, changed_by
                 FROM order_status_history WHERE order_number = ? ORDER BY changed_at ASC",
                (order_number,),
            )
            .await?;

        let mut entries = Vec::new();
        let rows_result = match result.into_rows_result() {
            Ok(rows) => rows,
            Err(_) => return Ok(entries),
        };

        for row in rows_result
            .rows::<(String, DateTime<Utc>, String, String, Option<String>, String)>()?
        {
            let (order_number, changed_at, previous, new, comment, changed_by) = row?;

            let previous_status = OrderStatus::parse(&previous)
                .ok_or_else(|| anyhow::anyhow!("Unknown status in history: {previous}"))?;
            let new_status = OrderStatus::parse(&new)
                .ok_or_else(|| anyhow::anyhow!("Unknown status in history: {new}"))?;

            entries.push(StatusChange {
                order_number,
                previous_status,
                new_status,
                comment,
                changed_at,
                changed_by,
            });
        }

        Ok(entries)
    }
}

#[async_trait]
impl OutboxStore for ScyllaStore {
    async fn append(&self, record: &OutboxRecord) -> anyhow::Result<()> {
        self.session
            .query_unpaged(INSERT_OUTBOX, outbox_values(record))
            .await?;
        Ok(())
    }

    async fn fetch_unpublished(&self) -> anyhow::Result<Vec<OutboxRecord>> {
        let result = self
            .session
            .query_unpaged(
                "SELECT event_id, event_type, order_number, payload, created_at, published_at
                 FROM outbox_events WHERE pending = true ALLOW FILTERING",
                &[],
            )
            .await?;

        let mut records = Vec::new();
        let rows_result = match result.into_rows_result() {
            Ok(rows) => rows,
            Err(_) => return Ok(records),
        };

        for row in rows_result
            .rows::<(Uuid, String, String, String, DateTime<Utc>, Option<DateTime<Utc>>)>()?
        {
            let (event_id, event_type, order_number, payload, created_at, published_at) = row?;
            records.push(OutboxRecord {
                event_id,
                event_type,
                order_number,
                payload,
                created_at,
                published_at,
            });
        }

        // No index on created_at; order the batch client-side.
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    async fn mark_published(&self, event_id: Uuid) -> anyhow::Result<()> {
        self.session
            .query_unpaged(
                "UPDATE outbox_events SET pending = false, published_at = ? WHERE event_id = ?",
                (Utc::now(), event_id),
            )
            .await?;
        Ok(())
    }
}

/// Dedup set partitioned by consumer name. `mark_processed` uses a
/// lightweight transaction so concurrent duplicate deliveries serialize on
/// the cluster; the losing writer sees applied = false.
pub struct ScyllaProcessedEvents {
    session: Arc<Session>,
    consumer: String,
}

impl ScyllaProcessedEvents {
    pub fn new(session: Arc<Session>, consumer: &str) -> Self {
        Self {
            session,
            consumer: consumer.to_string(),
        }
    }
}

#[async_trait]
impl ProcessedEventStore for ScyllaProcessedEvents {
    async fn is_processed(&self, event_id: Uuid) -> anyhow::Result<bool> {
        let result = self
            .session
            .query_unpaged(
                "SELECT event_id FROM processed_events WHERE consumer = ? AND event_id = ?",
                (&self.consumer, event_id),
            )
            .await?;

        let rows_result = match result.into_rows_result() {
            Ok(rows) => rows,
            Err(_) => return Ok(false),
        };

        Ok(matches!(rows_result.maybe_first_row::<(Uuid,)>(), Ok(Some(_))))
    }

    async fn mark_processed(&self, event_id: Uuid) -> anyhow::Result<bool> {
        let result = self
            .session
            .query_unpaged(
                "INSERT INTO processed_events (consumer, event_id, processed_at)
                 VALUES (?, ?, ?) IF NOT EXISTS",
                (&self.consumer, event_id, Utc::now()),
            )
            .await?;

        // An LWT result row leads with the [applied] boolean; on conflict the
        // existing row's columns follow, so map the row untyped.
        let rows_result = result.into_rows_result()?;
        let applied = rows_result
            .rows::<Row>()?
            .next()
            .transpose()?
            .and_then(|row| row.columns.first().cloned().flatten())
            .map(|value| matches!(value, CqlValue::Boolean(true)))
            .unwrap_or(false);

        Ok(applied)
    }
}
