use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::order::{Order, OrderStatus, StatusChange};

use super::{OrderStore, OutboxRecord, OutboxStore, ProcessedEventStore};

// ============================================================================
// In-Memory Adapter
// ============================================================================
//
// Single-process implementation of the persistence ports. All tables live
// behind one mutex, so a multi-row write commits as a unit and a reader never
// observes an order row without its history row.
//
// ============================================================================

#[derive(Default)]
struct Tables {
    orders: HashMap<String, Order>,
    history: Vec<StatusChange>,
    outbox: Vec<OutboxRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of outbox rows, published or not. Test helper.
    pub async fn outbox_len(&self) -> usize {
        self.tables.lock().await.outbox.len()
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert(&self, order: &Order, outbox: Option<&OutboxRecord>) -> anyhow::Result<()> {
        let mut tables = self.tables.lock().await;
        tables
            .orders
            .insert(order.order_number.clone(), order.clone());
        if let Some(record) = outbox {
            tables.outbox.push(record.clone());
        }
        Ok(())
    }

    async fn update(
        &self,
        order: &Order,
        change: &StatusChange,
        outbox: Option<&OutboxRecord>,
    ) -> anyhow::Result<()> {
        let mut tables = self.tables.lock().await;
        tables
            .orders
            .insert(order.order_number.clone(), order.clone());
        tables.history.push(change.clone());
        if let Some(record) = outbox {
            tables.outbox.push(record.clone());
        }
        Ok(())
    }

    async fn get(&self, order_number: &str) -> anyhow::Result<Option<Order>> {
        Ok(self.tables.lock().await.orders.get(order_number).cloned())
    }

    async fn find_by_status(&self, status: OrderStatus) -> anyhow::Result<Vec<Order>> {
        let tables = self.tables.lock().await;
        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|order| order.status == status)
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(orders)
    }

    async fn history(&self, order_number: &str) -> anyhow::Result<Vec<StatusChange>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .history
            .iter()
            .filter(|change| change.order_number == order_number)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl OutboxStore for MemoryStore {
    async fn append(&self, record: &OutboxRecord) -> anyhow::Result<()> {
        self.tables.lock().await.outbox.push(record.clone());
        Ok(())
    }

    async fn fetch_unpublished(&self) -> anyhow::Result<Vec<OutboxRecord>> {
        let tables = self.tables.lock().await;
        let mut pending: Vec<OutboxRecord> = tables
            .outbox
            .iter()
            .filter(|record| record.published_at.is_none())
            .cloned()
            .collect();
        // Stable sort keeps insertion order for same-timestamp rows.
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(pending)
    }

    async fn mark_published(&self, event_id: Uuid) -> anyhow::Result<()> {
        let mut tables = self.tables.lock().await;
        if let Some(record) = tables
            .outbox
            .iter_mut()
            .find(|record| record.event_id == event_id)
        {
            record.published_at = Some(Utc::now());
        }
        Ok(())
    }
}

/// Per-consumer dedup set.
#[derive(Default)]
pub struct MemoryProcessedEvents {
    seen: Mutex<HashSet<Uuid>>,
}

impl MemoryProcessedEvents {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessedEventStore for MemoryProcessedEvents {
    async fn is_processed(&self, event_id: Uuid) -> anyhow::Result<bool> {
        Ok(self.seen.lock().await.contains(&event_id))
    }

    async fn mark_processed(&self, event_id: Uuid) -> anyhow::Result<bool> {
        Ok(self.seen.lock().await.insert(event_id))
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{Address, Customer, OrderItem};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn order(number: &str, status: OrderStatus) -> Order {
        Order {
            order_number: number.to_string(),
            user_id: "u1".to_string(),
            items: vec![OrderItem {
                code: "P1".to_string(),
                name: "Widget".to_string(),
                price: Decimal::from_str("10.00").unwrap(),
                quantity: 1,
            }],
            customer: Customer::default(),
            address: Address::default(),
            status,
            comments: None,
            created_at: Utc::now(),
        }
    }

    fn record(order_number: &str) -> OutboxRecord {
        OutboxRecord::from_event(&order(order_number, OrderStatus::New).created_event()).unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = MemoryStore::new();
        store.insert(&order("O-1", OrderStatus::New), None).await.unwrap();

        let found = store.get("O-1").await.unwrap().unwrap();
        assert_eq!(found.status, OrderStatus::New);
        assert!(store.get("O-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_by_status() {
        let store = MemoryStore::new();
        store.insert(&order("O-1", OrderStatus::New), None).await.unwrap();
        store
            .insert(&order("O-2", OrderStatus::PaymentRejected), None)
            .await
            .unwrap();
        store.insert(&order("O-3", OrderStatus::New), None).await.unwrap();

        let new_orders = store.find_by_status(OrderStatus::New).await.unwrap();
        assert_eq!(new_orders.len(), 2);
        let rejected = store
            .find_by_status(OrderStatus::PaymentRejected)
            .await
            .unwrap();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].order_number, "O-2");
    }

    #[tokio::test]
    async fn test_fetch_unpublished_skips_published_and_orders_by_creation() {
        let store = MemoryStore::new();
        let first = record("O-1");
        let second = record("O-2");
        let third = record("O-3");
        store.append(&first).await.unwrap();
        store.append(&second).await.unwrap();
        store.append(&third).await.unwrap();

        store.mark_published(second.event_id).await.unwrap();

        let pending = store.fetch_unpublished().await.unwrap();
        let numbers: Vec<&str> = pending.iter().map(|r| r.order_number.as_str()).collect();
        assert_eq!(numbers, vec!["O-1", "O-3"]);
    }

    #[tokio::test]
    async fn test_mark_processed_reports_duplicates() {
        let processed = MemoryProcessedEvents::new();
        let id = Uuid::new_v4();

        assert!(!processed.is_processed(id).await.unwrap());
        assert!(processed.mark_processed(id).await.unwrap());
        assert!(!processed.mark_processed(id).await.unwrap());
        assert!(processed.is_processed(id).await.unwrap());
    }
}
