use std::sync::Arc;

use uuid::Uuid;

use crate::domain::catalog::Catalog;
use crate::domain::order::{
    Address, Customer, Order, OrderError, OrderItem, OrderStatus, StatusChange, Transition,
};
use crate::domain::payment::{PaymentDetails, PaymentGateway, PaymentOutcome};
use crate::metrics::Metrics;
use crate::store::{OrderStore, OutboxRecord, OutboxStore};

// ============================================================================
// Order Service - orchestration over the pure state machine
// ============================================================================
//
// The thin layer between the aggregate and the ports: validates requests
// against the catalog, runs the optional payment authorization, and hands
// every row of a state change to the store in one call so the adapter can
// commit it atomically. No business rule lives here that the aggregate could
// own instead.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    pub items: Vec<OrderItem>,
    pub customer: Customer,
    pub address: Address,
    pub comments: Option<String>,
    pub payment: Option<PaymentDetails>,
}

/// Outcome of a create call. A rejected payment is an expected business
/// outcome, so it arrives here as status PAYMENT_REJECTED rather than as an
/// error.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedOrder {
    pub order_number: String,
    pub status: OrderStatus,
}

pub struct OrderService {
    orders: Arc<dyn OrderStore>,
    outbox: Arc<dyn OutboxStore>,
    catalog: Arc<dyn Catalog>,
    payments: Arc<dyn PaymentGateway>,
    metrics: Arc<Metrics>,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        outbox: Arc<dyn OutboxStore>,
        catalog: Arc<dyn Catalog>,
        payments: Arc<dyn PaymentGateway>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            orders,
            outbox,
            catalog,
            payments,
            metrics,
        }
    }

    /// Create an order for a user. Validates every line item against the
    /// catalog, authorizes the payment when one is supplied, and persists the
    /// order together with its CREATED event in one transaction. A rejected
    /// payment persists the order in PAYMENT_REJECTED with no event.
    pub async fn create_order(
        &self,
        user_id: &str,
        request: CreateOrderRequest,
    ) -> Result<PlacedOrder, OrderError> {
        if request.items.is_empty() {
            return Err(OrderError::EmptyItems);
        }

        for item in &request.items {
            match self.catalog.price_of(&item.code).await? {
                None => return Err(OrderError::UnknownProduct(item.code.clone())),
                Some(expected) if expected != item.price => {
                    return Err(OrderError::PriceMismatch {
                        code: item.code.clone(),
                        expected,
                        actual: item.price,
                    })
                }
                Some(_) => {}
            }
        }

        let order_number = Uuid::new_v4().to_string();
        let order = Order::place(
            order_number,
            user_id.to_string(),
            request.customer,
            request.address,
            request.items,
            request.comments,
        )?;

        if let Some(payment) = &request.payment {
            let outcome = self
                .payments
                .authorize(&order.order_number, order.total(), payment)
                .await?;

            if let PaymentOutcome::Rejected { reason } = outcome {
                let rejected = order.with_payment_rejected(&reason);
                // Rejected payments are not broadcast; the processing job
                // re-notifies them every tick instead.
                self.orders.insert(&rejected, None).await?;

                tracing::warn!(
                    order_number = %rejected.order_number,
                    user_id = %user_id,
                    reason = %reason,
                    "Payment rejected, order parked without event"
                );
                return Ok(PlacedOrder {
                    order_number: rejected.order_number,
                    status: OrderStatus::PaymentRejected,
                });
            }
        }

        let record = OutboxRecord::from_event(&order.created_event())?;
        self.orders.insert(&order, Some(&record)).await?;
        self.metrics.orders_created.inc();

        tracing::info!(
            order_number = %order.order_number,
            user_id = %user_id,
            item_count = order.items.len(),
            event_id = %record.event_id,
            "✅ Order created with outbox event"
        );

        Ok(PlacedOrder {
            order_number: order.order_number,
            status: OrderStatus::New,
        })
    }

    /// Apply a status transition. A request for the current status is a
    /// silent no-op; everything else goes through the state machine and is
    /// persisted atomically with its history row and optional outbox event.
    pub async fn update_order_status(
        &self,
        order_number: &str,
        new_status: OrderStatus,
        comment: Option<String>,
        actor: &str,
    ) -> Result<(), OrderError> {
        let order = self
            .orders
            .get(order_number)
            .await?
            .ok_or_else(|| OrderError::NotFound(order_number.to_string()))?;

        match order.transition(new_status, comment, actor)? {
            Transition::NoChange => {
                tracing::debug!(
                    order_number = %order_number,
                    status = %new_status,
                    "Status unchanged, nothing to do"
                );
                Ok(())
            }
            Transition::Applied {
                order,
                change,
                event,
            } => {
                let record = match &event {
                    Some(event) => Some(OutboxRecord::from_event(event)?),
                    None => None,
                };
                self.orders.update(&order, &change, record.as_ref()).await?;
                self.metrics.record_transition(change.new_status.as_str());

                tracing::info!(
                    order_number = %order.order_number,
                    from = %change.previous_status,
                    to = %change.new_status,
                    actor = %change.changed_by,
                    with_event = record.is_some(),
                    "Order status updated"
                );
                Ok(())
            }
        }
    }

    pub async fn find_order_status_history(
        &self,
        order_number: &str,
    ) -> Result<Vec<StatusChange>, OrderError> {
        if self.orders.get(order_number).await?.is_none() {
            return Err(OrderError::NotFound(order_number.to_string()));
        }
        Ok(self.orders.history(order_number).await?)
    }

    /// Append a fresh ERROR notification event for a payment-rejected order.
    /// Called by the processing job on every tick; each call gets a new event
    /// id so the notification goes out again.
    pub async fn notify_payment_rejected(&self, order: &Order) -> Result<(), OrderError> {
        let event = order.error_event("Payment rejected");
        let record = OutboxRecord::from_event(&event)?;
        self.outbox.append(&record).await?;

        tracing::info!(
            order_number = %order.order_number,
            event_id = %record.event_id,
            "Queued payment-rejected notification"
        );
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::StaticCatalog;
    use crate::domain::payment::ApproveAllGateway;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    struct RejectAllGateway;

    #[async_trait]
    impl PaymentGateway for RejectAllGateway {
        async fn authorize(
            &self,
            _order_number: &str,
            _amount: Decimal,
            _payment: &PaymentDetails,
        ) -> anyhow::Result<PaymentOutcome> {
            Ok(PaymentOutcome::Rejected {
                reason: "Insufficient funds".to_string(),
            })
        }
    }

    fn catalog() -> StaticCatalog {
        StaticCatalog::new().with_product("P1", Decimal::from_str("10.00").unwrap())
    }

    fn request(price: &str, payment: Option<PaymentDetails>) -> CreateOrderRequest {
        CreateOrderRequest {
            items: vec![OrderItem {
                code: "P1".to_string(),
                name: "Widget".to_string(),
                price: Decimal::from_str(price).unwrap(),
                quantity: 2,
            }],
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
            comments: None,
            payment,
        }
    }

    fn service_over(
        store: Arc<MemoryStore>,
        payments: Arc<dyn PaymentGateway>,
    ) -> OrderService {
        OrderService::new(
            store.clone(),
            store,
            Arc::new(catalog()),
            payments,
            Arc::new(Metrics::new().unwrap()),
        )
    }

    fn service(store: Arc<MemoryStore>) -> OrderService {
        service_over(store, Arc::new(ApproveAllGateway))
    }

    #[tokio::test]
    async fn test_create_persists_order_and_created_event_together() {
        let store = Arc::new(MemoryStore::new());
        let placed = service(store.clone())
            .create_order("u1", request("10.00", None))
            .await
            .unwrap();

        assert_eq!(placed.status, OrderStatus::New);

        let order = store.get(&placed.order_number).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::New);

        let pending = store.fetch_unpublished().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event_type, "CREATED");
        assert_eq!(pending[0].order_number, placed.order_number);
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_product() {
        let store = Arc::new(MemoryStore::new());
        let mut bad = request("10.00", None);
        bad.items[0].code = "NOPE".to_string();

        let result = service(store.clone()).create_order("u1", bad).await;
        assert!(matches!(result, Err(OrderError::UnknownProduct(code)) if code == "NOPE"));

        // Nothing persisted on validation failure.
        assert_eq!(store.outbox_len().await, 0);
        assert!(store.find_by_status(OrderStatus::New).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_price_mismatch() {
        let store = Arc::new(MemoryStore::new());
        let result = service(store.clone())
            .create_order("u1", request("9.99", None))
            .await;

        assert!(matches!(
            result,
            Err(OrderError::PriceMismatch { ref code, .. }) if code == "P1"
        ));
        assert_eq!(store.outbox_len().await, 0);
    }

    #[tokio::test]
    async fn test_create_rejects_empty_items() {
        let store = Arc::new(MemoryStore::new());
        let mut empty = request("10.00", None);
        empty.items.clear();

        let result = service(store).create_order("u1", empty).await;
        assert!(matches!(result, Err(OrderError::EmptyItems)));
    }

    #[tokio::test]
    async fn test_rejected_payment_parks_order_without_event() {
        let store = Arc::new(MemoryStore::new());
        let payment = PaymentDetails {
            card_number: "4111111111111111".to_string(),
            cvv: "123".to_string(),
        };

        let placed = service_over(store.clone(), Arc::new(RejectAllGateway))
            .create_order("u1", request("10.00", Some(payment)))
            .await
            .unwrap();

        assert_eq!(placed.status, OrderStatus::PaymentRejected);

        let order = store.get(&placed.order_number).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::PaymentRejected);
        assert_eq!(order.comments.as_deref(), Some("Insufficient funds"));
        assert_eq!(store.outbox_len().await, 0);
    }

    #[tokio::test]
    async fn test_update_writes_history_and_event_atomically() {
        let store = Arc::new(MemoryStore::new());
        let service = service(store.clone());
        let placed = service.create_order("u1", request("10.00", None)).await.unwrap();

        service
            .update_order_status(&placed.order_number, OrderStatus::Delivered, None, "tester")
            .await
            .unwrap();

        let order = store.get(&placed.order_number).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Delivered);

        let history = service
            .find_order_status_history(&placed.order_number)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].new_status, OrderStatus::Delivered);

        // CREATED plus DELIVERED.
        assert_eq!(store.outbox_len().await, 2);
    }

    #[tokio::test]
    async fn test_repeat_transition_is_a_noop() {
        let store = Arc::new(MemoryStore::new());
        let service = service(store.clone());
        let placed = service.create_order("u1", request("10.00", None)).await.unwrap();

        service
            .update_order_status(&placed.order_number, OrderStatus::Delivered, None, "tester")
            .await
            .unwrap();
        service
            .update_order_status(&placed.order_number, OrderStatus::Delivered, None, "tester")
            .await
            .unwrap();

        let history = service
            .find_order_status_history(&placed.order_number)
            .await
            .unwrap();
        assert_eq!(history.len(), 1, "no-op must not append history");
        assert_eq!(store.outbox_len().await, 2, "no-op must not append events");
    }

    #[tokio::test]
    async fn test_in_process_transition_is_silent() {
        let store = Arc::new(MemoryStore::new());
        let service = service(store.clone());
        let placed = service.create_order("u1", request("10.00", None)).await.unwrap();

        service
            .update_order_status(&placed.order_number, OrderStatus::InProcess, None, "tester")
            .await
            .unwrap();

        let history = service
            .find_order_status_history(&placed.order_number)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        // Only the CREATED event exists.
        assert_eq!(store.outbox_len().await, 1);
    }

    #[tokio::test]
    async fn test_update_unknown_order_fails() {
        let store = Arc::new(MemoryStore::new());
        let result = service(store)
            .update_order_status("missing", OrderStatus::Delivered, None, "tester")
            .await;
        assert!(matches!(result, Err(OrderError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_history_for_unknown_order_fails() {
        let store = Arc::new(MemoryStore::new());
        let result = service(store).find_order_status_history("missing").await;
        assert!(matches!(result, Err(OrderError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_notify_payment_rejected_appends_fresh_event_each_call() {
        let store = Arc::new(MemoryStore::new());
        let service = service(store.clone());
        let order = Order::place(
            "O-1".to_string(),
            "u1".to_string(),
            Customer::default(),
            Address::default(),
            request("10.00", None).items,
            None,
        )
        .unwrap()
        .with_payment_rejected("Payment rejected");

        service.notify_payment_rejected(&order).await.unwrap();
        service.notify_payment_rejected(&order).await.unwrap();

        let pending = store.fetch_unpublished().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|r| r.event_type == "ERROR"));
        assert_ne!(pending[0].event_id, pending[1].event_id);
    }
}
