use std::sync::Arc;

use crate::domain::order::{Order, OrderStatus};
use crate::service::OrderService;
use crate::store::OrderStore;

// ============================================================================
// Order Processing Job
// ============================================================================
//
// Batch reconciler behind the synchronous creation path. Each tick advances
// every order still in NEW - delivered when the destination country is
// serviceable, cancelled otherwise - and queues a fresh notification for
// every payment-rejected order. Both paths go through the same transition
// operation as everything else and inherit its no-op and terminal guards.
//
// ============================================================================

const ACTOR: &str = "order-processing-job";
const UNDELIVERABLE_COMMENT: &str = "Can't deliver to the location";

/// Countries the delivery partner services.
const DELIVERABLE_COUNTRIES: [&str; 5] = ["INDIA", "USA", "GERMANY", "UK", "COLOMBIA"];

pub fn can_deliver_to(country: &str) -> bool {
    DELIVERABLE_COUNTRIES
        .iter()
        .any(|serviceable| serviceable.eq_ignore_ascii_case(country))
}

pub struct OrderProcessingJob {
    service: Arc<OrderService>,
    orders: Arc<dyn OrderStore>,
}

impl OrderProcessingJob {
    pub fn new(service: Arc<OrderService>, orders: Arc<dyn OrderStore>) -> Self {
        Self { service, orders }
    }

    /// Scheduler entry point: advance every NEW order. Never returns an
    /// error; one order's failure marks that order as ERROR and the batch
    /// moves on.
    pub async fn process_new_orders(&self) {
        let new_orders = match self.orders.find_by_status(OrderStatus::New).await {
            Ok(orders) => orders,
            Err(error) => {
                tracing::error!(error = %error, "Failed to fetch NEW orders");
                return;
            }
        };

        if new_orders.is_empty() {
            tracing::debug!("No NEW orders to process");
            return;
        }

        tracing::info!(count = new_orders.len(), "Processing NEW orders");

        for order in &new_orders {
            if let Err(error) = self.process_one(order).await {
                tracing::error!(
                    order_number = %order.order_number,
                    error = %error,
                    "Order processing failed, marking order as ERROR"
                );

                let result = self
                    .service
                    .update_order_status(
                        &order.order_number,
                        OrderStatus::Error,
                        Some(error.to_string()),
                        ACTOR,
                    )
                    .await;
                if let Err(error) = result {
                    tracing::error!(
                        order_number = %order.order_number,
                        error = %error,
                        "Failed to mark order as ERROR"
                    );
                }
            }
        }
    }

    async fn process_one(&self, order: &Order) -> anyhow::Result<()> {
        if can_deliver_to(&order.address.country) {
            self.service
                .update_order_status(&order.order_number, OrderStatus::Delivered, None, ACTOR)
                .await?;
        } else {
            tracing::info!(
                order_number = %order.order_number,
                country = %order.address.country,
                "Destination not serviceable, cancelling order"
            );
            self.service
                .update_order_status(
                    &order.order_number,
                    OrderStatus::Cancelled,
                    Some(UNDELIVERABLE_COMMENT.to_string()),
                    ACTOR,
                )
                .await?;
        }
        Ok(())
    }

    /// Scheduler entry point: queue a fresh failure notification for every
    /// payment-rejected order. These orders stay in their terminal status
    /// until someone resolves them by hand; this path only notifies.
    pub async fn process_payment_rejected_orders(&self) {
        let rejected = match self
            .orders
            .find_by_status(OrderStatus::PaymentRejected)
            .await
        {
            Ok(orders) => orders,
            Err(error) => {
                tracing::error!(error = %error, "Failed to fetch PAYMENT_REJECTED orders");
                return;
            }
        };

        if rejected.is_empty() {
            return;
        }

        tracing::info!(count = rejected.len(), "Re-notifying payment-rejected orders");

        for order in &rejected {
            if let Err(error) = self.service.notify_payment_rejected(order).await {
                tracing::error!(
                    order_number = %order.order_number,
                    error = %error,
                    "Failed to queue payment-rejected notification"
                );
            }
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
