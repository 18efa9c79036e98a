use chrono::Utc;
use uuid::Uuid;

use super::errors::OrderError;
use super::events::{EventPayload, OrderEvent};
use super::value_objects::{Address, Customer, Order, OrderItem, OrderStatus, StatusChange};

// ============================================================================
// Order State Machine - pure domain logic, no I/O
// ============================================================================
//
// Creation and every later status change go through this module. A transition
// never touches storage itself; it returns the updated aggregate plus the
// audit row and (when the new status is customer-visible) the outbox event,
// and the orchestration layer persists all of it in one transaction.
//
// ============================================================================

/// Result of applying a status change to the aggregate.
#[derive(Debug)]
pub enum Transition {
    /// Requested status equals the current one. Nothing to persist.
    NoChange,
    /// The change is legal: persist all three pieces atomically.
    Applied {
        order: Order,
        change: StatusChange,
        event: Option<OrderEvent>,
    },
}

impl Order {
    /// Build a new order in status NEW. Item validation against the catalog
    /// happens in the service layer; the aggregate only enforces shape.
    pub fn place(
        order_number: String,
        user_id: String,
        customer: Customer,
        address: Address,
        items: Vec<OrderItem>,
        comments: Option<String>,
    ) -> Result<Self, OrderError> {
        if items.is_empty() {
            return Err(OrderError::EmptyItems);
        }

        Ok(Self {
            order_number,
            user_id,
            items,
            customer,
            address,
            status: OrderStatus::New,
            comments,
            created_at: Utc::now(),
        })
    }

    /// Creation-time only: a failed payment authorization parks the order in
    /// PAYMENT_REJECTED before it was ever NEW. No event accompanies this.
    pub fn with_payment_rejected(mut self, reason: &str) -> Self {
        self.status = OrderStatus::PaymentRejected;
        self.comments = Some(reason.to_string());
        self
    }

    /// Apply a status change. Same-status requests are a no-op, terminal
    /// statuses reject everything, and only DELIVERED / CANCELLED / ERROR
    /// produce an outbox event. IN_PROCESS is an internal marker and stays
    /// silent.
    pub fn transition(
        &self,
        new_status: OrderStatus,
        comment: Option<String>,
        actor: &str,
    ) -> Result<Transition, OrderError> {
        if self.status == new_status {
            return Ok(Transition::NoChange);
        }
        if self.status.is_terminal() {
            return Err(OrderError::IllegalTransition {
                from: self.status,
                to: new_status,
            });
        }

        let mut order = self.clone();
        order.status = new_status;
        if comment.is_some() {
            order.comments = comment.clone();
        }

        let change = StatusChange {
            order_number: self.order_number.clone(),
            previous_status: self.status,
            new_status,
            comment: comment.clone(),
            changed_at: Utc::now(),
            changed_by: actor.to_string(),
        };

        let event = match new_status {
            OrderStatus::Delivered => Some(OrderEvent::Delivered(self.event_payload(None))),
            OrderStatus::Cancelled => Some(OrderEvent::Cancelled(self.event_payload(comment))),
            OrderStatus::Error => Some(OrderEvent::Error(self.event_payload(comment))),
            OrderStatus::New | OrderStatus::InProcess | OrderStatus::PaymentRejected => None,
        };

        Ok(Transition::Applied {
            order,
            change,
            event,
        })
    }

    /// The CREATED event that accompanies a successful creation.
    pub fn created_event(&self) -> OrderEvent {
        OrderEvent::Created(self.event_payload(None))
    }

    /// A fresh ERROR notification event for this order. Used by the
    /// processing job to re-notify payment-rejected orders each tick; every
    /// call gets a new event id on purpose.
    pub fn error_event(&self, reason: &str) -> OrderEvent {
        OrderEvent::Error(self.event_payload(Some(reason.to_string())))
    }

    fn event_payload(&self, reason: Option<String>) -> EventPayload {
        EventPayload {
            event_id: Uuid::new_v4(),
            order_number: self.order_number.clone(),
            items: self.items.clone(),
            customer: self.customer.clone(),
            address: self.address.clone(),
            reason,
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
