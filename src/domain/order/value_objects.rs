use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ============================================================================
// Order Value Objects
// ============================================================================

/// One ordered line item. The snapshot taken at checkout is immutable; price
/// is the unit price validated against the catalog at creation time.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderItem {
    pub code: String,
    #[serde(default)]
    pub name: String,
    pub price: Decimal,
    pub quantity: i32,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Customer {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Address {
    #[serde(default)]
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip: String,
    #[serde(default)]
    pub country: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    InProcess,
    PaymentRejected,
    Delivered,
    Cancelled,
    Error,
}

impl OrderStatus {
    /// Terminal statuses admit no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered
                | OrderStatus::Cancelled
                | OrderStatus::PaymentRejected
                | OrderStatus::Error
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::InProcess => "IN_PROCESS",
            OrderStatus::PaymentRejected => "PAYMENT_REJECTED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NEW" => Some(OrderStatus::New),
            "IN_PROCESS" => Some(OrderStatus::InProcess),
            "PAYMENT_REJECTED" => Some(OrderStatus::PaymentRejected),
            "DELIVERED" => Some(OrderStatus::Delivered),
            "CANCELLED" => Some(OrderStatus::Cancelled),
            "ERROR" => Some(OrderStatus::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only audit entry; one row per executed transition.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct StatusChange {
    pub order_number: String,
    pub previous_status: OrderStatus,
    pub new_status: OrderStatus,
    pub comment: Option<String>,
    pub changed_at: DateTime<Utc>,
    pub changed_by: String,
}

/// The persisted order aggregate. Mutated exclusively through the state
/// machine in `aggregate.rs`; never physically deleted.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Order {
    pub order_number: String,
    pub user_id: String,
    pub items: Vec<OrderItem>,
    pub customer: Customer,
    pub address: Address,
    pub status: OrderStatus,
    pub comments: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn total(&self) -> Decimal {
        self.items
            .iter()
            .map(|item| item.price * Decimal::from(item.quantity))
            .sum()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
