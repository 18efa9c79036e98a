use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::value_objects::{Address, Customer, OrderItem};

// ============================================================================
// Order Events - the outbox / wire vocabulary
// ============================================================================
//
// One tagged union over the four customer-visible outcomes. The same type is
// serialized into the outbox payload column and onto the wire, and parsed
// back by the inbound consumer, so publish and consume sides always match
// exhaustively.
//
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    #[serde(rename = "CREATED")]
    Created(EventPayload),
    #[serde(rename = "DELIVERED")]
    Delivered(EventPayload),
    #[serde(rename = "CANCELLED")]
    Cancelled(EventPayload),
    #[serde(rename = "ERROR")]
    Error(EventPayload),
}

impl OrderEvent {
    pub fn type_name(&self) -> &'static str {
        match self {
            OrderEvent::Created(_) => "CREATED",
            OrderEvent::Delivered(_) => "DELIVERED",
            OrderEvent::Cancelled(_) => "CANCELLED",
            OrderEvent::Error(_) => "ERROR",
        }
    }

    pub fn payload(&self) -> &EventPayload {
        match self {
            OrderEvent::Created(p)
            | OrderEvent::Delivered(p)
            | OrderEvent::Cancelled(p)
            | OrderEvent::Error(p) => p,
        }
    }

    pub fn payload_mut(&mut self) -> &mut EventPayload {
        match self {
            OrderEvent::Created(p)
            | OrderEvent::Delivered(p)
            | OrderEvent::Cancelled(p)
            | OrderEvent::Error(p) => p,
        }
    }

    /// Globally unique idempotency key for the event.
    pub fn event_id(&self) -> Uuid {
        self.payload().event_id
    }

    pub fn order_number(&self) -> &str {
        &self.payload().order_number
    }
}

/// Shared event body. `event_id` and `order_number` are mandatory; everything
/// else is optional on the wire and defaults rather than failing the parse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPayload {
    pub event_id: Uuid,
    pub order_number: String,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub customer: Customer,
    #[serde(default)]
    pub address: Address,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl EventPayload {
    /// Replace absent customer/address fields with placeholder values so a
    /// sparse producer never fails ingestion. Returns the names of the fields
    /// that were filled, for the caller to log.
    pub fn fill_missing(&mut self) -> Vec<&'static str> {
        const PLACEHOLDER: &str = "unknown";
        let mut filled = Vec::new();

        if self.customer.name.is_empty() {
            self.customer.name = PLACEHOLDER.to_string();
            filled.push("customer.name");
        }
        if self.customer.email.is_empty() {
            self.customer.email = PLACEHOLDER.to_string();
            filled.push("customer.email");
        }
        if self.customer.phone.is_empty() {
            self.customer.phone = PLACEHOLDER.to_string();
            filled.push("customer.phone");
        }
        if self.address.line1.is_empty() {
            self.address.line1 = PLACEHOLDER.to_string();
            filled.push("address.line1");
        }
        if self.address.city.is_empty() {
            self.address.city = PLACEHOLDER.to_string();
            filled.push("address.city");
        }
        if self.address.country.is_empty() {
            self.address.country = PLACEHOLDER.to_string();
            filled.push("address.country");
        }

        filled
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(order_number: &str) -> EventPayload {
        EventPayload {
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
            reason: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_event_is_tagged_by_type() {
        let event = OrderEvent::Cancelled(payload("O-42"));
        let json = serde_json::to_string(&event).unwrap();

        assert!(json.contains("\"type\":\"CANCELLED\""));

        let parsed: OrderEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.type_name(), "CANCELLED");
        assert_eq!(parsed.order_number(), "O-42");
    }

    #[test]
    fn test_parse_tolerates_missing_optional_fields() {
        let json = format!(
            r#"{{"type":"DELIVERED","data":{{"event_id":"{}","order_number":"O-7"}}}}"#,
            Uuid::new_v4()
        );

        let mut event: OrderEvent = serde_json::from_str(&json).unwrap();
        let filled = event.payload_mut().fill_missing();

        assert!(filled.contains(&"customer.name"));
        assert!(filled.contains(&"address.line1"));
        assert_eq!(event.payload().customer.email, "unknown");
        assert!(event.payload().items.is_empty());
    }

    #[test]
    fn test_parse_fails_without_event_id() {
        let json = r#"{"type":"DELIVERED","data":{"order_number":"O-7"}}"#;
        assert!(serde_json::from_str::<OrderEvent>(json).is_err());
    }

    #[test]
    fn test_fill_missing_is_noop_on_complete_payload() {
        let mut p = payload("O-1");
        assert!(p.fill_missing().is_empty());
    }
}
