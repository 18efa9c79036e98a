use std::time::Duration;

use crate::domain::order::OrderEvent;

// ============================================================================
// Configuration
// ============================================================================
//
// Every knob can be overridden through an environment variable:
//
// | Variable                      | Default                  |
// |-------------------------------|--------------------------|
// | SCYLLA_NODE                   | 127.0.0.1:9042           |
// | SCYLLA_KEYSPACE               | orders_ks                |
// | KAFKA_BROKERS                 | 127.0.0.1:9092           |
// | REDIS_URL                     | (unset: in-process lock) |
// | RELAY_INTERVAL_SECS           | 10                       |
// | PROCESSING_INTERVAL_SECS      | 30                       |
// | TICK_LOCK_TTL_SECS            | 60                       |
// | STATUS_CONSUMER_GROUP         | order-status-consumer    |
// | NOTIFICATION_CONSUMER_GROUP   | order-notifications      |
// | METRICS_PORT                  | 9090                     |
//
// ============================================================================

/// Topic per event type. Keys are order numbers, so one partition sees a
/// given order's events in publish order.
#[derive(Debug, Clone)]
pub struct Topics {
    pub created: String,
    pub delivered: String,
    pub cancelled: String,
    pub error: String,
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            created: "order-created-events".to_string(),
            delivered: "order-delivered-events".to_string(),
            cancelled: "order-cancelled-events".to_string(),
            error: "order-error-events".to_string(),
        }
    }
}

impl Topics {
    pub fn for_event(&self, event: &OrderEvent) -> &str {
        match event {
            OrderEvent::Created(_) => &self.created,
            OrderEvent::Delivered(_) => &self.delivered,
            OrderEvent::Cancelled(_) => &self.cancelled,
            OrderEvent::Error(_) => &self.error,
        }
    }

    /// Topics carrying externally-sourced outcome events.
    pub fn outcome_topics(&self) -> Vec<&str> {
        vec![&self.delivered, &self.cancelled, &self.error]
    }

    pub fn all_topics(&self) -> Vec<&str> {
        vec![&self.created, &self.delivered, &self.cancelled, &self.error]
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub scylla_node: String,
    pub keyspace: String,
    pub kafka_brokers: String,
    pub redis_url: Option<String>,
    pub relay_interval: Duration,
    pub processing_interval: Duration,
    pub tick_lock_ttl: Duration,
    pub status_consumer_group: String,
    pub notification_consumer_group: String,
    pub topics: Topics,
    pub metrics_port: u16,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            scylla_node: env_or("SCYLLA_NODE", "127.0.0.1:9042"),
            keyspace: env_or("SCYLLA_KEYSPACE", "orders_ks"),
            kafka_brokers: env_or("KAFKA_BROKERS", "127.0.0.1:9092"),
            redis_url: std::env::var("REDIS_URL").ok(),
            relay_interval: Duration::from_secs(env_parse_or("RELAY_INTERVAL_SECS", 10)),
            processing_interval: Duration::from_secs(env_parse_or("PROCESSING_INTERVAL_SECS", 30)),
            tick_lock_ttl: Duration::from_secs(env_parse_or("TICK_LOCK_TTL_SECS", 60)),
            status_consumer_group: env_or("STATUS_CONSUMER_GROUP", "order-status-consumer"),
            notification_consumer_group: env_or(
                "NOTIFICATION_CONSUMER_GROUP",
                "order-notifications",
            ),
            topics: Topics::default(),
            metrics_port: env_parse_or("METRICS_PORT", 9090),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
