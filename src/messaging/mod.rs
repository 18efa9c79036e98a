use std::time::Duration;

use async_trait::async_trait;

pub mod consumer;
pub mod redpanda;
pub mod relay;

pub use consumer::{ConsumeOutcome, IdempotentConsumer, NotificationHandler, StatusUpdateHandler};
pub use redpanda::RedpandaClient;
pub use relay::OutboxRelay;

// ============================================================================
// Event Publisher Port
// ============================================================================

/// Transient publish failures. None of these surface to a synchronous caller;
/// the relay leaves the event pending and tries again on the next tick.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Publish timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Circuit breaker open, transport unavailable")]
    CircuitOpen,
}

/// Abstracts the transport used to deliver events to remote consumers.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), PublishError>;
}
