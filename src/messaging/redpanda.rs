use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};

use crate::utils::{Breaker, BreakerConfig, BreakerState};

use super::{EventPublisher, PublishError};

// ============================================================================
// Redpanda / Kafka Publisher
// ============================================================================

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RedpandaClient {
    producer: FutureProducer,
    breaker: Breaker,
}

impl RedpandaClient {
    pub fn new(brokers: &str) -> anyhow::Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()
            .context("Failed to create Redpanda producer")?;

        let breaker = Breaker::new(BreakerConfig {
            max_failures: 5,
            reset_after: Duration::from_secs(30),
            probes_to_close: 3,
        });

        Ok(Self { producer, breaker })
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }
}

#[async_trait]
impl EventPublisher for RedpandaClient {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), PublishError> {
        if !self.breaker.allow() {
            tracing::error!(topic = %topic, "Circuit breaker open - transport unavailable");
            return Err(PublishError::CircuitOpen);
        }

        let record = FutureRecord::to(topic).key(key).payload(payload);

        let result = self
            .producer
            .send(record, rdkafka::util::Timeout::After(SEND_TIMEOUT))
            .await;

        match result {
            Ok(_) => {
                self.breaker.record_success();
                tracing::info!(topic = %topic, key = %key, "Published to Redpanda");
                Ok(())
            }
            Err((error, _message)) => {
                self.breaker.record_failure();
                tracing::error!(
                    error = %error,
                    topic = %topic,
                    key = %key,
                    "Failed to publish to Redpanda"
                );
                // A timed-out send stays pending and is retried next tick,
                // same as any other transport failure.
                let text = error.to_string();
                if text.contains("Message timed out") {
                    Err(PublishError::Timeout(SEND_TIMEOUT))
                } else {
                    Err(PublishError::Transport(text))
                }
            }
        }
    }
}
