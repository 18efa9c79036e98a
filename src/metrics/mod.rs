// Private module declaration
mod server;

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Covers the whole pipeline:
// - Order creation and status transitions
// - Outbox relay throughput and failures
// - Inbound consumer outcomes (processed, duplicates, parse failures)
// - Scheduled job runs
//
// Scraped via /metrics on the metrics HTTP server.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Order lifecycle
    pub orders_created: IntCounter,
    pub status_transitions: IntCounterVec,

    // Outbox relay
    pub outbox_events_relayed: IntCounterVec,
    pub outbox_relay_failures: IntCounterVec,
    pub relay_batch_duration: Histogram,

    // Inbound consumers
    pub consumer_events_processed: IntCounterVec,
    pub consumer_duplicates_skipped: IntCounterVec,
    pub consumer_parse_failures: IntCounterVec,

    // Scheduler
    pub job_runs: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_created = IntCounter::new("orders_created_total", "Total orders created")?;
        registry.register(Box::new(orders_created.clone()))?;

        let status_transitions = IntCounterVec::new(
            Opts::new("order_status_transitions_total", "Executed status transitions"),
            &["to"],
        )?;
        registry.register(Box::new(status_transitions.clone()))?;

        let outbox_events_relayed = IntCounterVec::new(
            Opts::new("outbox_events_relayed_total", "Outbox events published"),
            &["event_type"],
        )?;
        registry.register(Box::new(outbox_events_relayed.clone()))?;

        let outbox_relay_failures = IntCounterVec::new(
            Opts::new(
                "outbox_relay_failures_total",
                "Outbox events that failed to publish and stayed pending",
            ),
            &["event_type"],
        )?;
        registry.register(Box::new(outbox_relay_failures.clone()))?;

        let relay_batch_duration = Histogram::with_opts(
            HistogramOpts::new("outbox_relay_batch_seconds", "Outbox relay batch duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(relay_batch_duration.clone()))?;

        let consumer_events_processed = IntCounterVec::new(
            Opts::new("consumer_events_processed_total", "Inbound events handled"),
            &["consumer"],
        )?;
        registry.register(Box::new(consumer_events_processed.clone()))?;

        let consumer_duplicates_skipped = IntCounterVec::new(
            Opts::new(
                "consumer_duplicates_skipped_total",
                "Inbound events discarded as already processed",
            ),
            &["consumer"],
        )?;
        registry.register(Box::new(consumer_duplicates_skipped.clone()))?;

        let consumer_parse_failures = IntCounterVec::new(
            Opts::new(
                "consumer_parse_failures_total",
                "Inbound messages dropped as malformed",
            ),
            &["consumer"],
        )?;
        registry.register(Box::new(consumer_parse_failures.clone()))?;

        let job_runs = IntCounterVec::new(
            Opts::new("scheduled_job_runs_total", "Scheduled task executions"),
            &["task"],
        )?;
        registry.register(Box::new(job_runs.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            status_transitions,
            outbox_events_relayed,
            outbox_relay_failures,
            relay_batch_duration,
            consumer_events_processed,
            consumer_duplicates_skipped,
            consumer_parse_failures,
            job_runs,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_transition(&self, to: &str) {
        self.status_transitions.with_label_values(&[to]).inc();
    }

    pub fn record_relayed(&self, event_type: &str) {
        self.outbox_events_relayed
            .with_label_values(&[event_type])
            .inc();
    }

    pub fn record_relay_failure(&self, event_type: &str) {
        self.outbox_relay_failures
            .with_label_values(&[event_type])
            .inc();
    }

    pub fn record_consumed(&self, consumer: &str) {
        self.consumer_events_processed
            .with_label_values(&[consumer])
            .inc();
    }

    pub fn record_duplicate(&self, consumer: &str) {
        self.consumer_duplicates_skipped
            .with_label_values(&[consumer])
            .inc();
    }

    pub fn record_parse_failure(&self, consumer: &str) {
        self.consumer_parse_failures
            .with_label_values(&[consumer])
            .inc();
    }

    pub fn record_job_run(&self, task: &str) {
        self.job_runs.with_label_values(&[task]).inc();
    }
}
