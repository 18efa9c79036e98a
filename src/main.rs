use std::sync::Arc;

use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use order_outbox::config::Config;
use order_outbox::domain::catalog::StaticCatalog;
use order_outbox::domain::payment::ApproveAllGateway;
use order_outbox::jobs::{
    LocalTickLock, OrderProcessingJob, RedisTickLock, ScheduledTask, TaskRunner, TickLock,
};
use order_outbox::messaging::consumer::run_listener;
use order_outbox::messaging::{
    IdempotentConsumer, NotificationHandler, OutboxRelay, RedpandaClient, StatusUpdateHandler,
};
use order_outbox::metrics;
use order_outbox::notify::LogMailer;
use order_outbox::service::OrderService;
use order_outbox::store::{ScyllaProcessedEvents, ScyllaStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_outbox=debug")),
        )
        .init();

    tracing::info!("🚀 Starting order outbox service");

    let config = Config::from_env();

    // === 1. ScyllaDB session + schema ===
    tracing::info!(node = %config.scylla_node, "Connecting to ScyllaDB...");
    let session: Session = SessionBuilder::new()
        .known_node(config.scylla_node.as_str())
        .build()
        .await?;

    session
        .query_unpaged(
            format!(
                "CREATE KEYSPACE IF NOT EXISTS {} WITH REPLICATION = \
                 {{'class': 'SimpleStrategy', 'replication_factor': 1}}",
                config.keyspace
            ),
            &[],
        )
        .await?;
    session.use_keyspace(config.keyspace.as_str(), false).await?;

    let session = Arc::new(session);
    let store = Arc::new(ScyllaStore::new(session.clone()));
    store.init().await?;

    // === 2. Prometheus metrics ===
    let metrics = Arc::new(metrics::Metrics::new()?);
    let registry = metrics.registry().clone();
    let metrics_port = config.metrics_port;
    std::thread::spawn(move || match tokio::runtime::Runtime::new() {
        Ok(rt) => rt.block_on(async {
            if let Err(e) = metrics::start_metrics_server(registry, metrics_port).await {
                tracing::error!("Metrics server error: {}", e);
            }
        }),
        Err(e) => tracing::error!("Failed to start metrics runtime: {}", e),
    });

    // === 3. Transport (with circuit breaker) ===
    let publisher = Arc::new(RedpandaClient::new(&config.kafka_brokers)?);

    // === 4. Order service over its ports ===
    let catalog = Arc::new(
        StaticCatalog::new()
            .with_product("P1", "10.00".parse()?)
            .with_product("P2", "25.50".parse()?)
            .with_product("P3", "4.99".parse()?),
    );
    let service = Arc::new(OrderService::new(
        store.clone(),
        store.clone(),
        catalog,
        Arc::new(ApproveAllGateway),
        metrics.clone(),
    ));

    // === 5. Inbound consumers ===
    // Outcome events feed the state machine; every event type feeds the
    // notification mailer. Each consumer has its own group and dedup set.
    {
        let pipeline = IdempotentConsumer::new(
            Arc::new(StatusUpdateHandler::new(service.clone())),
            Arc::new(ScyllaProcessedEvents::new(session.clone(), "order-status")),
            metrics.clone(),
        );
        let brokers = config.kafka_brokers.clone();
        let group = config.status_consumer_group.clone();
        let topics: Vec<String> = config
            .topics
            .outcome_topics()
            .iter()
            .map(|t| t.to_string())
            .collect();
        tokio::spawn(async move {
            let refs: Vec<&str> = topics.iter().map(String::as_str).collect();
            if let Err(e) = run_listener(&brokers, &group, &refs, pipeline).await {
                tracing::error!(error = %e, "Status consumer terminated");
            }
        });
    }
    {
        let pipeline = IdempotentConsumer::new(
            Arc::new(NotificationHandler::new(Arc::new(LogMailer))),
            Arc::new(ScyllaProcessedEvents::new(
                session.clone(),
                "order-notifications",
            )),
            metrics.clone(),
        );
        let brokers = config.kafka_brokers.clone();
        let group = config.notification_consumer_group.clone();
        let topics: Vec<String> = config
            .topics
            .all_topics()
            .iter()
            .map(|t| t.to_string())
            .collect();
        tokio::spawn(async move {
            let refs: Vec<&str> = topics.iter().map(String::as_str).collect();
            if let Err(e) = run_listener(&brokers, &group, &refs, pipeline).await {
                tracing::error!(error = %e, "Notification consumer terminated");
            }
        });
    }

    // === 6. Scheduler: outbox relay + order processing job ===
    let lock: Arc<dyn TickLock> = match &config.redis_url {
        Some(url) => {
            tracing::info!("Using Redis tick lock for multi-instance scheduling");
            Arc::new(RedisTickLock::new(url)?)
        }
        None => {
            tracing::info!("No REDIS_URL set, using in-process tick lock");
            Arc::new(LocalTickLock::new())
        }
    };

    let relay = Arc::new(OutboxRelay::new(
        store.clone(),
        publisher.clone(),
        config.topics.clone(),
        metrics.clone(),
    ));
    let job = Arc::new(OrderProcessingJob::new(service.clone(), store.clone()));

    let _handles = TaskRunner::new(lock, metrics.clone())
        .register(ScheduledTask::new(
            "outbox-relay",
            "lock:outbox-relay",
            config.relay_interval,
            config.tick_lock_ttl,
            {
                let relay = relay.clone();
                move || {
                    let relay = relay.clone();
                    Box::pin(async move { relay.relay_pending_events().await })
                }
            },
        ))
        .register(ScheduledTask::new(
            "order-processing",
            "lock:order-processing",
            config.processing_interval,
            config.tick_lock_ttl,
            {
                let job = job.clone();
                move || {
                    let job = job.clone();
                    Box::pin(async move {
                        job.process_new_orders().await;
                        job.process_payment_rejected_orders().await;
                    })
                }
            },
        ))
        .spawn_all();

    tracing::info!("✅ All components running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("🛑 Shutting down");

    Ok(())
}
