use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use prometheus::{Encoder, Registry, TextEncoder};

/// Serve /metrics and /health. Runs on its own runtime; the caller spawns a
/// dedicated thread for it.
pub async fn start_metrics_server(registry: Registry, port: u16) -> std::io::Result<()> {
    tracing::info!("📊 Metrics server listening on http://0.0.0.0:{}/metrics", port);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(registry.clone()))
            .route("/metrics", web::get().to(scrape))
            .route("/health", web::get().to(health))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}

async fn scrape(registry: web::Data<Registry>) -> impl Responder {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();

    match encoder.encode(&registry.gather(), &mut buffer) {
        Ok(()) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(buffer),
        Err(error) => {
            tracing::error!(error = %error, "Failed to encode metrics");
            HttpResponse::InternalServerError().finish()
        }
    }
}

async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "order-outbox"
    }))
}
