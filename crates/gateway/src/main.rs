//! ReviewLens API Gateway
//!
//! The HTTP presentation surface for the context engine.
//! Handles:
//! - Request validation and routing
//! - Request ids, CORS and concurrency limits
//! - Observability (logging, metrics, tracing)

mod handlers;
mod middleware;

use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use reviewlens_common::{config::AppConfig, metrics};
use reviewlens_context::{build_orchestrator, Orchestrator};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub orchestrator: Arc<Orchestrator>,
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.observability.json_logging {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Arc::new(AppConfig::load()?);

    init_tracing(&config);
    info!(
        service = %config.observability.service_name,
        "Starting ReviewLens API Gateway v{}",
        reviewlens_common::VERSION
    );

    // Initialize metrics
    if config.observability.metrics_port != 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new().with_http_listener(addr).install()?;
        info!("Prometheus exporter on {}", addr);
    }
    metrics::register_metrics();

    // Build the pipeline
    let orchestrator = build_orchestrator(&config).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to build the context engine");
        e
    })?;

    // Create app state
    let state = AppState {
        config: config.clone(),
        orchestrator: Arc::new(orchestrator),
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let listener =
        tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let max_concurrent = state.config.server.max_concurrent_requests.max(1);

    // API routes
    let api_routes = Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))

        // Question answering
        .route("/ask", post(handlers::ask::ask));

    // Compose the app
    Router::new()
        .nest("/v2", api_routes)
        .layer(axum::middleware::from_fn(middleware::track_metrics))
        .layer(ConcurrencyLimitLayer::new(max_concurrent))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use async_trait::async_trait;
    use reviewlens_common::embeddings::{Embedder, HashingEmbedder};
    use reviewlens_common::errors::Result as AppResult;
    use reviewlens_context::build_with_backends;
    use reviewlens_context::compiler::{CompiledQuery, Dimension};
    use reviewlens_context::retrieval::MemoryIndex;
    use reviewlens_context::store::{CorpusSnapshot, CorpusStore, MemoryCorpus, Record};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    fn snapshot() -> Value {
        json!({
            "reviews": [
                {"id": "r1", "seq": 1, "content": "Brand A serum keeps my skin hydrated", "brand": "Brand A",
                 "product": "Hydra Serum", "rating": 5, "review_date": "2024-05-01", "channel": "online"},
                {"id": "r2", "seq": 2, "content": "Brand A serum left my skin dry", "brand": "Brand A",
                 "product": "Hydra Serum", "rating": 2, "review_date": "2024-05-20", "channel": "offline"},
                {"id": "r3", "seq": 3, "content": "Brand B cream smells lovely", "brand": "Brand B",
                 "product": "Velvet Cream", "rating": 4, "review_date": "2024-06-01", "channel": "online"}
            ]
        })
    }

    async fn test_app() -> Router {
        let snapshot = snapshot();
        let path = std::env::temp_dir().join(format!("reviewlens-gateway-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, snapshot.to_string()).unwrap();

        let mut config = AppConfig::default();
        config.analysis.corpus_snapshot_path = Some(path.to_string_lossy().into_owned());
        let orchestrator = build_orchestrator(&config).await.unwrap();

        create_router(AppState {
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
        })
    }

    /// Snapshot store whose queries outlast the request budget
    struct SlowCorpus {
        inner: MemoryCorpus,
        delay: Duration,
    }

    #[async_trait]
    impl CorpusStore for SlowCorpus {
        async fn fetch(&self, query: &CompiledQuery) -> AppResult<Vec<Record>> {
            tokio::time::sleep(self.delay).await;
            self.inner.fetch(query).await
        }

        async fn distinct_values(&self, dimension: Dimension) -> AppResult<Vec<String>> {
            self.inner.distinct_values(dimension).await
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    async fn slow_app() -> Router {
        let snapshot: CorpusSnapshot = serde_json::from_value(snapshot()).unwrap();
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(64));
        let index = MemoryIndex::build(&snapshot.reviews, embedder.as_ref()).await.unwrap();
        let store = SlowCorpus {
            inner: MemoryCorpus::new(snapshot),
            delay: Duration::from_millis(1500),
        };

        let mut config = AppConfig::default();
        config.server.request_timeout_secs = 1;
        let orchestrator = build_with_backends(&config, embedder, Arc::new(store), Arc::new(index))
            .await
            .unwrap();

        create_router(AppState {
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
        })
    }

    async fn post_ask(app: Router, body: Value) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::post("/v2/ask")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let response = test_app()
            .await
            .oneshot(Request::get("/v2/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_ready_reports_backend() {
        let response = test_app()
            .await
            .oneshot(Request::get("/v2/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ready");
        assert_eq!(body["checks"]["corpus"]["backend"], "memory");
    }

    #[tokio::test]
    async fn test_ask_returns_report() {
        let (status, body) = post_ask(
            test_app().await,
            json!({"question": "Brand A rating", "now": "2024-06-15"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["report"]["sample_size"], 2);
        assert_eq!(body["report"]["insufficient_evidence"], true);
        assert!(body.get("trace").is_none());
    }

    #[tokio::test]
    async fn test_ask_with_trace() {
        let (status, body) = post_ask(
            test_app().await,
            json!({"question": "Brand A rating", "now": "2024-06-15", "trace": true, "path": "analytic"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["trace"]["trail"][0], "START");
        assert_eq!(body["trace"]["trail"].as_array().unwrap().last().unwrap(), "DONE");
    }

    #[tokio::test]
    async fn test_trace_past_deadline_still_returns_report() {
        let (status, body) = post_ask(
            slow_app().await,
            json!({"question": "Brand A rating", "now": "2024-06-15", "trace": true, "path": "analytic"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["report"]["fallback_reason"], "cancelled");
        assert_eq!(body["report"]["insufficient_evidence"], true);
        assert_eq!(body["trace"]["trail"].as_array().unwrap().last().unwrap(), "EXECUTED");
    }

    #[tokio::test]
    async fn test_ask_rejects_empty_question() {
        let (status, _) = post_ask(test_app().await, json!({"question": ""})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
