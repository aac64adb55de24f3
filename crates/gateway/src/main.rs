//! NetRAG API Gateway
//!
//! HTTP entry point over the context engine.
//! Handles:
//! - Query answering with conversation continuity
//! - Document ingestion and similarity search
//! - Provider capabilities and administrative maintenance
//! - Observability (logging, metrics)

mod handlers;
mod middleware;

use anyhow::Context;
use axum::{
    routing::{delete, get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use netrag_common::{
    config::{AppConfig, StorageBackend},
    db::{ensure_schema, DbPool},
    embeddings::create_embedder,
    llm::create_generator,
    memory::{InMemoryTurnStore, PgTurnStore, TurnStore},
    metrics::{self, BACKEND_BUCKETS, LATENCY_BUCKETS, METRICS_PREFIX},
    store::{InMemoryEmbeddingStore, PgEmbeddingStore},
    ConversationMemory, Embedder, EmbeddingStore,
};
use netrag_context::{
    providers::{ChangeProvider, KnowledgeProvider, NetworkProvider},
    services::{SdwanService, ServiceNowService},
    Indexer, Orchestrator, ProviderRegistry,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// Present only for the Postgres backend
    pub db: Option<DbPool>,
    pub store: Arc<dyn EmbeddingStore>,
    pub embedder: Arc<dyn Embedder>,
    pub indexer: Arc<Indexer>,
    pub orchestrator: Arc<Orchestrator>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(&config);

    info!(
        service = %config.observability.service_name,
        "Starting NetRAG API Gateway v{}",
        netrag_common::VERSION
    );

    let config = Arc::new(config);

    // Initialize metrics
    install_metrics_exporter(config.observability.metrics_port)?;
    metrics::register_metrics();

    let state = build_state(config.clone()).await?;
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

    // In-flight requests get shutdown_timeout to drain after the signal
    let shutdown_timeout = config.shutdown_timeout();
    tokio::select! {
        result = server => result?,
        _ = async {
            shutdown_signal().await;
            tokio::time::sleep(shutdown_timeout).await;
        } => warn!(?shutdown_timeout, "Graceful shutdown timed out"),
    }

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Serve Prometheus metrics on their own port; 0 disables the exporter
fn install_metrics_exporter(port: u16) -> anyhow::Result<()> {
    if port == 0 {
        info!("Metrics exporter disabled");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_embedding_duration_seconds", METRICS_PREFIX)),
            BACKEND_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_generation_duration_seconds", METRICS_PREFIX)),
            BACKEND_BUCKETS,
        )?
        .set_buckets_for_metric(Matcher::Suffix("_duration_seconds".into()), LATENCY_BUCKETS)?
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!(port, "Metrics exporter listening");
    Ok(())
}

async fn build_state(config: Arc<AppConfig>) -> anyhow::Result<AppState> {
    let dimension = config.embedding.dimension;

    let (db, store, turns): (Option<DbPool>, Arc<dyn EmbeddingStore>, Arc<dyn TurnStore>) =
        match config.database.backend {
            StorageBackend::Postgres => {
                info!("Connecting to database...");
                let pool = DbPool::new(&config.database).await?;
                ensure_schema(&pool, dimension).await?;
                (
                    Some(pool.clone()),
                    Arc::new(PgEmbeddingStore::new(pool.clone(), dimension)),
                    Arc::new(PgTurnStore::new(pool)),
                )
            }
            StorageBackend::Memory => {
                warn!("Using in-memory storage; data is lost on restart");
                (
                    None,
                    Arc::new(InMemoryEmbeddingStore::new(dimension)),
                    Arc::new(InMemoryTurnStore::new()),
                )
            }
        };

    let embedder = create_embedder(&config.embedding)?;
    if embedder.dimension() != store.dimension() {
        anyhow::bail!(
            "embedder {} produces {}-dimensional vectors but the store expects {}",
            embedder.model_name(),
            embedder.dimension(),
            store.dimension()
        );
    }

    let generator = create_generator(&config.llm)?;
    let memory = ConversationMemory::new(turns, config.retrieval.history_window);

    let service_timeout = Duration::from_secs(config.services.timeout_secs);
    let sdwan = SdwanService::new(&config.services.sdwan_url, service_timeout)?;
    let servicenow = ServiceNowService::new(
        &config.services.servicenow_url,
        service_timeout,
        config.services.change_limit,
    )?;

    // Narrowest keyword set first: network keywords such as "status" and
    // "ip" also appear in change questions
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(ChangeProvider::new(Arc::new(servicenow))?), false);
    registry.register(Arc::new(NetworkProvider::new(Arc::new(sdwan))), false);
    registry.register(
        Arc::new(
            KnowledgeProvider::new(store.clone(), embedder.clone(), &config.retrieval)
                .always_available(),
        ),
        true,
    );

    let orchestrator = Orchestrator::new(registry, memory, generator, &config.llm)?;
    let indexer = Indexer::new(store.clone(), embedder.clone(), &config.retrieval);

    Ok(AppState {
        config,
        db,
        store,
        embedder,
        indexer: Arc::new(indexer),
        orchestrator: Arc::new(orchestrator),
    })
}

fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let request_timeout = state.config.request_timeout();

    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        // Query answering
        .route("/query", post(handlers::query::query))
        .route("/capabilities", get(handlers::admin::capabilities))
        // Ingestion and search
        .route("/ingest/text", post(handlers::ingest::ingest_text))
        .route("/search", post(handlers::search::search_by_vector))
        .route("/search/text", post(handlers::search::search_by_text))
        // Conversations
        .route("/conversations", get(handlers::conversations::list_conversations))
        .route(
            "/conversations/{id}",
            get(handlers::conversations::get_conversation)
                .delete(handlers::conversations::delete_conversation),
        )
        // Maintenance
        .route("/admin/table-counts", get(handlers::admin::table_counts))
        .route("/admin/embeddings", delete(handlers::admin::clear_embeddings))
        .route("/admin/conversations", delete(handlers::admin::clear_conversations))
        .route_layer(axum::middleware::from_fn(middleware::track_requests))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(cors)
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}
