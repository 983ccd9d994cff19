use axum::{http::Method, middleware as axum_middleware, routing::get, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use oplog_backend::{
    config::Config,
    db::{connection::create_client, schema::SchemaManager},
    docs::ApiDoc,
    handlers,
    middleware::{capture, request_id},
    services::recorder::{ClickHouseSink, LogRecorder},
    state::AppState,
};

fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "<empty>".into();
    }
    let prefix = s.chars().take(4).collect::<String>();
    format!("{}*** (len={})", prefix, s.len())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "oplog_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()?;
    tracing::info!(
        clickhouse_url = %config.clickhouse_url,
        clickhouse_user = %config.clickhouse_user,
        clickhouse_password = %mask_secret(&config.clickhouse_password),
        clickhouse_db = %config.clickhouse_db,
        bind_addr = %config.bind_addr,
        log_queue_capacity = config.log_queue_capacity,
        capture_get_bodies = config.capture_get_bodies,
        "Loaded configuration from environment/.env"
    );

    // Create the database and log tables before accepting traffic
    SchemaManager::new(&config)?.ensure_ready().await?;

    let client = create_client(&config);
    let recorder = LogRecorder::new(config.log_queue_capacity);
    recorder.spawn_writer(Arc::new(ClickHouseSink::new(client.clone())));

    let state = AppState::new(client, recorder, config.clone());

    // Compose app with shared layers (CORS/Trace) and shared state.
    // The capture middleware wraps every route; request_id sits outside it
    // so the capture layer always sees an id.
    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .merge(handlers::logs::routes())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(axum_middleware::from_fn_with_state(state.clone(), capture))
        .layer(axum_middleware::from_fn(request_id))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods([Method::GET, Method::OPTIONS])
                        .allow_headers(Any)
                        .max_age(std::time::Duration::from_secs(24 * 60 * 60)),
                ),
        )
        .with_state(state);

    // Start server
    tracing::info!("Server listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
