//! Axum API server.

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, HeaderValue, Method};
use axum::middleware as axum_mw;
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{AuthConfig, Config, ServerConfig};
use crate::error::Result;
use crate::quota::QuotaService;
use crate::store::Database;

use super::middleware::ADMIN_PATH;

/// Shared state for all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: QuotaService,
    /// Handle probed by `GET /api/health`.
    pub database: Database,
    /// Secret used to verify HS256 user JWTs.
    pub jwt_secret: String,
    /// Static token accepted on the admin route. `None` disables the route.
    pub admin_token: Option<String>,
}

impl AppState {
    pub fn new(service: QuotaService, database: Database, auth: &AuthConfig) -> Self {
        Self {
            service,
            database,
            jwt_secret: auth.jwt_secret.clone(),
            admin_token: auth.admin_token.clone(),
        }
    }

    /// Open the configured database and wire the quota service over it.
    pub fn from_config(config: &Config) -> Result<Self> {
        let database = Database::open(&config.database)?;
        let service = QuotaService::with_database(database.clone(), &config.quota);
        Ok(Self::new(service, database, &config.auth))
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match o.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            HeaderName::from_static("content-type"),
            HeaderName::from_static("authorization"),
        ])
}

/// Build the axum router with all API routes.
pub fn build_router(state: AppState, server: &ServerConfig) -> Router {
    // Wrap state in Arc once so it can be shared across both the middleware
    // layer and the route handlers without a double-Arc.
    let shared_state = Arc::new(state);

    Router::new()
        .route("/api/health", get(super::routes::health::get_health))
        .route("/api/users", post(super::routes::users::provision_self))
        .route("/api/quota/check", post(super::routes::quota::check_quota))
        .route(
            "/api/quota/increment",
            post(super::routes::quota::increment_quota),
        )
        .route("/api/quota/status", get(super::routes::quota::quota_status))
        .route(ADMIN_PATH, post(super::routes::quota::update_paid_status))
        .layer(DefaultBodyLimit::max(server.body_limit_bytes))
        .layer(axum_mw::from_fn_with_state(
            shared_state.clone(),
            super::middleware::auth_middleware,
        ))
        // Outside auth so preflight requests are answered without a token.
        .layer(cors_layer(&server.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(shared_state)
}

/// Start the API server and run until `shutdown` resolves.
pub async fn start_server<F>(config: &ServerConfig, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state, config);
    let addr = format!("{}:{}", config.bind, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("quota API server listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    tracing::info!("quota API server stopped");
    Ok(())
}
