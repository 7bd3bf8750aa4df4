//! MapSpace server - shared state, router and serve loop.

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use mapspace_world::{describe::Language, WorldStore};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::{
    config::{CorsConfig, ServerConfig},
    error::{ServiceError, ServiceResult},
    handlers,
    provider::{HttpMapProvider, MapProvider},
};

/// State shared across handlers
pub struct AppState {
    /// Configuration
    pub config: ServerConfig,
    /// Per-user worlds
    pub store: WorldStore,
    /// Upstream map service
    pub provider: Arc<dyn MapProvider>,
    /// Prompt language
    pub language: Language,
}

impl AppState {
    pub fn new(config: ServerConfig, provider: Arc<dyn MapProvider>) -> Self {
        Self {
            store: WorldStore::new(config.view.clone()),
            language: Language::from_code(&config.language),
            provider,
            config,
        }
    }
}

/// MapSpace HTTP server
pub struct MapSpaceServer {
    state: Arc<AppState>,
}

impl MapSpaceServer {
    /// Create a server talking to the real map provider
    pub fn new(config: ServerConfig) -> ServiceResult<Self> {
        let provider = HttpMapProvider::new(config.provider.clone())?;
        if config.provider.api_key.is_none() {
            tracing::warn!("MAPS_API_KEY is not set; map provider calls will fail");
        }
        Ok(Self::with_provider(config, Arc::new(provider)))
    }

    pub fn with_provider(config: ServerConfig, provider: Arc<dyn MapProvider>) -> Self {
        Self {
            state: Arc::new(AppState::new(config, provider)),
        }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Serve until ctrl-c
    pub async fn run(self) -> ServiceResult<()> {
        let addr = self.state.config.address();
        tracing::info!("Starting MapSpace server on {}", addr);

        let app = self.router();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| ServiceError::Internal(format!("Failed to bind: {}", e)))?;

        tracing::info!(
            language = self.state.language.code(),
            provider = self.state.provider.name(),
            "MapSpace server listening on http://{}",
            addr
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServiceError::Internal(format!("Server error: {}", e)))?;

        tracing::info!("MapSpace server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins = if config.allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        let parsed: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(Duration::from_secs(config.max_age_secs))
}

/// Build the Axum router
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors);

    Router::new()
        // Health
        .route("/health", get(handlers::health_check))
        // Views
        .route("/view-prompt", get(handlers::view_prompt))
        .route("/view-point", get(handlers::view_point))
        .route("/view-info", get(handlers::view_info))
        .route("/region-map", get(handlers::region_map))
        // Targets and mutations
        .route("/check-target", post(handlers::check_target))
        .route("/move-to-target", post(handlers::move_to_target))
        .route("/add-object", post(handlers::add_object))
        .route("/remove-object", post(handlers::remove_object))
        .route("/change-object", post(handlers::change_object))
        // Route
        .route("/route", post(handlers::load_route).get(handlers::route_progress))
        .route("/route/reset", post(handlers::reset_route))
        // Maps passthrough
        .route("/maps/directions", get(handlers::directions))
        .route("/maps/timezone", get(handlers::timezone))
        .route("/maps/search-text", post(handlers::search_text))
        .route("/maps/search-nearby", post(handlers::search_nearby))
        .route("/maps/metadata", get(handlers::streetview_metadata))
        .route("/maps/streetview", get(handlers::streetview))
        // Middleware
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
