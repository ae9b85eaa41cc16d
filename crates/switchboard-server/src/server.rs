use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use switchboard_engine::AgentRegistry;
use switchboard_settings::ServerSettings;
use switchboard_telemetry::FeedbackRecorder;

use crate::auth::require_bearer;
use crate::handlers;
use crate::stream::reducer::NodeRoles;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub agents: Arc<AgentRegistry>,
    pub feedback: FeedbackRecorder,
    pub auth_secret: Option<Arc<SecretString>>,
    pub roles: NodeRoles,
}

impl AppState {
    pub fn new(agents: AgentRegistry, feedback: FeedbackRecorder, auth_secret: Option<SecretString>) -> Self {
        if auth_secret.is_none() {
            warn!("AUTH_SECRET is not set - API endpoints are unprotected!");
        }
        Self {
            agents: Arc::new(agents),
            feedback,
            auth_secret: auth_secret.map(Arc::new),
            roles: NodeRoles::default(),
        }
    }
}

/// Build the Axum router with all routes. `/health` sits outside the auth layer.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/info", get(handlers::info))
        .route("/invoke", post(handlers::invoke_default))
        .route("/{agent_id}/invoke", post(handlers::invoke_agent))
        .route("/stream", post(handlers::stream_default))
        .route("/{agent_id}/stream", post(handlers::stream_agent))
        .route("/feedback", post(handlers::feedback))
        .route("/history", post(handlers::history))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    Router::new()
        .merge(protected)
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind and serve until `shutdown` is cancelled.
pub async fn serve(
    config: ServerConfig,
    state: AppState,
    shutdown: CancellationToken,
) -> Result<(), std::io::Error> {
    let router = build_router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    info!(addr = %local_addr, "switchboard server started");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_engine::{MemoryCheckpointer, default_registry};
    use switchboard_llm::MockChatModel;

    fn state() -> AppState {
        let registry = default_registry(
            Arc::new(MockChatModel::echo()),
            Arc::new(MemoryCheckpointer::new()),
        )
        .unwrap();
        AppState::new(registry, FeedbackRecorder::default(), None)
    }

    #[test]
    fn config_from_settings() {
        let settings = switchboard_settings::Settings::default();
        let config = ServerConfig::from(&settings.server);
        assert_eq!(config.host, settings.server.host);
        assert_eq!(config.port, settings.server.port);
    }

    #[test]
    fn build_router_creates_routes() {
        let _router = build_router(state());
    }

    #[tokio::test]
    async fn serve_stops_on_cancel() {
        let token = CancellationToken::new();
        let config = ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
        };
        let handle = tokio::spawn(serve(config, state(), token.clone()));
        token.cancel();
        handle.await.unwrap().unwrap();
    }
}
