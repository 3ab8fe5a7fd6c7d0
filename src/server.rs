//! # Server Configuration
//!
//! Router assembly and server startup.

use std::sync::Arc;

use axum::{Router, middleware, routing::get};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::environment::{self, ProcessEnvironment, SharedEnvironment};
use crate::googleauth::{GoogleAuth, GoogleAuthSettings, MemoryUserBackend, UserBackend};
use crate::handlers;
use crate::session::{MemorySessionStore, SessionConfig, SessionManager, SessionStore};
use crate::telemetry;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub environment: SharedEnvironment,
    pub sessions: SessionManager,
    pub google: Arc<GoogleAuth>,
    pub users: Arc<dyn UserBackend>,
}

impl AppState {
    /// Builds state with the given environment, session store and user backend.
    ///
    /// Fails when OAuth client credentials are missing or invalid.
    pub fn new(
        config: AppConfig,
        environment: SharedEnvironment,
        store: Arc<dyn SessionStore>,
        users: Arc<dyn UserBackend>,
    ) -> anyhow::Result<Self> {
        let settings = GoogleAuthSettings::from_config(&config)?;
        let google = GoogleAuth::new(settings)?;

        let sessions = SessionManager::new(
            store,
            SessionConfig {
                cookie_name: config.session_cookie_name,
                ttl: i64::try_from(config.session_ttl_seconds)
                    .ok()
                    .and_then(chrono::Duration::try_seconds)
                    .unwrap_or_else(|| chrono::Duration::days(14)),
                secure: environment::is_production_environment(environment.as_ref()),
            },
        );

        Ok(Self {
            environment,
            sessions,
            google: Arc::new(google),
            users,
        })
    }

    /// Process environment, in-memory sessions and in-memory users.
    pub fn in_memory(config: AppConfig) -> anyhow::Result<Self> {
        Self::new(
            config,
            Arc::new(ProcessEnvironment),
            Arc::new(MemorySessionStore::new()),
            Arc::new(MemoryUserBackend::new()),
        )
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let tasks = environment::guard(
        state.environment.clone(),
        Router::new().route(
            handlers::tasks::CLEAR_SESSIONS_PATH,
            get(handlers::tasks::clear_sessions).post(handlers::tasks::clear_sessions),
        ),
    );

    Router::new()
        .route("/", get(handlers::root))
        .route(handlers::oauth::LOGIN_PATH, get(handlers::oauth::login))
        .route(
            handlers::oauth::CALLBACK_PATH,
            get(handlers::oauth::oauth2callback),
        )
        .merge(tasks)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(telemetry::trace_context_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Starts the server with the given configuration
pub async fn run_server(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init_tracing(&config)?;

    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;
    let profile = config.profile.clone();

    let state = AppState::in_memory(config)?;
    let context = environment::ExecutionContext::capture(state.environment.as_ref());
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        %addr,
        %profile,
        application_id = %context.application_id,
        production = context.is_production,
        "Server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::oauth::login,
        crate::handlers::oauth::oauth2callback,
        crate::handlers::tasks::clear_sessions,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::models::ClearSessionsResponse,
            crate::error::ApiError,
        )
    ),
    info(
        title = "gaekit",
        description = "Google login and App Engine task endpoints",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
