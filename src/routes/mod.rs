use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    middleware::{self as axum_middleware},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::api_client::ApiClient;
use crate::auth::{AuthBackend, CookieTokenStore, RefreshCoordinator};
use crate::config::Config;
use crate::dashboard::{self, RetryPolicy};
use crate::error::{ApiError, ClientError};
use crate::middleware::{self, GateConfig};
use crate::session::SessionContext;

/// Application version from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub backend: Arc<AuthBackend>,
    pub coordinator: Arc<RefreshCoordinator>,
    pub api_client: Arc<ApiClient>,
}

impl AppState {
    /// Build the process-wide clients from configuration
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let backend = Arc::new(AuthBackend::new(
            &config.api_url,
            config.http_connect_timeout,
            config.http_request_timeout,
        )?);
        let coordinator = Arc::new(RefreshCoordinator::new(
            backend.clone(),
            config.refresh_mode,
        ));
        let api_client = Arc::new(ApiClient::new(
            &config.api_url,
            coordinator.clone(),
            config.http_connect_timeout,
            config.http_request_timeout,
        )?);

        Ok(Self {
            config: Arc::new(config),
            backend,
            coordinator,
            api_client,
        })
    }

    /// Token store over the request's cookies
    fn store(&self, headers: &HeaderMap) -> CookieTokenStore {
        CookieTokenStore::from_headers(headers, self.config.cookie_policy())
    }

    fn session(&self) -> SessionContext {
        SessionContext::new(
            self.backend.clone(),
            self.coordinator.clone(),
            self.config.revoke_on_logout,
        )
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.config.query_max_retries,
            base_delay_ms: self.config.query_retry_base_delay_ms,
        }
    }
}

/// Attach the store's pending cookie writes to a response
fn with_cookies(store: &CookieTokenStore, response: impl IntoResponse) -> Response {
    let mut response = response.into_response();
    store.apply_to(response.headers_mut());
    response
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Build the gateway router with the route gate and request tracing
pub fn app(state: AppState) -> Router {
    let gate = state.config.gate();

    Router::new()
        .merge(health_routes())
        .merge(session_routes(state.clone()))
        .merge(page_routes(state))
        .layer(axum_middleware::from_fn_with_state(gate, middleware::route_gate))
        .layer(TraceLayer::new_for_http())
}

/// Health check routes
pub fn health_routes() -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
}

/// Session actions used by the login page and the dashboard header
pub fn session_routes(state: AppState) -> Router {
    Router::new()
        .route("/session", get(session_handler))
        .route("/session/login", post(login_handler))
        .route("/session/logout", post(logout_handler))
        .with_state(state)
}

/// Login entry point and protected pages
pub fn page_routes(state: AppState) -> Router {
    let GateConfig {
        protected_prefix,
        login_path,
    } = state.config.gate();

    Router::new()
        .route(&login_path, get(login_page_handler))
        .route(&protected_prefix, get(dashboard_handler))
        .with_state(state)
}

async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "message": "Dashboard gateway is running",
        "version": VERSION,
    }))
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "version": VERSION,
    }))
}

/// GET /session
async fn session_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let store = state.store(&headers);
    let session = state.session();
    session.load(&store).await;

    with_cookies(&store, Json(session.snapshot().await))
}

/// POST /session/login
async fn login_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: Result<Json<LoginForm>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(form) = form.map_err(|rejection| {
        tracing::debug!(status = %rejection.status(), "Rejected login body");
        ApiError::ValidationError(rejection.body_text())
    })?;

    if form.email.trim().is_empty() || form.password.is_empty() {
        return Err(ApiError::ValidationError(
            "Email and password are required".to_string(),
        ));
    }

    let store = state.store(&headers);
    let outcome = state.session().login(&store, &form.email, &form.password).await;

    let status = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::UNAUTHORIZED
    };

    let mut body = serde_json::to_value(&outcome).map_err(anyhow::Error::from)?;
    if let Some(navigate) = outcome.navigate {
        let config = &state.config;
        body["redirect"] = json!(navigate.path(&config.login_path, &config.protected_prefix));
    }

    Ok(with_cookies(&store, (status, Json(body))))
}

/// POST /session/logout
async fn logout_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let store = state.store(&headers);
    let navigate = state.session().logout(&store).await;

    let target = navigate.path(&state.config.login_path, &state.config.protected_prefix);
    with_cookies(&store, Redirect::to(target))
}

/// GET /login
async fn login_page_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "page": "login",
        "action": "/session/login",
        "redirect": state.config.protected_prefix,
    }))
}

/// GET /dashboard
async fn dashboard_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let store = state.store(&headers);

    match dashboard::load_dashboard(&state.api_client, &store, state.retry_policy()).await {
        Ok(view) => with_cookies(&store, Json(view)),
        Err(ClientError::Unauthorized) => {
            tracing::info!("Session lost while loading dashboard, redirecting to login");
            with_cookies(&store, Redirect::to(&state.config.login_path))
        }
        Err(e) => with_cookies(&store, ApiError::from(e)),
    }
}
