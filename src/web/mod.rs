use axum::{
    Extension, Json, Router,
    extract::State,
    http::{HeaderValue, Method, StatusCode, header},
    middleware as axum_middleware,
    response::IntoResponse,
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::server::config::ServerConfig;
use crate::services::auth_service;
use crate::services::lockout::LoginAttemptTracker;
use crate::services::rate_limit::RateLimiter;
use crate::services::reply::{HttpReplyGenerator, KnowledgeResponder, ReplyError, ReplyGenerator};
use crate::web::{
    middleware::{auth, tenant::{self, ResolvedTenant}},
    models::{LoginRequest, RegisterRequest, RegisterResponse},
    routes::*,
};

pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;

pub use error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DatabaseConnection,
    pub config: Arc<ServerConfig>,
    pub login_tracker: Arc<LoginAttemptTracker>,
    pub chat_limiter: Arc<RateLimiter>,
    pub reply_generator: Arc<dyn ReplyGenerator>,
}

impl AppState {
    /// Builds the shared state, picking the external reply provider when one is configured.
    pub fn new(db_pool: DatabaseConnection, config: Arc<ServerConfig>) -> Result<Self, ReplyError> {
        let reply_generator: Arc<dyn ReplyGenerator> = match &config.reply_endpoint {
            Some(endpoint) => {
                info!(endpoint = %endpoint, "Using external reply provider.");
                Arc::new(HttpReplyGenerator::new(endpoint.clone())?)
            }
            None => Arc::new(KnowledgeResponder),
        };
        Ok(Self::with_generator(db_pool, config, reply_generator))
    }

    pub fn with_generator(
        db_pool: DatabaseConnection,
        config: Arc<ServerConfig>,
        reply_generator: Arc<dyn ReplyGenerator>,
    ) -> Self {
        Self {
            db_pool,
            config,
            login_tracker: Arc::new(LoginAttemptTracker::default()),
            chat_limiter: Arc::new(RateLimiter::default()),
            reply_generator,
        }
    }
}

fn token_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build(("token", token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

async fn register_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let registered = auth_service::register_tenant(&app_state.db_pool, &app_state.config, payload).await?;
    Ok((StatusCode::CREATED, Json(registered)))
}

async fn login_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(ResolvedTenant(host_tenant)): Extension<ResolvedTenant>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let login_response = auth_service::login_user(
        &app_state.db_pool,
        &app_state.login_tracker,
        payload,
        &app_state.config,
        host_tenant.map(|t| t.id),
        Utc::now(),
    )
    .await?;

    let secure = app_state.config.public_url.starts_with("https://");
    let auth_cookie = token_cookie(login_response.token.clone(), secure);

    let mut response = Json(login_response).into_response();
    match HeaderValue::from_str(&auth_cookie.to_string()) {
        Ok(value) => {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
        Err(e) => warn!(error = %e, "Could not encode the session cookie."),
    }
    Ok(response)
}

async fn logout_handler() -> impl IntoResponse {
    let mut expired = token_cookie(String::new(), false);
    expired.make_removal();
    match HeaderValue::from_str(&expired.to_string()) {
        Ok(value) => (StatusCode::NO_CONTENT, [(header::SET_COOKIE, value)]).into_response(),
        Err(_) => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn health_check_handler() -> &'static str {
    "OK"
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods(vec![Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(AllowOrigin::list(origins))
    }
}

pub fn create_axum_router(app_state: Arc<AppState>) -> Router {
    let cors = cors_layer(&app_state.config);
    let protected = || axum_middleware::from_fn_with_state(app_state.clone(), auth::auth);

    Router::new()
        .route("/api/health", get(health_check_handler))
        .route("/api/auth/register", post(register_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/logout", post(logout_handler))
        .route("/api/auth/me", get(auth_service::me).route_layer(protected()))
        .merge(public_routes::create_public_router())
        .nest("/api/user", user_routes::create_user_router().route_layer(protected()))
        .nest("/api/users", team_routes::create_team_router().route_layer(protected()))
        .nest("/api/tenant", tenant_routes::create_tenant_router().route_layer(protected()))
        .nest("/api/bots", bot_routes::create_bot_router().route_layer(protected()))
        .nest(
            "/api/knowledge-bases",
            knowledge_routes::create_knowledge_router().route_layer(protected()),
        )
        .nest("/api/widgets", widget_routes::create_widget_router().route_layer(protected()))
        .nest(
            "/api/conversations",
            conversation_routes::create_conversation_router().route_layer(protected()),
        )
        .nest(
            "/api/billing",
            billing_routes::create_billing_router()
                .route_layer(protected())
                .merge(billing_routes::create_webhook_router()),
        )
        .nest(
            "/api/notifications",
            notification_routes::create_notification_router().route_layer(protected()),
        )
        .nest(
            "/api/analytics",
            analytics_routes::create_analytics_router().route_layer(protected()),
        )
        .layer(axum_middleware::from_fn_with_state(app_state.clone(), tenant::resolve))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state.clone())
        .layer(cors)
}
