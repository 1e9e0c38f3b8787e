//! HTTP/WebSocket surface: router assembly over the Intake API, Shame List,
//! and operational endpoints.

pub mod handlers;
pub mod ws;

use std::sync::Arc;

use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::CorsLayer;

use crate::auth::{api as auth_api, auth_middleware, optional_auth_middleware, AuthState, JwtHandler};
use crate::broker::Broker;
use crate::intake::IntakeApi;
use crate::middleware::{rate_limit_middleware, RateLimitLayer};
use crate::push::PushBus;
use crate::shame_list::ShameList;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub intake: IntakeApi,
    pub shame_list: ShameList,
    pub push: PushBus,
    pub broker: Arc<dyn Broker>,
    pub admin_token: String,
    pub metrics_handle: PrometheusHandle,
}

pub fn build_router(
    state: AppState,
    jwt_handler: Arc<JwtHandler>,
    auth_state: AuthState,
    rate_limiter: RateLimitLayer,
) -> Router {
    let auth_router = Router::new()
        .route("/register", post(auth_api::register))
        .route("/login", post(auth_api::login))
        .with_state(auth_state.clone());

    let auth_me_router = Router::new()
        .route("/me", get(auth_api::get_current_user))
        .route_layer(axum_mw::from_fn_with_state(
            jwt_handler.clone(),
            auth_middleware,
        ))
        .with_state(auth_state);

    let analyze_router = Router::new()
        .route("/analyze", post(handlers::analyze))
        .route_layer(axum_mw::from_fn_with_state(
            jwt_handler.clone(),
            optional_auth_middleware,
        ))
        .with_state(state.clone());

    let api_router = Router::new()
        .route("/analyses", get(handlers::list_analyses))
        .route("/analyses/:id", get(handlers::get_analysis))
        .route("/shame", get(handlers::list_shame))
        .route(
            "/admin/shame/:id/deactivate",
            post(handlers::deactivate_shame_entry),
        )
        .merge(analyze_router)
        .with_state(state.clone());

    let ws_router = Router::new()
        .route("/ws", get(ws::handler))
        .with_state(state.clone());

    Router::new()
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .nest("/api/auth", auth_router.merge(auth_me_router))
        .nest("/api", api_router)
        .merge(ws_router)
        .layer(axum_mw::from_fn_with_state(
            rate_limiter,
            rate_limit_middleware,
        ))
        .layer(CorsLayer::permissive())
}
