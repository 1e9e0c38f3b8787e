//! Register/login/me endpoints. This is the only place a user's identity
//! is established; everything past it (quota, history) keys off the stable
//! user id minted here.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bcrypt::{hash, verify, DEFAULT_COST};
use tracing::{info, warn};

use crate::auth::{
    jwt::JwtHandler,
    middleware::extract_claims,
    models::{LoginRequest, LoginResponse, RegisterRequest},
};
use crate::domain::{Tier, User, UserResponse};
use crate::store::Store;

#[derive(Clone)]
pub struct AuthState {
    pub store: Store,
    pub jwt_handler: Arc<JwtHandler>,
}

impl AuthState {
    pub fn new(store: Store, jwt_handler: Arc<JwtHandler>) -> Self {
        Self { store, jwt_handler }
    }
}

/// POST /api/auth/register — new accounts default to FREE tier (spec §4.D).
pub async fn register(
    State(state): State<AuthState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<LoginResponse>, AuthApiError> {
    if payload.password.len() < 8 {
        return Err(AuthApiError::WeakPassword);
    }

    if state
        .store
        .find_user_by_username(&payload.username)
        .await
        .map_err(|_| AuthApiError::InternalError)?
        .is_some()
    {
        return Err(AuthApiError::UserAlreadyExists);
    }

    let password_hash = hash(&payload.password, DEFAULT_COST).map_err(|_| AuthApiError::InternalError)?;
    let user = User::new(payload.username, password_hash, Tier::Free);
    let user = state
        .store
        .create_user(user)
        .await
        .map_err(|_| AuthApiError::UserAlreadyExists)?;

    let (token, expires_in) = state
        .jwt_handler
        .generate_token(&user)
        .map_err(|_| AuthApiError::InternalError)?;

    info!(username = %user.username, "registered new user");

    Ok(Json(LoginResponse {
        token,
        expires_in,
        user: UserResponse::from_user(&user),
    }))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AuthState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AuthApiError> {
    let user = state
        .store
        .find_user_by_username(&payload.username)
        .await
        .map_err(|_| AuthApiError::InternalError)?
        .ok_or(AuthApiError::InvalidCredentials)?;

    let valid = verify(&payload.password, &user.password_hash).map_err(|_| AuthApiError::InternalError)?;
    if !valid {
        warn!(username = %payload.username, "failed login attempt");
        return Err(AuthApiError::InvalidCredentials);
    }
    if !user.active {
        return Err(AuthApiError::Forbidden);
    }

    let (token, expires_in) = state
        .jwt_handler
        .generate_token(&user)
        .map_err(|_| AuthApiError::InternalError)?;

    Ok(Json(LoginResponse {
        token,
        expires_in,
        user: UserResponse::from_user(&user),
    }))
}

/// GET /api/auth/me — built straight from the JWT's claims, no DB lookup.
pub async fn get_current_user(req: Request) -> Result<Json<serde_json::Value>, AuthApiError> {
    let claims = extract_claims(&req).ok_or(AuthApiError::Unauthorized)?;
    Ok(Json(serde_json::json!({
        "id": claims.sub,
        "username": claims.username,
        "tier": claims.tier,
    })))
}

#[derive(Debug)]
pub enum AuthApiError {
    InvalidCredentials,
    Unauthorized,
    Forbidden,
    UserAlreadyExists,
    WeakPassword,
    InternalError,
}

impl IntoResponse for AuthApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthApiError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "Invalid username or password")
            }
            AuthApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthApiError::Forbidden => (StatusCode::FORBIDDEN, "Account is deactivated"),
            AuthApiError::UserAlreadyExists => (StatusCode::CONFLICT, "Username already exists"),
            AuthApiError::WeakPassword => (
                StatusCode::BAD_REQUEST,
                "Password must be at least 8 characters",
            ),
            AuthApiError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };
        (status, message).into_response()
    }
}
