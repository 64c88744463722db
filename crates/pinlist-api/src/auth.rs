use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use rand_core::OsRng;
use tracing::info;

use pinlist_db::{Database, is_constraint_violation};
use pinlist_types::api::{AuthResponse, CreateAccountRequest, LoginRequest};

use crate::error::{ApiError, blocking};
use crate::gate::Session;
use crate::rate_limit::RateLimiter;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub limiter: Arc<RateLimiter>,
}

const BAD_CREDENTIALS: &str = "invalid login or password";
const TAKEN: &str = "username or email already taken";

/// Argon2id hash in PHC string form.
fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))?
        .to_string())
}

fn password_matches(password: &str, stored: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(stored)
        .map_err(|e| anyhow::anyhow!("stored password hash is malformed: {e}"))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Writes the account and its first token. A username or email claimed
/// since the caller's duplicate check surfaces as a validation error.
fn insert_account(
    db: &Database,
    req: &CreateAccountRequest,
    password_hash: &str,
) -> anyhow::Result<Result<AuthResponse, ApiError>> {
    let user = match db.create_user(&req.username, &req.email, password_hash) {
        Ok(user) => user,
        Err(e) if is_constraint_violation(&e) => {
            return Ok(Err(ApiError::Validation(TAKEN.into())));
        }
        Err(e) => return Err(e),
    };
    let token = db.create_token(user.id)?;
    Ok(Ok(AuthResponse { user, token }))
}

pub async fn create_account(
    State(state): State<AppState>,
    body: Result<Json<CreateAccountRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    req.validate().map_err(ApiError::Validation)?;

    let response = blocking(move || -> anyhow::Result<Result<AuthResponse, ApiError>> {
        if state.db.user_exists(&req.email, &req.username)? {
            return Ok(Err(ApiError::Validation(TAKEN.into())));
        }
        let password_hash = hash_password(&req.password)?;
        insert_account(&state.db, &req, &password_hash)
    })
    .await??;

    info!(user_id = response.user.id, username = %response.user.username, "Account created");
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, ApiError> {
    let Json(req) = body?;
    req.validate().map_err(ApiError::Validation)?;

    let response = blocking(move || -> anyhow::Result<Option<AuthResponse>> {
        let Some(user) = state.db.user_by_login(req.login.trim())? else {
            return Ok(None);
        };
        if !password_matches(&req.password, &user.password)? {
            return Ok(None);
        }

        let token = state.db.create_token(user.id)?;
        Ok(Some(AuthResponse { user, token }))
    })
    .await?
    .ok_or_else(|| ApiError::Validation(BAD_CREDENTIALS.into()))?;

    info!(user_id = response.user.id, "Logged in");
    Ok(Json(response))
}

/// Revokes the token the request was authenticated with.
pub async fn logout(
    State(state): State<AppState>,
    session: Session,
) -> Result<StatusCode, ApiError> {
    let hash = session.token.clone();
    blocking(move || state.db.revoke_token(&hash)).await?;

    info!(user_id = session.user.id, "Logged out");
    Ok(StatusCode::OK)
}
