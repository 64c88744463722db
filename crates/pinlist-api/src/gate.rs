//! Session gates: guest-only, required and optional authentication.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use pinlist_types::models::User;

use crate::auth::AppState;
use crate::error::{ApiError, blocking};

/// Identity resolved from a request's token.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub token: String,
}

/// Token carried by a request: everything after the first space of the
/// `Authorization` header, or else the first non-empty `token` query
/// parameter.
pub fn extract_token(req: &Request) -> Option<String> {
    let from_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split_once(' '))
        .map(|(_, token)| token.trim())
        .filter(|token| !token.is_empty());

    if let Some(token) = from_header {
        return Some(token.to_string());
    }

    let query = req.uri().query().unwrap_or_default();
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, value)| key == "token" && !value.is_empty())
        .map(|(_, value)| value.into_owned())
}

async fn resolve(state: &AppState, token: String) -> Result<Option<Session>, ApiError> {
    let s = state.clone();
    let hash = token.clone();
    let user = blocking(move || s.db.user_by_token(&hash)).await?;
    Ok(user.map(|user| Session { user, token }))
}

/// Rejects any request that carries a token, valid or not.
pub async fn guest_only(req: Request, next: Next) -> Result<Response, ApiError> {
    if extract_token(&req).is_some() {
        return Err(ApiError::Unauthorized);
    }
    Ok(next.run(req).await)
}

/// Requires a live session and attaches it to the request.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(&req).ok_or(ApiError::Unauthorized)?;
    let session = resolve(&state, token).await?.ok_or_else(|| {
        debug!("Rejected request with unknown or expired token");
        ApiError::Unauthorized
    })?;

    req.extensions_mut().insert(session);
    Ok(next.run(req).await)
}

/// Attaches a session when the token resolves; otherwise lets the request
/// through anonymously.
pub async fn optional_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(token) = extract_token(&req) {
        if let Some(session) = resolve(&state, token).await? {
            req.extensions_mut().insert(session);
        }
    }
    Ok(next.run(req).await)
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or(ApiError::Unauthorized)
    }
}

/// Session if one was attached by [`optional_auth`].
#[derive(Debug, Clone)]
pub struct MaybeSession(pub Option<Session>);

impl MaybeSession {
    pub fn user(&self) -> Option<&User> {
        self.0.as_ref().map(|s| &s.user)
    }
}

impl<S> FromRequestParts<S> for MaybeSession
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeSession(parts.extensions.get::<Session>().cloned()))
    }
}
