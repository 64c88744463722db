use axum::{
    Json,
    extract::{Path, Query, State, rejection::{JsonRejection, PathRejection}},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{debug, info};

use pinlist_db::Window;
use pinlist_types::api::{CreatePinRequest, PageQuery};
use pinlist_types::models::{NewPin, Page, Pin};

use crate::auth::AppState;
use crate::error::{ApiError, blocking};
use crate::gate::Session;

pub async fn create_pin(
    State(state): State<AppState>,
    session: Session,
    body: Result<Json<CreatePinRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    req.validate().map_err(ApiError::Validation)?;

    let user = session.user;
    let list = req.list;
    let new = NewPin::new(user.id, req.title.trim(), &req.url, &req.tags, req.list);
    let mut pin = blocking(move || state.db.create_pin(&new))
        .await?
        .ok_or_else(|| {
            debug!(user_id = user.id, list_id = ?list, "Pin rejected: no access to list");
            ApiError::Unauthorized
        })?;
    pin.creator = Some(user.username);

    Ok((StatusCode::CREATED, Json(pin)))
}

/// Pins the caller created plus pins on the caller's lists.
pub async fn my_pins(
    State(state): State<AppState>,
    session: Session,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<Pin>>, ApiError> {
    let (pins, total) =
        blocking(move || state.db.pins_for_user(session.user.id, Window::from(page))).await?;
    Ok(Json(Page::new(pins, total)))
}

pub async fn delete_pin(
    State(state): State<AppState>,
    session: Session,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = id?;
    let user_id = session.user.id;

    blocking(move || -> anyhow::Result<Result<(), ApiError>> {
        let Some(pin) = state.db.pin_by_id(id)? else {
            return Ok(Err(ApiError::NotFound));
        };
        if pin.creator_id != user_id {
            return Ok(Err(ApiError::Unauthorized));
        }
        if !state.db.delete_pin(id)? {
            return Ok(Err(ApiError::NotFound));
        }
        Ok(Ok(()))
    })
    .await??;

    info!(pin_id = id, user_id, "Pin removed by creator");
    Ok(StatusCode::OK)
}
