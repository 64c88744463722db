use axum::{
    Json,
    extract::{Path, Query, State, rejection::{JsonRejection, PathRejection}},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use pinlist_db::{Window, lists::ListChanges};
use pinlist_types::api::{CreateListRequest, PageQuery, UpdateListRequest};
use pinlist_types::models::{List, Page, Pin};

use crate::auth::AppState;
use crate::error::{ApiError, blocking};
use crate::gate::{MaybeSession, Session};

pub async fn create_list(
    State(state): State<AppState>,
    session: Session,
    body: Result<Json<CreateListRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    req.validate().map_err(ApiError::Validation)?;

    let owner = session.user;
    let list = blocking(move || {
        state
            .db
            .create_list(&owner, req.name.trim(), req.description.as_deref(), req.public)
    })
    .await?;

    info!(list_id = list.id, "List created");
    Ok((StatusCode::CREATED, Json(list)))
}

/// Lists the caller is a member of.
pub async fn my_lists(
    State(state): State<AppState>,
    session: Session,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<List>>, ApiError> {
    let (lists, total) =
        blocking(move || state.db.lists_for_user(&session.user, Window::from(page))).await?;
    Ok(Json(Page::new(lists, total)))
}

pub async fn get_list(
    State(state): State<AppState>,
    session: MaybeSession,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<List>, ApiError> {
    let Path(id) = id?;

    let list = blocking(move || -> anyhow::Result<Result<List, ApiError>> {
        let Some(list) = state.db.list_with_members(id)? else {
            return Ok(Err(ApiError::NotFound));
        };
        if !state.db.has_access(session.user(), id)? {
            return Ok(Err(ApiError::Unauthorized));
        }
        Ok(Ok(list))
    })
    .await??;

    Ok(Json(list))
}

pub async fn update_list(
    State(state): State<AppState>,
    session: Session,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<UpdateListRequest>, JsonRejection>,
) -> Result<Json<List>, ApiError> {
    let Path(id) = id?;
    let Json(req) = body?;
    req.validate().map_err(ApiError::Validation)?;

    let changes = ListChanges {
        name: req.name.map(|n| n.trim().to_string()),
        description: req.description,
        public: req.public,
    };

    let list = blocking(move || -> anyhow::Result<Result<List, ApiError>> {
        if state.db.list_by_id(id)?.is_none() {
            return Ok(Err(ApiError::NotFound));
        }
        if !state.db.is_owner(&session.user, id)? {
            return Ok(Err(ApiError::Unauthorized));
        }
        Ok(state.db.update_list(id, &changes)?.ok_or(ApiError::NotFound))
    })
    .await??;

    info!(list_id = id, "List updated");
    Ok(Json(list))
}

pub async fn delete_list(
    State(state): State<AppState>,
    session: Session,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = id?;

    blocking(move || -> anyhow::Result<Result<(), ApiError>> {
        if state.db.list_by_id(id)?.is_none() {
            return Ok(Err(ApiError::NotFound));
        }
        if !state.db.is_owner(&session.user, id)? {
            return Ok(Err(ApiError::Unauthorized));
        }
        state.db.delete_list(id)?;
        Ok(Ok(()))
    })
    .await??;

    Ok(StatusCode::OK)
}

pub async fn list_pins(
    State(state): State<AppState>,
    session: MaybeSession,
    id: Result<Path<i64>, PathRejection>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<Pin>>, ApiError> {
    let Path(id) = id?;

    let page = blocking(move || -> anyhow::Result<Result<Page<Pin>, ApiError>> {
        if state.db.list_by_id(id)?.is_none() {
            return Ok(Err(ApiError::NotFound));
        }
        if !state.db.has_access(session.user(), id)? {
            return Ok(Err(ApiError::Unauthorized));
        }
        let (pins, total) = state.db.pins_for_list(id, Window::from(page))?;
        Ok(Ok(Page::new(pins, total)))
    })
    .await??;

    Ok(Json(page))
}
