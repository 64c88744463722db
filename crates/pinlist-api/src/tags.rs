use axum::{
    Json,
    extract::{Query, State},
};

use pinlist_db::Window;
use pinlist_types::api::PageQuery;
use pinlist_types::models::{Page, TagCount};

use crate::auth::AppState;
use crate::error::{ApiError, blocking};
use crate::gate::Session;

/// Tag names over every pin the caller can see, with per-name pin counts.
/// `offset` here is the number of names to skip.
pub async fn my_tags(
    State(state): State<AppState>,
    session: Session,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<TagCount>>, ApiError> {
    let (tags, total) =
        blocking(move || state.db.tags_for_user(session.user.id, Window::from(page))).await?;
    Ok(Json(Page::new(tags, total)))
}
