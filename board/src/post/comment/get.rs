use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};

use crate::{App, error::AppError, post::models::PostId, views};

use super::tree::Thread;

pub async fn get_comments(
    State(app): State<App>,
    Path(post_id): Path<PostId>,
) -> Result<Json<Arc<Thread>>, AppError> {
    Ok(Json(views::thread(&app, post_id).await?))
}
