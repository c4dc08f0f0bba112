use axum::{
    Json,
    extract::{Path, State},
};

use crate::{App, error::AppError};

use super::models::{
    CommunityId, PostId,
    post::{Post, PostWithCounts},
};

pub async fn list_posts(State(app): State<App>) -> Result<Json<Vec<PostWithCounts>>, AppError> {
    Ok(Json(app.gateway.query_posts_with_counts().await?))
}

pub async fn get_post(
    State(app): State<App>,
    Path(post_id): Path<PostId>,
) -> Result<Json<Post>, AppError> {
    Ok(Json(app.gateway.query_post(post_id).await?))
}

pub async fn list_community_posts(
    State(app): State<App>,
    Path(community_id): Path<CommunityId>,
) -> Result<Json<Vec<Post>>, AppError> {
    Ok(Json(app.gateway.query_community_posts(community_id).await?))
}
