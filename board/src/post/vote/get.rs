use axum::{
    Json,
    extract::{Path, State},
};

use crate::{App, error::AppError, identity::MaybeAuthUser, post::models::PostId, views};

use super::reconcile::VoteSummary;

pub async fn get_votes(
    State(app): State<App>,
    Path(post_id): Path<PostId>,
    MaybeAuthUser(viewer): MaybeAuthUser,
) -> Result<Json<VoteSummary>, AppError> {
    let post_votes = views::votes(&app, post_id).await?;

    Ok(Json(VoteSummary::new(
        post_votes.tally,
        &post_votes.votes,
        viewer.ok().map(|i| i.id),
    )))
}
