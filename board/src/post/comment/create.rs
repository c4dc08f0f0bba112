use std::sync::Arc;

use axum::{
    Json, debug_handler,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use crate::{
    App,
    error::AppError,
    identity::{Identity, MaybeAuthUser},
    post::models::{
        PostId,
        comment::{CommentId, NewComment},
    },
    views,
};

use super::tree::{MAX_REPLY_DEPTH, Thread, reply_depth};

const MAX_CONTENT_CHARS: usize = 5000;

#[debug_handler]
pub async fn create_comment(
    State(app): State<App>,
    Path(post_id): Path<PostId>,
    MaybeAuthUser(auth_user): MaybeAuthUser,
    crate::json::Json(submission): crate::json::Json<CommentSubmission>,
) -> Result<(StatusCode, Json<Option<Arc<Thread>>>), AppError> {
    let actor = auth_user.map_err(AppError::from)?;
    let thread = post_comment(&app, Some(&actor), post_id, submission).await?;
    Ok((StatusCode::CREATED, Json(thread)))
}

/// Stores a comment written by `actor` and returns the post's thread as it
/// stands afterwards, `None` if the thread could not be read back.
pub async fn post_comment(
    app: &App,
    actor: Option<&Identity>,
    post_id: PostId,
    mut submission: CommentSubmission,
) -> Result<Option<Arc<Thread>>, AppError> {
    let Some(actor) = actor else {
        return Err(("You must be logged in to comment", StatusCode::UNAUTHORIZED).into());
    };

    let author_display_name = actor
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| AppError::validation("Your profile has no display name"))?
        .to_string();

    submission.validate().map_err(AppError::validation)?;

    // replies must stay inside the post, under a comment readers can see
    if let Some(parent_id) = submission.parent_comment_id {
        let comments = app.gateway.query_comments(post_id).await?;
        let Some(parent_depth) = reply_depth(&comments, parent_id) else {
            return Err(AppError::validation(
                "You're replying to the comment that does not belong to this post",
            ));
        };

        if parent_depth + 1 > MAX_REPLY_DEPTH {
            return Err(AppError::validation(format!(
                "Replies can't be nested deeper than {MAX_REPLY_DEPTH} levels"
            )));
        }
    }

    app.gateway
        .insert_comment(NewComment {
            post_id,
            parent_comment_id: submission.parent_comment_id,
            content: submission.content,
            author_id: actor.id,
            author_display_name,
        })
        .await?;

    app.views.threads.invalidate(post_id).await;
    tracing::info!(post_id, user_id = %actor.id, "comment posted");

    // The comment is stored at this point, a failed read must not make the
    // client post it again
    match views::refresh_thread(app, post_id).await {
        Ok(thread) => Ok(Some(thread)),
        Err(err) => {
            tracing::warn!(?err, post_id, "could not refresh the thread after posting");
            Ok(None)
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CommentSubmission {
    pub content: String,
    #[serde(default)]
    pub parent_comment_id: Option<CommentId>,
}

impl CommentSubmission {
    fn validate(&mut self) -> Result<(), &'static str> {
        self.content = self.content.trim().to_string();

        if self.content.is_empty() {
            return Err("No content provided");
        }

        if self.content.chars().count() > MAX_CONTENT_CHARS {
            return Err("Content too long (max 5000 characters)");
        }

        Ok(())
    }
}
