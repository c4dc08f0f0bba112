use axum::{
    Json, debug_handler,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use crate::{
    App,
    error::AppError,
    gateway::{Gateway, GatewayError},
    identity::{Identity, MaybeAuthUser},
    post::models::{
        PostId,
        vote::{NewVote, VoteValue},
    },
    views,
};

use super::reconcile::{VoteAction, VoteSummary, find_user_vote, reconcile};

/// How many times a vote is decided again after losing a race against
/// another write to the same post.
pub const MAX_CAST_ATTEMPTS: usize = 3;

#[derive(Deserialize, Debug)]
pub struct Ballot {
    pub value: VoteValue,
}

#[derive(Serialize, Debug)]
pub struct CastOutcome {
    #[serde(flatten)]
    pub action: VoteAction,
    /// `None` when the votes could not be read back after the write
    pub summary: Option<VoteSummary>,
}

#[debug_handler]
pub async fn cast_vote(
    State(app): State<App>,
    Path(post_id): Path<PostId>,
    MaybeAuthUser(auth_user): MaybeAuthUser,
    crate::json::Json(ballot): crate::json::Json<Ballot>,
) -> Result<Json<CastOutcome>, AppError> {
    let actor = auth_user.map_err(AppError::from)?;
    let action = cast(&app, Some(&actor), post_id, ballot.value).await?;

    // The vote is stored at this point. Reporting a failed read as an error
    // would have the client cast again and toggle it back off.
    let summary = match views::refresh_votes(&app, post_id).await {
        Ok(post_votes) => Some(VoteSummary::new(
            post_votes.tally,
            &post_votes.votes,
            Some(actor.id),
        )),
        Err(err) => {
            tracing::warn!(?err, post_id, "could not refresh votes after casting");
            None
        }
    };

    Ok(Json(CastOutcome { action, summary }))
}

/// Moves `actor`'s vote on the post toward `requested` with exactly one
/// write. The decision is taken against freshly fetched votes and taken again
/// whenever the store reports that the write conflicted.
pub async fn cast(
    app: &App,
    actor: Option<&Identity>,
    post_id: PostId,
    requested: VoteValue,
) -> Result<VoteAction, AppError> {
    let Some(actor) = actor else {
        return Err(("You must be logged in to vote", StatusCode::UNAUTHORIZED).into());
    };

    for attempt in 1..=MAX_CAST_ATTEMPTS {
        let votes = app.gateway.query_votes(post_id).await?;
        let action = reconcile(requested, find_user_vote(&votes, actor.id));

        match apply(app.gateway.as_ref(), post_id, actor, action).await {
            Ok(()) => {
                app.views.votes.invalidate(post_id).await;
                tracing::info!(post_id, user_id = %actor.id, ?action, "vote cast");
                return Ok(action);
            }
            Err(GatewayError::Conflict(reason)) => {
                tracing::warn!(
                    post_id,
                    user_id = %actor.id,
                    attempt,
                    %reason,
                    "vote write conflicted, deciding again"
                );
            }
            Err(e) => return Err(e.into()),
        }
    }

    // whatever won the race is not in the cached view either
    app.views.votes.invalidate(post_id).await;

    Err(AppError::Conflict(format!(
        "Your vote on post {post_id} kept conflicting with other changes, please try again"
    )))
}

async fn apply(
    gateway: &dyn Gateway,
    post_id: PostId,
    actor: &Identity,
    action: VoteAction,
) -> Result<(), GatewayError> {
    match action {
        VoteAction::Insert { value } => {
            gateway
                .insert_vote(NewVote {
                    post_id,
                    user_id: actor.id,
                    value,
                })
                .await
        }
        VoteAction::Update { id, value } => gateway.update_vote(id, value).await,
        VoteAction::Delete { id } => gateway.delete_vote(id).await,
    }
}

#[cfg(test)]
mod test {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use tokio::sync::Mutex;
    use uuid::Uuid;

    use super::*;
    use crate::{
        config::ServerConfig,
        gateway::{flaky::FlakyGateway, memory::MemoryGateway},
        post::models::{
            CommunityId,
            comment::{Comment, NewComment},
            post::{Post, PostWithCounts},
            vote::{Vote, VoteId},
        },
    };

    fn user(n: u128) -> Identity {
        Identity {
            id: Uuid::from_u128(n),
            display_name: Some(format!("user {n}")),
            avatar_url: None,
        }
    }

    /// Counts calls, and can slip another write in right after a vote
    /// snapshot was handed out.
    #[derive(Default)]
    struct RacingGateway {
        inner: MemoryGateway,
        calls: AtomicUsize,
        intruder: Mutex<Option<NewVote>>,
        /// Makes every write conflict
        always_conflict: bool,
    }

    impl RacingGateway {
        fn touch(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }

        fn conflict(&self) -> Result<(), GatewayError> {
            if self.always_conflict {
                return Err(GatewayError::Conflict("forced".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Gateway for RacingGateway {
        async fn query_comments(&self, post_id: PostId) -> Result<Vec<Comment>, GatewayError> {
            self.touch();
            self.inner.query_comments(post_id).await
        }

        async fn query_votes(&self, post_id: PostId) -> Result<Vec<Vote>, GatewayError> {
            self.touch();
            let snapshot = self.inner.query_votes(post_id).await?;
            if let Some(vote) = self.intruder.lock().await.take() {
                self.inner.insert_vote(vote).await?;
            }
            Ok(snapshot)
        }

        async fn insert_comment(&self, comment: NewComment) -> Result<(), GatewayError> {
            self.touch();
            self.inner.insert_comment(comment).await
        }

        async fn insert_vote(&self, vote: NewVote) -> Result<(), GatewayError> {
            self.touch();
            self.conflict()?;
            self.inner.insert_vote(vote).await
        }

        async fn update_vote(&self, id: VoteId, value: VoteValue) -> Result<(), GatewayError> {
            self.touch();
            self.conflict()?;
            self.inner.update_vote(id, value).await
        }

        async fn delete_vote(&self, id: VoteId) -> Result<(), GatewayError> {
            self.touch();
            self.conflict()?;
            self.inner.delete_vote(id).await
        }

        async fn query_posts_with_counts(&self) -> Result<Vec<PostWithCounts>, GatewayError> {
            self.touch();
            self.inner.query_posts_with_counts().await
        }

        async fn query_post(&self, post_id: PostId) -> Result<Post, GatewayError> {
            self.touch();
            self.inner.query_post(post_id).await
        }

        async fn query_community_posts(
            &self,
            community_id: CommunityId,
        ) -> Result<Vec<Post>, GatewayError> {
            self.touch();
            self.inner.query_community_posts(community_id).await
        }

        async fn resolve_session(&self, token: &str) -> Result<Option<Identity>, GatewayError> {
            self.touch();
            self.inner.resolve_session(token).await
        }
    }

    fn memory_app() -> App {
        App::new(ServerConfig::default(), Arc::new(MemoryGateway::new()))
    }

    async fn user_votes(app: &App, post_id: PostId, actor: &Identity) -> Vec<Vote> {
        app.gateway
            .query_votes(post_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|v| v.user_id == actor.id)
            .collect()
    }

    #[tokio::test]
    async fn test_anonymous_vote_never_reaches_the_store() {
        let gateway = Arc::new(RacingGateway::default());
        let app = App::new(ServerConfig::default(), gateway.clone());

        let err = cast(&app, None, 1, VoteValue::Like).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_like_twice_takes_the_vote_back() {
        let app = memory_app();
        let ali = user(1);

        let first = cast(&app, Some(&ali), 1, VoteValue::Like).await.unwrap();
        assert_eq!(
            first,
            VoteAction::Insert {
                value: VoteValue::Like
            }
        );
        let id = user_votes(&app, 1, &ali).await[0].id;

        let second = cast(&app, Some(&ali), 1, VoteValue::Like).await.unwrap();
        assert_eq!(second, VoteAction::Delete { id });
        assert!(user_votes(&app, 1, &ali).await.is_empty());

        let third = cast(&app, Some(&ali), 1, VoteValue::Dislike).await.unwrap();
        assert_eq!(
            third,
            VoteAction::Insert {
                value: VoteValue::Dislike
            }
        );
        let votes = user_votes(&app, 1, &ali).await;
        assert_eq!(votes.len(), 1);
        assert_eq!(i32::from(votes[0].value), -1);
    }

    #[tokio::test]
    async fn test_switching_direction_updates_in_place() {
        let app = memory_app();
        let ali = user(1);

        cast(&app, Some(&ali), 1, VoteValue::Dislike).await.unwrap();
        let id = user_votes(&app, 1, &ali).await[0].id;

        let action = cast(&app, Some(&ali), 1, VoteValue::Like).await.unwrap();
        assert_eq!(
            action,
            VoteAction::Update {
                id,
                value: VoteValue::Like
            }
        );

        let votes = user_votes(&app, 1, &ali).await;
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].value, VoteValue::Like);
    }

    #[tokio::test]
    async fn test_cast_replaces_cached_tally() {
        let app = memory_app();
        let before = views::votes(&app, 1).await.unwrap();
        assert_eq!(before.tally.likes, 0);

        cast(&app, Some(&user(1)), 1, VoteValue::Like).await.unwrap();
        cast(&app, Some(&user(2)), 1, VoteValue::Like).await.unwrap();

        let after = views::votes(&app, 1).await.unwrap();
        assert_eq!(after.tally.likes, 2);
    }

    #[tokio::test]
    async fn test_lost_race_is_decided_again() {
        let ali = user(1);
        let gateway = Arc::new(RacingGateway {
            intruder: Mutex::new(Some(NewVote {
                post_id: 1,
                user_id: ali.id,
                value: VoteValue::Dislike,
            })),
            ..Default::default()
        });
        let app = App::new(ServerConfig::default(), gateway.clone());

        // the first snapshot shows no vote, but a dislike lands before the insert
        let action = cast(&app, Some(&ali), 1, VoteValue::Like).await.unwrap();
        assert!(matches!(
            action,
            VoteAction::Update {
                value: VoteValue::Like,
                ..
            }
        ));

        let votes = user_votes(&app, 1, &ali).await;
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].value, VoteValue::Like);
    }

    #[tokio::test]
    async fn test_gives_up_after_repeated_conflicts() {
        let gateway = Arc::new(RacingGateway {
            always_conflict: true,
            ..Default::default()
        });
        let app = App::new(ServerConfig::default(), gateway.clone());

        let err = cast(&app, Some(&user(1)), 1, VoteValue::Like)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(err.status_code(), StatusCode::CONFLICT);

        // one read and one write per attempt
        assert_eq!(gateway.calls.load(Ordering::SeqCst), MAX_CAST_ATTEMPTS * 2);
    }

    #[tokio::test]
    async fn test_failed_read_after_write_still_reports_the_cast() {
        let gateway = Arc::new(FlakyGateway::default());
        let app = App::new(ServerConfig::default(), gateway.clone());
        let ali = user(1);

        let Json(outcome) = cast_vote(
            State(app.clone()),
            Path(42),
            MaybeAuthUser(Ok(ali.clone())),
            crate::json::Json(Ballot {
                value: VoteValue::Like,
            }),
        )
        .await
        .unwrap();

        assert_eq!(
            outcome.action,
            VoteAction::Insert {
                value: VoteValue::Like
            }
        );
        assert_eq!(outcome.summary, None);

        gateway.heal();
        assert_eq!(user_votes(&app, 42, &ali).await.len(), 1);
    }

    #[tokio::test]
    async fn test_handler_returns_fresh_summary() {
        let app = memory_app();
        let ali = user(1);

        let Json(outcome) = cast_vote(
            State(app.clone()),
            Path(42),
            MaybeAuthUser(Ok(ali.clone())),
            crate::json::Json(Ballot {
                value: VoteValue::Dislike,
            }),
        )
        .await
        .unwrap();

        assert_eq!(
            outcome.summary,
            Some(VoteSummary {
                likes: 0,
                dislikes: 1,
                user_vote: Some(VoteValue::Dislike),
            })
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_casts_keep_one_row_per_user() {
        let app = memory_app();
        let ali = user(1);
        let bob = user(2);

        let mut handles = Vec::new();
        for i in 0..16 {
            let app = app.clone();
            let actor = if i % 2 == 0 { ali.clone() } else { bob.clone() };
            let value = if i % 3 == 0 {
                VoteValue::Dislike
            } else {
                VoteValue::Like
            };
            handles.push(tokio::spawn(async move {
                cast(&app, Some(&actor), 7, value).await
            }));
        }

        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) | Err(AppError::Conflict(_)) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert!(user_votes(&app, 7, &ali).await.len() <= 1);
        assert!(user_votes(&app, 7, &bob).await.len() <= 1);
    }
}
