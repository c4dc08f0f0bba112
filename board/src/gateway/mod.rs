use async_trait::async_trait;

use crate::{
    identity::Identity,
    post::models::{
        CommunityId, PostId,
        comment::{Comment, NewComment},
        post::{Post, PostWithCounts},
        vote::{NewVote, Vote, VoteId, VoteValue},
    },
};

#[cfg(test)]
pub(crate) mod flaky;
pub mod memory;
pub mod postgres;
pub mod rest;

#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
    /// The write lost a race against another writer, e.g. a second vote row
    /// for the same user and post, or an update to a row that is gone.
    #[error("write conflicts with the current state of the store: {0}")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("store unreachable: {0}")]
    Transport(String),

    #[error("store rejected the request: {0}")]
    Rejected(String),

    #[error("unexpected store response: {0}")]
    Malformed(String),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Conflict(_) | GatewayError::Transport(_))
    }
}

/// Everything the board reads from or writes to the hosted store.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Comments of a post, oldest first.
    async fn query_comments(&self, post_id: PostId) -> Result<Vec<Comment>, GatewayError>;

    async fn query_votes(&self, post_id: PostId) -> Result<Vec<Vote>, GatewayError>;

    async fn insert_comment(&self, comment: NewComment) -> Result<(), GatewayError>;

    /// Fails with [`GatewayError::Conflict`] if the user already has a vote
    /// on the post.
    async fn insert_vote(&self, vote: NewVote) -> Result<(), GatewayError>;

    /// Fails with [`GatewayError::Conflict`] if the vote no longer exists.
    async fn update_vote(&self, id: VoteId, value: VoteValue) -> Result<(), GatewayError>;

    async fn delete_vote(&self, id: VoteId) -> Result<(), GatewayError>;

    /// Listing rows with counts aggregated by the store, newest first.
    async fn query_posts_with_counts(&self) -> Result<Vec<PostWithCounts>, GatewayError>;

    async fn query_post(&self, post_id: PostId) -> Result<Post, GatewayError>;

    /// Posts of a community, newest first.
    async fn query_community_posts(
        &self,
        community_id: CommunityId,
    ) -> Result<Vec<Post>, GatewayError>;

    /// Maps an access token to the user it was issued for, `None` if the
    /// token is unknown or expired.
    async fn resolve_session(&self, token: &str) -> Result<Option<Identity>, GatewayError>;
}
