use std::sync::atomic::{AtomicBool, Ordering};

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

use super::{Gateway, GatewayError, memory::MemoryGateway};

/// Memory tables whose reads start timing out as soon as a write went
/// through, like a store that drops off right after committing.
#[derive(Default)]
pub struct FlakyGateway {
    inner: MemoryGateway,
    reads_fail: AtomicBool,
}

impl FlakyGateway {
    pub fn heal(&self) {
        self.reads_fail.store(false, Ordering::SeqCst);
    }

    fn read(&self) -> Result<(), GatewayError> {
        if self.reads_fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("timeout".into()));
        }
        Ok(())
    }

    fn wrote(&self, result: Result<(), GatewayError>) -> Result<(), GatewayError> {
        if result.is_ok() {
            self.reads_fail.store(true, Ordering::SeqCst);
        }
        result
    }
}

#[async_trait]
impl Gateway for FlakyGateway {
    async fn query_comments(&self, post_id: PostId) -> Result<Vec<Comment>, GatewayError> {
        self.read()?;
        self.inner.query_comments(post_id).await
    }

    async fn query_votes(&self, post_id: PostId) -> Result<Vec<Vote>, GatewayError> {
        self.read()?;
        self.inner.query_votes(post_id).await
    }

    async fn insert_comment(&self, comment: NewComment) -> Result<(), GatewayError> {
        self.wrote(self.inner.insert_comment(comment).await)
    }

    async fn insert_vote(&self, vote: NewVote) -> Result<(), GatewayError> {
        self.wrote(self.inner.insert_vote(vote).await)
    }

    async fn update_vote(&self, id: VoteId, value: VoteValue) -> Result<(), GatewayError> {
        self.wrote(self.inner.update_vote(id, value).await)
    }

    async fn delete_vote(&self, id: VoteId) -> Result<(), GatewayError> {
        self.wrote(self.inner.delete_vote(id).await)
    }

    async fn query_posts_with_counts(&self) -> Result<Vec<PostWithCounts>, GatewayError> {
        self.read()?;
        self.inner.query_posts_with_counts().await
    }

    async fn query_post(&self, post_id: PostId) -> Result<Post, GatewayError> {
        self.read()?;
        self.inner.query_post(post_id).await
    }

    async fn query_community_posts(
        &self,
        community_id: CommunityId,
    ) -> Result<Vec<Post>, GatewayError> {
        self.read()?;
        self.inner.query_community_posts(community_id).await
    }

    async fn resolve_session(&self, token: &str) -> Result<Option<Identity>, GatewayError> {
        self.inner.resolve_session(token).await
    }
}
