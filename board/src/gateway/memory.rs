use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::{
    identity::Identity,
    post::models::{
        CommunityId, PostId,
        comment::{Comment, NewComment},
        post::{Post, PostWithCounts},
        vote::{NewVote, Vote, VoteId, VoteValue},
    },
};

use super::{Gateway, GatewayError};

#[derive(Default)]
struct Tables {
    posts: Vec<Post>,
    comments: Vec<Comment>,
    votes: Vec<Vote>,
    sessions: HashMap<String, Identity>,
    last_id: i64,
    last_created_at: Option<DateTime<Utc>>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    // Creation times never go backwards, even if the wall clock does
    fn next_created_at(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let at = match self.last_created_at {
            Some(last) if now <= last => last + chrono::Duration::microseconds(1),
            _ => now,
        };
        self.last_created_at = Some(at);
        at
    }
}

/// Tables kept in process memory. Enforces the same one-vote-per-user-per-post
/// constraint as the real store, so it can stand in for it in dev and tests.
#[derive(Default)]
pub struct MemoryGateway {
    tables: Mutex<Tables>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_post(&self, title: &str, content: &str) -> Post {
        self.add_community_post(None, title, content).await
    }

    pub async fn add_community_post(
        &self,
        community_id: Option<CommunityId>,
        title: &str,
        content: &str,
    ) -> Post {
        let mut tables = self.tables.lock().await;
        let post = Post {
            id: tables.next_id(),
            title: title.to_string(),
            content: content.to_string(),
            created_at: tables.next_created_at(),
            image_url: String::new(),
            avatar_url: None,
            community_id,
        };
        tables.posts.push(post.clone());
        post
    }

    pub async fn add_session(&self, token: &str, identity: Identity) {
        self.tables
            .lock()
            .await
            .sessions
            .insert(token.to_string(), identity);
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn query_comments(&self, post_id: PostId) -> Result<Vec<Comment>, GatewayError> {
        let tables = self.tables.lock().await;
        let mut comments: Vec<Comment> = tables
            .comments
            .iter()
            .filter(|c| c.post_id == post_id)
            .cloned()
            .collect();
        comments.sort_by_key(|c| (c.created_at, c.id));
        Ok(comments)
    }

    async fn query_votes(&self, post_id: PostId) -> Result<Vec<Vote>, GatewayError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .votes
            .iter()
            .filter(|v| v.post_id == post_id)
            .cloned()
            .collect())
    }

    async fn insert_comment(&self, comment: NewComment) -> Result<(), GatewayError> {
        let mut tables = self.tables.lock().await;
        let row = Comment {
            id: tables.next_id(),
            post_id: comment.post_id,
            parent_comment_id: comment.parent_comment_id,
            content: comment.content,
            author_id: comment.author_id,
            author_display_name: comment.author_display_name,
            created_at: tables.next_created_at(),
        };
        tables.comments.push(row);
        Ok(())
    }

    async fn insert_vote(&self, vote: NewVote) -> Result<(), GatewayError> {
        let mut tables = self.tables.lock().await;
        if tables
            .votes
            .iter()
            .any(|v| v.post_id == vote.post_id && v.user_id == vote.user_id)
        {
            return Err(GatewayError::Conflict(format!(
                "user {} already voted on post {}",
                vote.user_id, vote.post_id
            )));
        }

        let row = Vote {
            id: tables.next_id(),
            post_id: vote.post_id,
            user_id: vote.user_id,
            value: vote.value,
        };
        tables.votes.push(row);
        Ok(())
    }

    async fn update_vote(&self, id: VoteId, value: VoteValue) -> Result<(), GatewayError> {
        let mut tables = self.tables.lock().await;
        match tables.votes.iter_mut().find(|v| v.id == id) {
            Some(vote) => {
                vote.value = value;
                Ok(())
            }
            None => Err(GatewayError::Conflict(format!("vote {id} no longer exists"))),
        }
    }

    async fn delete_vote(&self, id: VoteId) -> Result<(), GatewayError> {
        self.tables.lock().await.votes.retain(|v| v.id != id);
        Ok(())
    }

    async fn query_posts_with_counts(&self) -> Result<Vec<PostWithCounts>, GatewayError> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<PostWithCounts> = tables
            .posts
            .iter()
            .map(|p| PostWithCounts {
                id: p.id,
                title: p.title.clone(),
                content: p.content.clone(),
                created_at: p.created_at,
                image_url: p.image_url.clone(),
                avatar_url: p.avatar_url.clone(),
                like_count: tables
                    .votes
                    .iter()
                    .filter(|v| v.post_id == p.id && v.value == VoteValue::Like)
                    .count() as i64,
                comment_count: tables.comments.iter().filter(|c| c.post_id == p.id).count()
                    as i64,
            })
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn query_post(&self, post_id: PostId) -> Result<Post, GatewayError> {
        self.tables
            .lock()
            .await
            .posts
            .iter()
            .find(|p| p.id == post_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("post {post_id}")))
    }

    async fn query_community_posts(
        &self,
        community_id: CommunityId,
    ) -> Result<Vec<Post>, GatewayError> {
        let tables = self.tables.lock().await;
        let mut posts: Vec<Post> = tables
            .posts
            .iter()
            .filter(|p| p.community_id == Some(community_id))
            .cloned()
            .collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(posts)
    }

    async fn resolve_session(&self, token: &str) -> Result<Option<Identity>, GatewayError> {
        Ok(self.tables.lock().await.sessions.get(token).cloned())
    }
}
