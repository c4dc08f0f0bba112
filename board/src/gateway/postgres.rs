use std::time::Duration;

use async_trait::async_trait;
use diesel::{
    prelude::*,
    result::{DatabaseErrorKind, Error as DieselError},
};
use diesel_async::{
    AsyncPgConnection, RunQueryDsl,
    pooled_connection::{
        AsyncDieselConnectionManager,
        deadpool::{Object, Pool, PoolError},
    },
};
use uuid::Uuid;

use crate::{
    identity::Identity,
    post::models::{
        CommunityId, PostId,
        comment::{Comment, NewComment},
        post::{Post, PostWithCounts},
        vote::{NewVote, Vote, VoteId, VoteValue},
    },
    schema::{comments, posts, profiles, sessions, votes},
};

use super::{Gateway, GatewayError};

pub type DieselPool = Pool<AsyncPgConnection>;

/// Talks to the store's Postgres database directly. The `votes` table is
/// expected to carry a unique index on `(post_id, user_id)`.
pub struct PgGateway {
    pool: DieselPool,
}

impl From<DieselError> for GatewayError {
    fn from(e: DieselError) -> Self {
        match e {
            DieselError::NotFound => GatewayError::NotFound("row".into()),
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                GatewayError::Conflict(info.message().to_string())
            }
            DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, info) => {
                GatewayError::Transport(info.message().to_string())
            }
            DieselError::DeserializationError(e) => GatewayError::Malformed(e.to_string()),
            e => GatewayError::Rejected(e.to_string()),
        }
    }
}

impl From<PoolError> for GatewayError {
    fn from(e: PoolError) -> Self {
        GatewayError::Transport(e.to_string())
    }
}

const POSTS_WITH_COUNTS: &str = "
    SELECT
        p.id,
        p.title,
        p.content,
        p.created_at,
        p.image_url,
        p.avatar_url,
        (SELECT COUNT(*) FROM votes v
            WHERE v.post_id = p.id AND v.vote = 1) AS like_count,
        (SELECT COUNT(*) FROM comments c
            WHERE c.post_id = p.id) AS comment_count
    FROM posts p
    ORDER BY p.created_at DESC;
";

impl PgGateway {
    pub fn connect(
        database_url: &str,
        max_connections: usize,
        timeout: Duration,
    ) -> Result<Self, eyre::Error> {
        let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
        let pool = Pool::builder(manager)
            .max_size(max_connections)
            // timeouts need a runtime to be enforced
            .runtime(deadpool_runtime::Runtime::Tokio1)
            .wait_timeout(Some(timeout))
            .create_timeout(Some(timeout))
            .build()?;
        Ok(PgGateway { pool })
    }

    async fn conn(&self) -> Result<Object<AsyncPgConnection>, GatewayError> {
        Ok(self.pool.get().await?)
    }
}

#[async_trait]
impl Gateway for PgGateway {
    async fn query_comments(&self, post_id: PostId) -> Result<Vec<Comment>, GatewayError> {
        let mut conn = self.conn().await?;

        Ok(comments::table
            .filter(comments::post_id.eq(post_id))
            .order((comments::created_at.asc(), comments::id.asc()))
            .select(Comment::as_select())
            .load(&mut conn)
            .await?)
    }

    async fn query_votes(&self, post_id: PostId) -> Result<Vec<Vote>, GatewayError> {
        let mut conn = self.conn().await?;

        Ok(votes::table
            .filter(votes::post_id.eq(post_id))
            .select(Vote::as_select())
            .load(&mut conn)
            .await?)
    }

    async fn insert_comment(&self, comment: NewComment) -> Result<(), GatewayError> {
        let mut conn = self.conn().await?;

        diesel::insert_into(comments::table)
            .values(comment)
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn insert_vote(&self, vote: NewVote) -> Result<(), GatewayError> {
        let mut conn = self.conn().await?;

        diesel::insert_into(votes::table)
            .values(vote)
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn update_vote(&self, id: VoteId, value: VoteValue) -> Result<(), GatewayError> {
        let mut conn = self.conn().await?;

        let updated = diesel::update(votes::table.find(id))
            .set(votes::vote.eq(i32::from(value)))
            .execute(&mut conn)
            .await?;

        if updated == 0 {
            return Err(GatewayError::Conflict(format!("vote {id} no longer exists")));
        }
        Ok(())
    }

    async fn delete_vote(&self, id: VoteId) -> Result<(), GatewayError> {
        let mut conn = self.conn().await?;

        diesel::delete(votes::table.find(id))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn query_posts_with_counts(&self) -> Result<Vec<PostWithCounts>, GatewayError> {
        let mut conn = self.conn().await?;

        Ok(diesel::sql_query(POSTS_WITH_COUNTS)
            .load::<PostWithCounts>(&mut conn)
            .await?)
    }

    async fn query_post(&self, post_id: PostId) -> Result<Post, GatewayError> {
        let mut conn = self.conn().await?;

        posts::table
            .find(post_id)
            .select(Post::as_select())
            .first(&mut conn)
            .await
            .optional()?
            .ok_or_else(|| GatewayError::NotFound(format!("post {post_id}")))
    }

    async fn query_community_posts(
        &self,
        community_id: CommunityId,
    ) -> Result<Vec<Post>, GatewayError> {
        let mut conn = self.conn().await?;

        Ok(posts::table
            .filter(posts::community_id.eq(community_id))
            .order((posts::created_at.desc(), posts::id.desc()))
            .select(Post::as_select())
            .load(&mut conn)
            .await?)
    }

    async fn resolve_session(&self, token: &str) -> Result<Option<Identity>, GatewayError> {
        let mut conn = self.conn().await?;

        let row = sessions::table
            .inner_join(profiles::table)
            .filter(sessions::token.eq(token))
            .filter(sessions::active.eq(true))
            .filter(sessions::expires_at.gt(diesel::dsl::now))
            .select((profiles::id, profiles::user_name, profiles::avatar_url))
            .first::<(Uuid, Option<String>, Option<String>)>(&mut conn)
            .await
            .optional()?;

        Ok(row.map(|(id, display_name, avatar_url)| Identity {
            id,
            display_name,
            avatar_url,
        }))
    }
}
