use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, de::DeserializeOwned};
use uuid::Uuid;

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

// Postgres unique_violation
const UNIQUE_VIOLATION: &str = "23505";

/// A hosted store exposing its tables over PostgREST, with the auth endpoint
/// next to it.
pub struct RestGateway {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

/// Error body returned by PostgREST
#[derive(Deserialize, Debug)]
struct StoreErrorBody {
    code: Option<String>,
    message: Option<String>,
}

#[derive(Deserialize, Debug)]
struct AuthUser {
    id: Uuid,
    email: Option<String>,
    #[serde(default)]
    user_metadata: UserMetadata,
}

#[derive(Deserialize, Debug, Default)]
struct UserMetadata {
    user_name: Option<String>,
    full_name: Option<String>,
    avatar_url: Option<String>,
}

impl From<AuthUser> for Identity {
    fn from(user: AuthUser) -> Self {
        Identity {
            id: user.id,
            display_name: user
                .user_metadata
                .user_name
                .or(user.user_metadata.full_name)
                .or(user.email),
            avatar_url: user.user_metadata.avatar_url,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            GatewayError::Malformed(e.to_string())
        } else if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
            GatewayError::Transport(e.to_string())
        } else {
            GatewayError::Rejected(e.to_string())
        }
    }
}

impl RestGateway {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(RestGateway {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn table(&self, method: Method, table: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/rest/v1/{}", self.base_url, table))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GatewayError> {
        let response = check(request.send().await?).await?;
        Ok(response.json().await?)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<(), GatewayError> {
        check(request.send().await?).await?;
        Ok(())
    }
}

async fn check(response: Response) -> Result<Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let parsed = serde_json::from_str::<StoreErrorBody>(&body).ok();
    let message = parsed
        .as_ref()
        .and_then(|b| b.message.clone())
        .unwrap_or(body);

    if status == StatusCode::CONFLICT
        || parsed.and_then(|b| b.code).as_deref() == Some(UNIQUE_VIOLATION)
    {
        return Err(GatewayError::Conflict(message));
    }

    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::BAD_GATEWAY
        || status == StatusCode::SERVICE_UNAVAILABLE
        || status == StatusCode::GATEWAY_TIMEOUT
    {
        return Err(GatewayError::Transport(format!("{status}: {message}")));
    }

    Err(GatewayError::Rejected(format!("{status}: {message}")))
}

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

#[async_trait]
impl Gateway for RestGateway {
    async fn query_comments(&self, post_id: PostId) -> Result<Vec<Comment>, GatewayError> {
        self.fetch(self.table(Method::GET, "comments").query(&[
            ("select", "*".to_string()),
            ("post_id", eq(post_id)),
            ("order", "created_at.asc,id.asc".to_string()),
        ]))
        .await
    }

    async fn query_votes(&self, post_id: PostId) -> Result<Vec<Vote>, GatewayError> {
        self.fetch(
            self.table(Method::GET, "votes")
                .query(&[("select", "*".to_string()), ("post_id", eq(post_id))]),
        )
        .await
    }

    async fn insert_comment(&self, comment: NewComment) -> Result<(), GatewayError> {
        self.execute(
            self.table(Method::POST, "comments")
                .header("Prefer", "return=minimal")
                .json(&comment),
        )
        .await
    }

    async fn insert_vote(&self, vote: NewVote) -> Result<(), GatewayError> {
        self.execute(
            self.table(Method::POST, "votes")
                .header("Prefer", "return=minimal")
                .json(&vote),
        )
        .await
    }

    async fn update_vote(&self, id: VoteId, value: VoteValue) -> Result<(), GatewayError> {
        let updated: Vec<Vote> = self
            .fetch(
                self.table(Method::PATCH, "votes")
                    .query(&[("id", eq(id))])
                    .header("Prefer", "return=representation")
                    .json(&serde_json::json!({ "vote": value })),
            )
            .await?;

        if updated.is_empty() {
            return Err(GatewayError::Conflict(format!("vote {id} no longer exists")));
        }
        Ok(())
    }

    async fn delete_vote(&self, id: VoteId) -> Result<(), GatewayError> {
        self.execute(
            self.table(Method::DELETE, "votes")
                .query(&[("id", eq(id))])
                .header("Prefer", "return=minimal"),
        )
        .await
    }

    async fn query_posts_with_counts(&self) -> Result<Vec<PostWithCounts>, GatewayError> {
        self.fetch(
            self.table(Method::POST, "rpc/get_posts_with_counts")
                .json(&serde_json::json!({})),
        )
        .await
    }

    async fn query_post(&self, post_id: PostId) -> Result<Post, GatewayError> {
        let mut posts: Vec<Post> = self
            .fetch(
                self.table(Method::GET, "posts")
                    .query(&[("select", "*".to_string()), ("id", eq(post_id))]),
            )
            .await?;

        if posts.is_empty() {
            return Err(GatewayError::NotFound(format!("post {post_id}")));
        }
        Ok(posts.swap_remove(0))
    }

    async fn query_community_posts(
        &self,
        community_id: CommunityId,
    ) -> Result<Vec<Post>, GatewayError> {
        self.fetch(self.table(Method::GET, "posts").query(&[
            ("select", "*".to_string()),
            ("community_id", eq(community_id)),
            ("order", "created_at.desc".to_string()),
        ]))
        .await
    }

    async fn resolve_session(&self, token: &str) -> Result<Option<Identity>, GatewayError> {
        let response = self
            .http
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.api_key)
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Ok(None);
        }

        let user: AuthUser = check(response).await?.json().await?;
        Ok(Some(user.into()))
    }
}
