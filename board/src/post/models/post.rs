use chrono::{DateTime, Utc};
use diesel::{
    prelude::*,
    sql_types::{BigInt, Nullable, Text, Timestamptz},
};
use serde::{Deserialize, Serialize};

use super::{CommunityId, PostId};

#[derive(Queryable, Selectable, Debug, Serialize, Deserialize, Clone, PartialEq)]
#[diesel(table_name = crate::schema::posts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Post {
    pub id: PostId,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub image_url: String,
    pub avatar_url: Option<String>,
    pub community_id: Option<CommunityId>,
}

/// A listing row as pre-aggregated by the store. The counts are never
/// recomputed on our side.
#[derive(QueryableByName, Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PostWithCounts {
    #[diesel(sql_type = BigInt)]
    pub id: PostId,
    #[diesel(sql_type = Text)]
    pub title: String,
    #[diesel(sql_type = Text)]
    pub content: String,
    #[diesel(sql_type = Timestamptz)]
    pub created_at: DateTime<Utc>,
    #[diesel(sql_type = Text)]
    pub image_url: String,
    #[diesel(sql_type = Nullable<Text>)]
    #[serde(alias = "user_avatar_url")]
    pub avatar_url: Option<String>,
    #[diesel(sql_type = BigInt)]
    #[serde(default)]
    pub like_count: i64,
    #[diesel(sql_type = BigInt)]
    #[serde(default)]
    pub comment_count: i64,
}
