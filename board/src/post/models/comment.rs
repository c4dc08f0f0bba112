use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::PostId;

pub type CommentId = i64;

// The model that maps to the database table
#[derive(Queryable, Selectable, Debug, Serialize, Deserialize, Clone, PartialEq)]
#[diesel(table_name = crate::schema::comments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub parent_comment_id: Option<CommentId>,
    pub content: String,
    #[diesel(column_name = user_id)]
    #[serde(rename = "user_id")]
    pub author_id: Uuid,
    #[diesel(column_name = author)]
    #[serde(rename = "author")]
    pub author_display_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Serialize, Debug, Clone)]
#[diesel(table_name = crate::schema::comments)]
pub struct NewComment {
    pub post_id: PostId,
    pub parent_comment_id: Option<CommentId>,
    pub content: String,
    #[diesel(column_name = user_id)]
    #[serde(rename = "user_id")]
    pub author_id: Uuid,
    #[diesel(column_name = author)]
    #[serde(rename = "author")]
    pub author_display_name: String,
}
