use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::PostId;

pub type VoteId = i64;

/// A vote direction. Absence of a vote row is the neutral state, so there is
/// no zero variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum VoteValue {
    Like,
    Dislike,
}

#[derive(thiserror::Error, Debug)]
#[error("invalid vote value `{0}`, expected 1 or -1")]
pub struct InvalidVoteValue(pub i32);

impl TryFrom<i32> for VoteValue {
    type Error = InvalidVoteValue;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(VoteValue::Like),
            -1 => Ok(VoteValue::Dislike),
            other => Err(InvalidVoteValue(other)),
        }
    }
}

impl From<VoteValue> for i32 {
    fn from(value: VoteValue) -> Self {
        match value {
            VoteValue::Like => 1,
            VoteValue::Dislike => -1,
        }
    }
}

#[derive(Queryable, Selectable, Debug, Serialize, Deserialize, Clone, PartialEq)]
#[diesel(table_name = crate::schema::votes)]
pub struct Vote {
    pub id: VoteId,
    pub post_id: PostId,
    pub user_id: Uuid,
    #[diesel(column_name = vote, deserialize_as = i32)]
    #[serde(rename = "vote")]
    pub value: VoteValue,
}

#[derive(Insertable, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::votes)]
pub struct NewVote {
    pub post_id: PostId,
    pub user_id: Uuid,
    #[diesel(column_name = vote, serialize_as = i32)]
    #[serde(rename = "vote")]
    pub value: VoteValue,
}
