pub mod comment;
pub mod post;
pub mod vote;

pub type PostId = i64;
pub type CommunityId = i64;
