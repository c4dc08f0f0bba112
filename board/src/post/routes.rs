use axum::{Router, routing::get};

use crate::App;

use super::{
    comment::{create::create_comment, get::get_comments},
    get::{get_post, list_posts},
    vote::{cast::cast_vote, get::get_votes},
};

pub fn route() -> Router<App> {
    Router::<App>::new()
        .route("/", get(list_posts))
        .route("/{post_id}", get(get_post))
        .route("/{post_id}/comments", get(get_comments).post(create_comment))
        .route("/{post_id}/votes", get(get_votes).post(cast_vote))
}
