use std::sync::Arc;

use axum::{Json, Router, routing::get};
use serde_json::{Value, json};

use config::ServerConfig;
use gateway::Gateway;
use views::Views;

pub mod config;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod json;
pub mod post;
pub mod schema;
pub mod views;

/// State shared by every request handler and the view refresh loop.
#[derive(Clone)]
pub struct App {
    pub config: Arc<ServerConfig>,
    pub gateway: Arc<dyn Gateway>,
    pub views: Arc<Views>,
}

impl App {
    pub fn new(config: ServerConfig, gateway: Arc<dyn Gateway>) -> Self {
        App {
            config: Arc::new(config),
            gateway,
            views: Arc::new(Views::default()),
        }
    }
}

pub fn router(app: App) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/posts", post::routes::route())
        .route(
            "/communities/{community_id}/posts",
            get(post::get::list_community_posts),
        )
        .with_state(app)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
