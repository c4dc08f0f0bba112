pub mod comment;
pub mod get;
pub mod models;
pub mod routes;
pub mod vote;
