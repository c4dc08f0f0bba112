pub mod cast;
pub mod get;
pub mod reconcile;
