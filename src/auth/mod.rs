use crate::state::AppState;
use axum::Router;

pub mod claims;
pub mod extractors;
pub mod handlers;
pub mod jwt;
pub(crate) mod services;

pub fn router() -> Router<AppState> {
    handlers::auth_routes()
}
