use crate::state::AppState;
use axum::Router;

mod dto;
pub mod handlers;
pub mod services;

pub use services::{AuthContext, AuthService};

pub fn router() -> Router<AppState> {
    handlers::auth_routes()
}
