use axum::Router;

use crate::state::AppState;

pub mod codes;
mod dto;
pub mod handlers;
pub mod password;

/// Minimum accepted password length, registration and password change alike.
pub const MIN_PASSWORD_LEN: usize = 6;

pub fn router() -> Router<AppState> {
    handlers::auth_routes()
}
