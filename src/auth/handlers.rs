use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, instrument, warn};

use crate::{
    auth::dto::{LoginRequest, SessionUser},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/session", get(get_session))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<SessionUser>, (StatusCode, String)> {
    // The login screen re-checks the seed data on every visit; a no-op
    // once any account exists.
    if let Err(e) = state.db.initialize_defaults().await {
        warn!(error = %e, "default-account check failed, continuing");
    }

    match state.auth.login(&payload.username, &payload.password).await {
        Ok(Some(user)) => Ok(Json(SessionUser::from(user))),
        Ok(None) => Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into())),
        Err(e) => {
            error!(error = %e, "login failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Login error".into()))
        }
    }
}

#[instrument(skip(state))]
pub async fn logout(State(state): State<AppState>) -> StatusCode {
    state.auth.logout();
    StatusCode::NO_CONTENT
}

#[instrument(skip(state))]
pub async fn get_session(
    State(state): State<AppState>,
) -> Result<Json<SessionUser>, (StatusCode, String)> {
    match state.auth.current() {
        Some(user) => Ok(Json(SessionUser::from(user))),
        None => Err((StatusCode::UNAUTHORIZED, "Not logged in".into())),
    }
}
