use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post, put},
    Json, Router,
};
use futures_util::stream::Stream;
use tokio::sync::mpsc;
use tracing::{error, instrument};
use uuid::Uuid;

use crate::{
    db::{NewUser, User},
    state::AppState,
    store::StoreError,
    users::{
        dto::UpdateUserRequest,
        services::{self, UserError},
    },
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/stream", get(stream_users))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(create_user))
        .route("/users/:id", put(update_user).delete(delete_user))
}

fn store_error(e: StoreError) -> (StatusCode, String) {
    match e {
        StoreError::NotFound { .. } => (StatusCode::NOT_FOUND, "User not found".into()),
        other => {
            error!(error = %other, "user operation failed");
            (StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

/// Full account records, plaintext passwords included: the admin screen
/// reads and edits them directly. Role gating happens client-side only,
/// a trust-boundary gap carried over from the source system.
#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
) -> Result<Json<Vec<User>>, (StatusCode, String)> {
    let users = state.db.users_snapshot().await.map_err(store_error)?;
    Ok(Json(users))
}

#[instrument(skip(state))]
pub async fn stream_users(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::unbounded_channel();
    let guard = state.db.subscribe_users(move |snapshot| {
        let _ = tx.send(snapshot);
    });

    let stream = futures_util::stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let snapshot = rx.recv().await?;
        let event = Event::default().json_data(&snapshot).ok()?;
        Some((Ok::<Event, Infallible>(event), (rx, guard)))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<NewUser>,
) -> Result<(StatusCode, HeaderMap, Json<User>), (StatusCode, String)> {
    match services::create(&state.db, payload).await {
        Ok(user) => {
            let mut headers = HeaderMap::new();
            if let Ok(location) = format!("/users/{}", user.id).parse() {
                headers.insert(axum::http::header::LOCATION, location);
            }
            Ok((StatusCode::CREATED, headers, Json(user)))
        }
        Err(UserError::DuplicateUsername(username)) => Err((
            StatusCode::CONFLICT,
            format!("Username '{username}' already exists"),
        )),
        Err(UserError::Store(e)) => Err(store_error(e)),
    }
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    services::update(&state.db, id, payload)
        .await
        .map_err(store_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    services::delete(&state.db, id)
        .await
        .map_err(store_error)?;
    Ok(StatusCode::NO_CONTENT)
}
