use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
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
    db::{Ticket, User},
    state::AppState,
    store::StoreError,
    tickets::{
        dto::{CloseTicketRequest, CreateTicketRequest, EditTicketRequest, ListParams},
        services::{self, TicketError},
    },
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/tickets", get(list_tickets))
        .route("/tickets/stream", get(stream_tickets))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/tickets", post(create_ticket))
        .route("/tickets/:id", put(edit_ticket).delete(delete_ticket))
        .route("/tickets/:id/close", post(close_ticket))
}

fn current_user(state: &AppState) -> Result<User, (StatusCode, String)> {
    state
        .auth
        .current()
        .ok_or((StatusCode::UNAUTHORIZED, "Not logged in".into()))
}

fn store_error(e: StoreError) -> (StatusCode, String) {
    match e {
        StoreError::NotFound { .. } => (StatusCode::NOT_FOUND, "Ticket not found".into()),
        other => {
            error!(error = %other, "ticket operation failed");
            (StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

fn apply_author_filter(snapshot: Vec<Ticket>, author: Option<&str>) -> Vec<Ticket> {
    match author {
        Some(author) => snapshot.into_iter().filter(|t| t.author == author).collect(),
        None => snapshot,
    }
}

#[instrument(skip(state))]
pub async fn list_tickets(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Ticket>>, (StatusCode, String)> {
    let snapshot = state.db.tickets_snapshot().await.map_err(store_error)?;
    Ok(Json(apply_author_filter(snapshot, params.author.as_deref())))
}

/// Live view as server-sent events: one full snapshot per change,
/// newest-first, soft-deleted tickets excluded. Dropping the connection
/// tears the subscription down.
#[instrument(skip(state))]
pub async fn stream_tickets(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::unbounded_channel();
    let guard = state.db.subscribe_tickets(move |snapshot| {
        let _ = tx.send(snapshot);
    });

    let author = params.author;
    let stream = futures_util::stream::unfold(
        (rx, guard, author),
        |(mut rx, guard, author)| async move {
            let snapshot = rx.recv().await?;
            let visible = apply_author_filter(snapshot, author.as_deref());
            let event = Event::default().json_data(&visible).ok()?;
            Some((Ok::<Event, Infallible>(event), (rx, guard, author)))
        },
    );
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[instrument(skip(state, payload))]
pub async fn create_ticket(
    State(state): State<AppState>,
    Json(payload): Json<CreateTicketRequest>,
) -> Result<(StatusCode, HeaderMap, Json<Ticket>), (StatusCode, String)> {
    let user = current_user(&state)?;

    let ticket = services::create(
        &state.db,
        &payload.title,
        &payload.description,
        payload.priority,
        &user.username,
    )
    .await
    .map_err(store_error)?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = format!("/tickets/{}", ticket.id).parse() {
        headers.insert(axum::http::header::LOCATION, location);
    }
    Ok((StatusCode::CREATED, headers, Json(ticket)))
}

#[instrument(skip(state, payload))]
pub async fn edit_ticket(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<EditTicketRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    services::edit(
        &state.db,
        id,
        &payload.title,
        &payload.description,
        payload.priority,
    )
    .await
    .map_err(store_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, payload))]
pub async fn close_ticket(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CloseTicketRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    let user = current_user(&state)?;

    match services::close(
        &state.db,
        id,
        &payload.solution,
        &payload.recommendation,
        &user.username,
    )
    .await
    {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(TicketError::MissingResolution) => Err((
            StatusCode::BAD_REQUEST,
            "Solution and recommendation are required".into(),
        )),
        Err(TicketError::Store(e)) => Err(store_error(e)),
    }
}

#[instrument(skip(state))]
pub async fn delete_ticket(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    services::soft_delete(&state.db, id)
        .await
        .map_err(store_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Priority, TicketStatus};
    use time::OffsetDateTime;

    fn ticket(author: &str) -> Ticket {
        Ticket {
            id: Uuid::new_v4(),
            title: "t".to_string(),
            description: "d".to_string(),
            priority: Priority::Medium,
            author: author.to_string(),
            status: TicketStatus::Open,
            closure: None,
            deleted: false,
            deleted_at: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn create_requires_a_logged_in_author() {
        let state = AppState::fake();
        let err = create_ticket(
            State(state.clone()),
            Json(CreateTicketRequest {
                title: "t".to_string(),
                description: "d".to_string(),
                priority: Priority::Low,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::UNAUTHORIZED);

        state.db.initialize_defaults().await.expect("seed");
        state.auth.login("user", "user").await.expect("login").expect("match");

        let (status, _, Json(ticket)) = create_ticket(
            State(state.clone()),
            Json(CreateTicketRequest {
                title: "t".to_string(),
                description: "d".to_string(),
                priority: Priority::Low,
            }),
        )
        .await
        .expect("created");
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(ticket.author, "user");

        let Json(listed) = list_tickets(State(state), Query(ListParams::default()))
            .await
            .expect("list");
        assert_eq!(listed.len(), 1);
    }

    #[test]
    fn author_filter_is_view_layer_only() {
        let snapshot = vec![ticket("jdoe"), ticket("other"), ticket("jdoe")];

        let mine = apply_author_filter(snapshot.clone(), Some("jdoe"));
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|t| t.author == "jdoe"));

        // Without the filter, every ticket is visible to any caller.
        let all = apply_author_filter(snapshot, None);
        assert_eq!(all.len(), 3);
    }
}
