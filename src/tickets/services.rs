use serde_json::{json, Map};
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::db::{Closure, Database, Priority, Ticket, TicketStatus};
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum TicketError {
    #[error("solution and recommendation are required to close a ticket")]
    MissingResolution,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Open a new ticket. Status, soft-delete flag and creation timestamp
/// are set by the data access layer.
pub async fn create(
    db: &Database,
    title: &str,
    description: &str,
    priority: Priority,
    author: &str,
) -> Result<Ticket, StoreError> {
    let ticket = db.add_ticket(title, description, priority, author).await?;
    info!(ticket_id = %ticket.id, %author, "ticket opened");
    Ok(ticket)
}

/// Transition open -> closed, stamping the resolution. Both text fields
/// are mandatory; blank input (after trimming) is rejected before any
/// write is issued.
pub async fn close(
    db: &Database,
    id: Uuid,
    solution: &str,
    recommendation: &str,
    closed_by: &str,
) -> Result<(), TicketError> {
    let solution = solution.trim();
    let recommendation = recommendation.trim();
    if solution.is_empty() || recommendation.is_empty() {
        return Err(TicketError::MissingResolution);
    }

    let mut fields = Map::new();
    fields.insert("status".to_string(), json!(TicketStatus::Closed));
    fields.insert(
        "closure".to_string(),
        json!(Closure {
            solution: solution.to_string(),
            recommendation: recommendation.to_string(),
            closed_at: OffsetDateTime::now_utc(),
            closed_by: closed_by.to_string(),
        }),
    );
    db.update_ticket(id, fields).await?;
    info!(ticket_id = %id, %closed_by, "ticket closed");
    Ok(())
}

/// Edit title, description and priority. Allowed in any status; never
/// touches the status or closure fields.
pub async fn edit(
    db: &Database,
    id: Uuid,
    title: &str,
    description: &str,
    priority: Priority,
) -> Result<(), StoreError> {
    let mut fields = Map::new();
    fields.insert("title".to_string(), json!(title));
    fields.insert("description".to_string(), json!(description));
    fields.insert("priority".to_string(), json!(priority));
    db.update_ticket(id, fields).await
}

/// Soft delete: terminal for visibility, no undelete operation exposed.
pub async fn soft_delete(db: &Database, id: Uuid) -> Result<(), StoreError> {
    db.soft_delete_ticket(id).await?;
    info!(ticket_id = %id, "ticket soft-deleted");
    Ok(())
}
