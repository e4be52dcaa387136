use serde::Deserialize;

use crate::db::Priority;

/// Request body for opening a ticket. The author is the logged-in
/// identity, not part of the payload.
#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    pub title: String,
    pub description: String,
    pub priority: Priority,
}

/// Request body for closing a ticket with its resolution.
#[derive(Debug, Deserialize)]
pub struct CloseTicketRequest {
    pub solution: String,
    pub recommendation: String,
}

/// Request body for editing; only these three fields are editable, in
/// any status.
#[derive(Debug, Deserialize)]
pub struct EditTicketRequest {
    pub title: String,
    pub description: String,
    pub priority: Priority,
}

/// Optional view-layer restriction to one author's tickets. This is a
/// display filter, not access control: any caller can omit it.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub author: Option<String>,
}
