use std::sync::{Arc, Mutex};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Map, Value};
use time::OffsetDateTime;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::store::{Document, DocumentStore, StoreError};

pub const USERS: &str = "users";
pub const TICKETS: &str = "tickets";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Engineer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Open,
    Closed,
}

/// User account record. The password is stored and compared in plaintext,
/// matching the deployed data; a known weakness, not to be fixed silently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password: String,
    pub role: Role,
    pub name: String,
    pub email: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Fields for a new account; `created_at` and the id come from the layer
/// below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub role: Role,
    pub name: String,
    pub email: String,
}

/// Resolution data, present only once a ticket is closed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Closure {
    pub solution: String,
    pub recommendation: String,
    #[serde(with = "time::serde::rfc3339")]
    pub closed_at: OffsetDateTime,
    pub closed_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    /// Username of the creator; a denormalized copy, not a reference.
    pub author: String,
    pub status: TicketStatus,
    #[serde(default)]
    pub closure: Option<Closure>,
    pub deleted: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

fn to_fields<T: Serialize>(value: &T) -> Map<String, Value> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

fn from_doc<T: DeserializeOwned>(collection: &str, doc: Document) -> Result<T, StoreError> {
    let id = doc.id;
    let mut fields = doc.fields;
    fields.insert("id".to_string(), json!(id));
    serde_json::from_value(Value::Object(fields)).map_err(|source| StoreError::Decode {
        collection: collection.to_string(),
        id,
        source,
    })
}

/// Handle for a live subscription. `unsubscribe` is idempotent and safe
/// to call during teardown; dropping the guard unsubscribes as well.
pub struct SubscriptionGuard {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SubscriptionGuard {
    fn active(task: JoinHandle<()>) -> Self {
        Self {
            task: Mutex::new(Some(task)),
        }
    }

    /// Returned when registration fails, so callers can always pair
    /// subscribe/unsubscribe at scope boundaries.
    fn noop() -> Self {
        Self {
            task: Mutex::new(None),
        }
    }

    pub fn unsubscribe(&self) {
        if let Some(task) = self.task.lock().unwrap().take() {
            task.abort();
        }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Data access layer over the two collections. Owns the soft-delete and
/// ordering conventions; everything above it works with typed records.
#[derive(Clone)]
pub struct Database {
    store: Arc<dyn DocumentStore>,
}

impl Database {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Seed the default accounts when the users collection is empty.
    /// Probes with limit 1 only; a no-op once any user exists, so calling
    /// it on every login-screen visit is safe. The empty-check and the
    /// inserts are separate remote calls, so a concurrent first boot can
    /// race; accepted at this application's scale.
    pub async fn initialize_defaults(&self) -> Result<bool, StoreError> {
        let probe = self.store.list(USERS, Some(1)).await?;
        if !probe.is_empty() {
            return Ok(false);
        }

        info!("users collection empty, seeding default accounts");
        let defaults = [
            NewUser {
                username: "alejandro".to_string(),
                password: "lucy931205".to_string(),
                role: Role::Admin,
                name: "Alejandro".to_string(),
                email: "admin@elspecandina.com".to_string(),
            },
            NewUser {
                username: "user".to_string(),
                password: "user".to_string(),
                role: Role::Engineer,
                name: "Usuario Soporte".to_string(),
                email: "soporte@elspecandina.com".to_string(),
            },
        ];
        for account in defaults {
            self.add_user(account).await?;
        }
        Ok(true)
    }

    // --- users ---

    /// Lookup by username. The value must already be lowercased and
    /// trimmed by the caller.
    pub async fn find_user_by_username(
        &self,
        normalized: &str,
    ) -> Result<Option<User>, StoreError> {
        let doc = self.store.find_one(USERS, "username", normalized).await?;
        doc.map(|d| from_doc(USERS, d)).transpose()
    }

    pub async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let docs = self.store.list(USERS, None).await?;
        Ok(decode_all(USERS, docs))
    }

    pub async fn add_user(&self, new: NewUser) -> Result<User, StoreError> {
        let mut fields = to_fields(&new);
        fields.insert(
            "created_at".to_string(),
            json!(rfc3339(OffsetDateTime::now_utc())),
        );
        let doc = self.store.insert(USERS, fields).await?;
        debug!(user_id = %doc.id, username = %new.username, "user inserted");
        from_doc(USERS, doc)
    }

    /// Merge the given fields into a user record. Invariants are the
    /// caller's responsibility; this layer does not re-validate.
    pub async fn update_user(
        &self,
        id: Uuid,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError> {
        self.store.update(USERS, id, fields).await
    }

    /// Users are hard-deleted, unlike tickets.
    pub async fn delete_user(&self, id: Uuid) -> Result<(), StoreError> {
        self.store.delete(USERS, id).await
    }

    // --- tickets ---

    pub async fn add_ticket(
        &self,
        title: &str,
        description: &str,
        priority: Priority,
        author: &str,
    ) -> Result<Ticket, StoreError> {
        let mut fields = Map::new();
        fields.insert("title".to_string(), json!(title));
        fields.insert("description".to_string(), json!(description));
        fields.insert("priority".to_string(), json!(priority));
        fields.insert("author".to_string(), json!(author));
        fields.insert("status".to_string(), json!(TicketStatus::Open));
        fields.insert("deleted".to_string(), json!(false));
        fields.insert(
            "created_at".to_string(),
            json!(rfc3339(OffsetDateTime::now_utc())),
        );
        let doc = self.store.insert(TICKETS, fields).await?;
        debug!(ticket_id = %doc.id, %author, "ticket inserted");
        from_doc(TICKETS, doc)
    }

    pub async fn update_ticket(
        &self,
        id: Uuid,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError> {
        self.store.update(TICKETS, id, fields).await
    }

    /// Tickets are never hard-deleted: mark and stamp instead. Calling
    /// this twice leaves the same observable state.
    pub async fn soft_delete_ticket(&self, id: Uuid) -> Result<(), StoreError> {
        let mut fields = Map::new();
        fields.insert("deleted".to_string(), json!(true));
        fields.insert(
            "deleted_at".to_string(),
            json!(rfc3339(OffsetDateTime::now_utc())),
        );
        self.store.update(TICKETS, id, fields).await
    }

    /// Current listing view: soft-deleted tickets filtered out here as
    /// well, in case the underlying query is broader, and sorted by
    /// creation time, newest first.
    pub async fn tickets_snapshot(&self) -> Result<Vec<Ticket>, StoreError> {
        let docs = self.store.list(TICKETS, None).await?;
        let mut tickets: Vec<Ticket> = decode_all(TICKETS, docs)
            .into_iter()
            .filter(|t: &Ticket| !t.deleted)
            .collect();
        tickets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tickets)
    }

    pub async fn users_snapshot(&self) -> Result<Vec<User>, StoreError> {
        self.list_users().await
    }

    // --- live subscriptions ---

    /// Register a live listener on the ticket view. The callback receives
    /// the entire current snapshot on registration and again after every
    /// remote change; consumers never diff. Registration failures log and
    /// hand back a no-op guard instead of panicking.
    pub fn subscribe_tickets<F>(&self, callback: F) -> SubscriptionGuard
    where
        F: Fn(Vec<Ticket>) + Send + Sync + 'static,
    {
        let mut rx = match self.store.watch(TICKETS) {
            Ok(rx) => rx,
            Err(e) => {
                error!(error = %e, "ticket subscription failed, live view stays empty");
                return SubscriptionGuard::noop();
            }
        };
        let db = self.clone();
        let task = tokio::spawn(async move {
            loop {
                match db.tickets_snapshot().await {
                    Ok(snapshot) => callback(snapshot),
                    Err(e) => warn!(error = %e, "ticket snapshot fetch failed"),
                }
                match rx.recv().await {
                    Ok(()) => {}
                    // A lagged receiver just re-reads the latest snapshot.
                    Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                }
            }
        });
        SubscriptionGuard::active(task)
    }

    pub fn subscribe_users<F>(&self, callback: F) -> SubscriptionGuard
    where
        F: Fn(Vec<User>) + Send + Sync + 'static,
    {
        let mut rx = match self.store.watch(USERS) {
            Ok(rx) => rx,
            Err(e) => {
                error!(error = %e, "user subscription failed, live view stays empty");
                return SubscriptionGuard::noop();
            }
        };
        let db = self.clone();
        let task = tokio::spawn(async move {
            loop {
                match db.users_snapshot().await {
                    Ok(snapshot) => callback(snapshot),
                    Err(e) => warn!(error = %e, "user snapshot fetch failed"),
                }
                match rx.recv().await {
                    Ok(()) => {}
                    Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                }
            }
        });
        SubscriptionGuard::active(task)
    }
}

fn decode_all<T: DeserializeOwned>(collection: &str, docs: Vec<Document>) -> Vec<T> {
    docs.into_iter()
        .filter_map(|doc| match from_doc(collection, doc) {
            Ok(record) => Some(record),
            Err(e) => {
                // Malformed documents are skipped from listings rather
                // than failing the whole snapshot.
                warn!(error = %e, "skipping malformed document");
                None
            }
        })
        .collect()
}

fn rfc3339(ts: OffsetDateTime) -> String {
    ts.format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| ts.to_string())
}
