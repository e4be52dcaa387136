use serde_json::{json, Map};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{Database, NewUser, User};
use crate::store::StoreError;
use crate::users::dto::UpdateUserRequest;

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("username '{0}' is already taken")]
    DuplicateUsername(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Create an account. The username becomes the lookup key, so it is
/// normalized to lowercase before the duplicate pre-check. The check and
/// the insert are two separate remote calls, not a transaction; the
/// resulting race window is accepted at this write volume.
pub async fn create(db: &Database, mut new: NewUser) -> Result<User, UserError> {
    new.username = new.username.trim().to_lowercase();

    if db.find_user_by_username(&new.username).await?.is_some() {
        warn!(username = %new.username, "duplicate username rejected");
        return Err(UserError::DuplicateUsername(new.username));
    }

    let user = db.add_user(new).await?;
    info!(user_id = %user.id, username = %user.username, "user created");
    Ok(user)
}

/// Arbitrary partial update, including role and plaintext password.
/// Fields left out of the request stay untouched.
pub async fn update(db: &Database, id: Uuid, changes: UpdateUserRequest) -> Result<(), StoreError> {
    let mut fields = Map::new();
    if let Some(password) = changes.password {
        fields.insert("password".to_string(), json!(password));
    }
    if let Some(role) = changes.role {
        fields.insert("role".to_string(), json!(role));
    }
    if let Some(name) = changes.name {
        fields.insert("name".to_string(), json!(name));
    }
    if let Some(email) = changes.email {
        fields.insert("email".to_string(), json!(email));
    }
    if fields.is_empty() {
        return Ok(());
    }
    db.update_user(id, fields).await
}

/// Hard delete. Nothing here protects the built-in admin account; the
/// client hides that control, a gap inherited from the source system.
pub async fn delete(db: &Database, id: Uuid) -> Result<(), StoreError> {
    db.delete_user(id).await?;
    info!(user_id = %id, "user deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Role;
    use crate::store::memory::MemoryStore;
    use std::sync::Arc;

    fn test_db() -> Database {
        Database::new(Arc::new(MemoryStore::new()))
    }

    fn new_user(username: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            password: "x".to_string(),
            role: Role::Engineer,
            name: "Test".to_string(),
            email: "test@example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn duplicate_username_rejected_before_insert() {
        let db = test_db();
        create(&db, new_user("jdoe")).await.expect("first create");

        let err = create(&db, new_user("jdoe")).await.unwrap_err();
        assert!(matches!(err, UserError::DuplicateUsername(_)));

        // The pre-check fired before any insert call was made.
        assert_eq!(db.list_users().await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn username_is_normalized_for_the_lookup_key() {
        let db = test_db();
        let created = create(&db, new_user("  JDoe ")).await.expect("create");
        assert_eq!(created.username, "jdoe");

        let err = create(&db, new_user("JDOE")).await.unwrap_err();
        assert!(matches!(err, UserError::DuplicateUsername(_)));
    }

    #[tokio::test]
    async fn update_merges_only_given_fields() {
        let db = test_db();
        let user = create(&db, new_user("jdoe")).await.expect("create");

        update(
            &db,
            user.id,
            UpdateUserRequest {
                role: Some(Role::Admin),
                password: Some("newpass".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("update");

        let users = db.list_users().await.expect("list");
        assert_eq!(users[0].role, Role::Admin);
        assert_eq!(users[0].password, "newpass");
        // Untouched fields survive.
        assert_eq!(users[0].email, "test@example.com");
    }

    #[tokio::test]
    async fn delete_is_a_hard_delete() {
        let db = test_db();
        let user = create(&db, new_user("temp")).await.expect("create");
        delete(&db, user.id).await.expect("delete");
        assert!(db.list_users().await.expect("list").is_empty());
    }
}
