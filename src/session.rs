use std::path::PathBuf;
use std::sync::Mutex;

use tracing::{error, warn};

use crate::db::User;

/// Device-scoped key-value storage used only for the session cache.
pub trait SessionStore: Send + Sync {
    fn get(&self) -> Option<String>;
    fn set(&self, blob: &str);
    fn remove(&self);
}

/// Read the cached identity. A blob that fails to parse is deleted and
/// treated as no session.
pub fn load(store: &dyn SessionStore) -> Option<User> {
    let blob = store.get()?;
    match serde_json::from_str(&blob) {
        Ok(user) => Some(user),
        Err(e) => {
            warn!(error = %e, "corrupt session blob, clearing");
            store.remove();
            None
        }
    }
}

/// Persist the identity for bootstrap on next start. No expiry: the
/// session stays valid until explicitly cleared.
pub fn save(store: &dyn SessionStore, user: &User) {
    match serde_json::to_string(user) {
        Ok(blob) => store.set(&blob),
        Err(e) => error!(error = %e, "failed to serialize session"),
    }
}

pub fn clear(store: &dyn SessionStore) {
    store.remove();
}

/// Session cache backed by a single file on the local device.
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self) -> Option<String> {
        std::fs::read_to_string(&self.path).ok()
    }

    fn set(&self, blob: &str) {
        if let Err(e) = std::fs::write(&self.path, blob) {
            error!(error = %e, path = %self.path.display(), "failed to persist session");
        }
    }

    fn remove(&self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct MemorySessionStore {
    blob: Mutex<Option<String>>,
}

impl SessionStore for MemorySessionStore {
    fn get(&self) -> Option<String> {
        self.blob.lock().unwrap().clone()
    }

    fn set(&self, blob: &str) {
        *self.blob.lock().unwrap() = Some(blob.to_string());
    }

    fn remove(&self) {
        *self.blob.lock().unwrap() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Role;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "jdoe".to_string(),
            password: "x".to_string(),
            role: Role::Engineer,
            name: "John Doe".to_string(),
            email: "jdoe@example.com".to_string(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn save_and_load_roundtrip() {
        let store = MemorySessionStore::default();
        let user = sample_user();
        save(&store, &user);
        let loaded = load(&store).expect("session present");
        assert_eq!(loaded.id, user.id);
        assert_eq!(loaded.username, "jdoe");
    }

    #[test]
    fn corrupt_blob_is_cleared() {
        let store = MemorySessionStore::default();
        store.set("{not json");
        assert!(load(&store).is_none());
        // The bad value was deleted too.
        assert!(store.get().is_none());
    }

    #[test]
    fn clear_removes_session() {
        let store = MemorySessionStore::default();
        save(&store, &sample_user());
        clear(&store);
        assert!(load(&store).is_none());
    }

    #[test]
    fn file_store_survives_reload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("session.json");
        let user = sample_user();

        let store = FileSessionStore::new(path.clone());
        save(&store, &user);

        // A fresh store over the same path sees the identity.
        let reopened = FileSessionStore::new(path);
        let loaded = load(&reopened).expect("session present");
        assert_eq!(loaded.id, user.id);
    }

    #[test]
    fn file_store_missing_file_is_no_session() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileSessionStore::new(dir.path().join("absent.json"));
        assert!(load(&store).is_none());
        // Removing an absent file must not panic.
        store.remove();
    }
}
