use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use crate::db::{Database, User};
use crate::session::{self, SessionStore};
use crate::store::StoreError;

/// Explicit authentication lifecycle: anonymous, then authenticated with
/// an identity, then anonymous again after logout.
#[derive(Debug, Clone, Default)]
pub enum AuthContext {
    #[default]
    Anonymous,
    Authenticated(User),
}

impl AuthContext {
    pub fn user(&self) -> Option<&User> {
        match self {
            AuthContext::Anonymous => None,
            AuthContext::Authenticated(user) => Some(user),
        }
    }
}

/// Validates credentials against the data access layer and owns the
/// session cache plus the in-memory identity.
pub struct AuthService {
    db: Database,
    sessions: Arc<dyn SessionStore>,
    context: RwLock<AuthContext>,
}

impl AuthService {
    /// Reads the session cache once so a previously logged-in identity
    /// survives a restart.
    pub fn bootstrap(db: Database, sessions: Arc<dyn SessionStore>) -> Self {
        let context = match session::load(sessions.as_ref()) {
            Some(user) => {
                info!(username = %user.username, "session restored");
                AuthContext::Authenticated(user)
            }
            None => AuthContext::Anonymous,
        };
        Self {
            db,
            sessions,
            context: RwLock::new(context),
        }
    }

    /// Succeeds iff a record matches the lowercased, trimmed username and
    /// its password field equals the input exactly. Unknown username or a
    /// mismatch is a normal `Ok(None)`, not an error; only transport
    /// failure is returned as `Err`.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, StoreError> {
        let normalized = username.trim().to_lowercase();
        let Some(user) = self.db.find_user_by_username(&normalized).await? else {
            warn!(username = %normalized, "login: unknown username");
            return Ok(None);
        };

        // Plaintext comparison against the stored password field.
        if user.password != password {
            warn!(username = %normalized, "login: password mismatch");
            return Ok(None);
        }

        session::save(self.sessions.as_ref(), &user);
        *self.context.write().unwrap() = AuthContext::Authenticated(user.clone());
        info!(user_id = %user.id, username = %user.username, "user logged in");
        Ok(Some(user))
    }

    /// Clears the persisted session and the in-memory identity.
    pub fn logout(&self) {
        session::clear(self.sessions.as_ref());
        *self.context.write().unwrap() = AuthContext::Anonymous;
        info!("user logged out");
    }

    pub fn current(&self) -> Option<User> {
        self.context.read().unwrap().user().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NewUser, Role};
    use crate::session::MemorySessionStore;
    use crate::store::memory::MemoryStore;

    async fn service_with_user(username: &str, password: &str) -> AuthService {
        let db = Database::new(Arc::new(MemoryStore::new()));
        db.add_user(NewUser {
            username: username.to_string(),
            password: password.to_string(),
            role: Role::Engineer,
            name: "Test".to_string(),
            email: "test@example.com".to_string(),
        })
        .await
        .expect("seed user");
        AuthService::bootstrap(db, Arc::new(MemorySessionStore::default()))
    }

    #[tokio::test]
    async fn login_succeeds_with_exact_password() {
        let auth = service_with_user("jdoe", "secret").await;
        let user = auth.login("jdoe", "secret").await.expect("no transport error");
        assert!(user.is_some());
        assert_eq!(auth.current().expect("authenticated").username, "jdoe");
    }

    #[tokio::test]
    async fn login_normalizes_username_but_not_password() {
        let auth = service_with_user("jdoe", "secret").await;

        // Case and whitespace on the username side must not matter.
        assert!(auth
            .login("  JDoe ", "secret")
            .await
            .expect("no transport error")
            .is_some());

        // The password is compared exactly.
        assert!(auth
            .login("jdoe", "SECRET")
            .await
            .expect("no transport error")
            .is_none());
        assert!(auth
            .login("jdoe", " secret")
            .await
            .expect("no transport error")
            .is_none());
    }

    #[tokio::test]
    async fn unknown_username_is_no_match_not_error() {
        let auth = service_with_user("jdoe", "secret").await;
        let result = auth.login("nobody", "secret").await.expect("ok result");
        assert!(result.is_none());
        assert!(auth.current().is_none());
    }

    #[tokio::test]
    async fn logout_clears_session_and_context() {
        let db = Database::new(Arc::new(MemoryStore::new()));
        db.add_user(NewUser {
            username: "jdoe".to_string(),
            password: "x".to_string(),
            role: Role::Admin,
            name: "T".to_string(),
            email: "t@example.com".to_string(),
        })
        .await
        .expect("seed user");
        let sessions = Arc::new(MemorySessionStore::default());
        let auth = AuthService::bootstrap(db, sessions.clone());

        auth.login("jdoe", "x").await.expect("login").expect("match");
        assert!(sessions.get().is_some());

        auth.logout();
        assert!(auth.current().is_none());
        assert!(sessions.get().is_none());
    }

    #[tokio::test]
    async fn bootstrap_restores_persisted_identity() {
        let db = Database::new(Arc::new(MemoryStore::new()));
        db.add_user(NewUser {
            username: "jdoe".to_string(),
            password: "x".to_string(),
            role: Role::Engineer,
            name: "T".to_string(),
            email: "t@example.com".to_string(),
        })
        .await
        .expect("seed user");
        let sessions = Arc::new(MemorySessionStore::default());

        let first = AuthService::bootstrap(db.clone(), sessions.clone());
        first.login("jdoe", "x").await.expect("login").expect("match");

        // Simulate a restart on the same device.
        let second = AuthService::bootstrap(db, sessions);
        assert_eq!(second.current().expect("restored").username, "jdoe");
    }
}
