use std::sync::Arc;

use crate::auth::AuthService;
use crate::config::AppConfig;
use crate::db::Database;
use crate::session::{FileSessionStore, MemorySessionStore, SessionStore};
use crate::store::memory::MemoryStore;
use crate::store::DocumentStore;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub auth: Arc<AuthService>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store = Arc::new(MemoryStore::new()) as Arc<dyn DocumentStore>;
        let db = Database::new(store);

        let sessions =
            Arc::new(FileSessionStore::new(config.session_file.clone())) as Arc<dyn SessionStore>;
        let auth = Arc::new(AuthService::bootstrap(db.clone(), sessions));

        Ok(Self { db, auth, config })
    }

    /// Fully in-memory wiring for tests.
    pub fn fake() -> Self {
        let config = Arc::new(AppConfig {
            session_file: std::env::temp_dir().join("helpdesk_test_session.json"),
            host: "127.0.0.1".into(),
            port: 0,
        });
        let db = Database::new(Arc::new(MemoryStore::new()));
        let sessions = Arc::new(MemorySessionStore::default()) as Arc<dyn SessionStore>;
        let auth = Arc::new(AuthService::bootstrap(db.clone(), sessions));
        Self { db, auth, config }
    }
}
