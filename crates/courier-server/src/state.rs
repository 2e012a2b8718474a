use std::sync::{Arc, Mutex, MutexGuard};

use courier_store::Database;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::hub::Hub;
use crate::messaging::MessageRouter;

/// One SQLite connection shared by every request task.
pub type SharedDatabase = Arc<Mutex<Database>>;

pub fn lock_db(db: &SharedDatabase) -> Result<MutexGuard<'_, Database>, ServerError> {
    db.lock()
        .map_err(|_| ServerError::Internal("database lock poisoned".into()))
}

/// Run synchronous store work on the blocking pool so a slow query never
/// stalls a runtime worker.
pub async fn run_blocking<F, T>(work: F) -> Result<T, ServerError>
where
    F: FnOnce() -> Result<T, ServerError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ServerError::Internal(format!("blocking task failed: {e}")))?
}

#[derive(Clone)]
pub struct AppState {
    pub db: SharedDatabase,
    pub hub: Arc<Hub>,
    pub router: Arc<MessageRouter>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Wire the hub into the router once; nothing is resolved globally.
    pub fn new(db: Database, config: ServerConfig) -> Self {
        let db: SharedDatabase = Arc::new(Mutex::new(db));
        let hub = Arc::new(Hub::new());
        let router = Arc::new(MessageRouter::new(db.clone(), hub.clone()));

        Self {
            db,
            hub,
            router,
            config: Arc::new(config),
        }
    }
}
