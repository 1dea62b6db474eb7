// Persistent-store availability and schema-version gating. The guard owns
// the one piece of mutable shared state in the process: the cached schema
// version and its serialized reload.
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Low-level store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("schema version marker missing or unreadable")]
    VersionUnreadable,

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Gate errors surfaced by the pipeline
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("store unavailable")]
    Unavailable,

    #[error("schema version below required minimum {minimum}")]
    VersionTooOld { minimum: u32 },

    #[error("schema reload failed: {0}")]
    Reload(#[from] StoreError),
}

/// Seam to the persistent store. The production implementation is Postgres;
/// tests substitute an in-memory stub.
#[async_trait]
pub trait SchemaStore: Send + Sync {
    /// Cheap reachability probe
    async fn ping(&self) -> Result<(), StoreError>;

    /// Schema version currently recorded in the store
    async fn current_version(&self) -> Result<u32, StoreError>;

    /// Drop all schema-derived caches and re-read them from the live store.
    /// Only called from inside the guard's serialized reload section.
    async fn refresh(&self) -> Result<(), StoreError>;
}

/// Connection pool from `DATABASE_URL` and the configured pool limits
pub async fn connect_pool() -> Result<PgPool, StoreError> {
    let url = std::env::var("DATABASE_URL").map_err(|_| StoreError::ConfigMissing("DATABASE_URL"))?;
    let config = crate::config::config();
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(config.database.connection_timeout))
        .connect(&url)
        .await?;
    info!("Connected to persistent store");
    Ok(pool)
}

/// Postgres-backed schema store. Caches the table/column map derived from
/// `information_schema`; `refresh` rebuilds it wholesale.
pub struct PgSchemaStore {
    pool: PgPool,
    tables: RwLock<HashMap<String, Vec<String>>>,
}

impl PgSchemaStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, tables: RwLock::new(HashMap::new()) }
    }

    /// Cached column list for a table, if the metadata cache holds it
    pub async fn table_columns(&self, table: &str) -> Option<Vec<String>> {
        self.tables.read().await.get(table).cloned()
    }

    async fn load_tables(&self) -> Result<HashMap<String, Vec<String>>, StoreError> {
        let rows = sqlx::query(
            "SELECT table_name, column_name FROM information_schema.columns \
             WHERE table_schema = 'public' ORDER BY table_name, ordinal_position",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut tables: HashMap<String, Vec<String>> = HashMap::new();
        for row in rows {
            let table: String = row.get("table_name");
            let column: String = row.get("column_name");
            tables.entry(table).or_default().push(column);
        }
        Ok(tables)
    }
}

#[async_trait]
impl SchemaStore for PgSchemaStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn current_version(&self) -> Result<u32, StoreError> {
        let row = sqlx::query("SELECT value FROM options WHERE key = 'schemaversion'")
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::VersionUnreadable)?;
        let value: String = row.get("value");
        value.parse().map_err(|_| StoreError::VersionUnreadable)
    }

    async fn refresh(&self) -> Result<(), StoreError> {
        let fresh = self.load_tables().await?;
        let mut tables = self.tables.write().await;
        *tables = fresh;
        Ok(())
    }
}

/// Guards endpoint execution behind store availability and schema version.
/// The cached version is read-mostly; the reload path is the single mutating
/// operation and runs under a mutex so no request observes a partial reload.
pub struct SchemaGuard {
    store: Arc<dyn SchemaStore>,
    cached_version: RwLock<u32>,
    reload_lock: Mutex<()>,
}

impl SchemaGuard {
    pub async fn new(store: Arc<dyn SchemaStore>) -> Result<Self, StoreError> {
        let version = store.current_version().await?;
        info!("Schema guard initialized at schema version {}", version);
        Ok(Self {
            store,
            cached_version: RwLock::new(version),
            reload_lock: Mutex::new(()),
        })
    }

    pub async fn version(&self) -> u32 {
        *self.cached_version.read().await
    }

    pub async fn ensure_available(&self) -> Result<(), SchemaError> {
        self.store.ping().await.map_err(|e| {
            warn!("Store unreachable: {}", e);
            SchemaError::Unavailable
        })
    }

    /// True when the store records a newer schema version than the cached
    /// one, i.e. a live migration has happened underneath us
    pub async fn require_reload(&self) -> bool {
        match self.store.current_version().await {
            Ok(live) => live != *self.cached_version.read().await,
            Err(e) => {
                debug!("Version probe failed, skipping reload check: {}", e);
                false
            }
        }
    }

    /// All-or-nothing reload of schema-derived state. Serialized: concurrent
    /// callers wait, then observe the no-op fast path. Returns the version
    /// in effect afterwards.
    pub async fn reload(&self) -> Result<u32, SchemaError> {
        let _serialized = self.reload_lock.lock().await;

        let live = self.store.current_version().await?;
        let cached = *self.cached_version.read().await;
        if live == cached {
            debug!("Schema reload requested but version {} is current - no-op", cached);
            return Ok(cached);
        }

        warn!("Database schema version update detected ({} -> {}) - reloading schema cache", cached, live);
        self.store.refresh().await?;
        *self.cached_version.write().await = live;
        Ok(live)
    }

    pub async fn ensure_version(&self, minimum: u32) -> Result<(), SchemaError> {
        if self.version().await < minimum {
            return Err(SchemaError::VersionTooOld { minimum });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    #[derive(Default)]
    struct StubStore {
        version: AtomicU32,
        refreshes: AtomicU32,
        offline: AtomicBool,
    }

    #[async_trait]
    impl SchemaStore for StubStore {
        async fn ping(&self) -> Result<(), StoreError> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(StoreError::VersionUnreadable);
            }
            Ok(())
        }

        async fn current_version(&self) -> Result<u32, StoreError> {
            Ok(self.version.load(Ordering::SeqCst))
        }

        async fn refresh(&self) -> Result<(), StoreError> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn version_gate() {
        let store = Arc::new(StubStore::default());
        store.version.store(90, Ordering::SeqCst);
        let guard = SchemaGuard::new(store).await.unwrap();

        assert!(guard.ensure_version(90).await.is_ok());
        let err = guard.ensure_version(93).await.unwrap_err();
        assert!(matches!(err, SchemaError::VersionTooOld { minimum: 93 }));
    }

    #[tokio::test]
    async fn reload_applies_pending_version_once() {
        let store = Arc::new(StubStore::default());
        store.version.store(1, Ordering::SeqCst);
        let guard = SchemaGuard::new(store.clone()).await.unwrap();

        store.version.store(2, Ordering::SeqCst);
        assert!(guard.require_reload().await);
        assert_eq!(guard.reload().await.unwrap(), 2);
        assert_eq!(store.refreshes.load(Ordering::SeqCst), 1);

        // Nothing pending: reload is an observable no-op
        assert!(!guard.require_reload().await);
        assert_eq!(guard.reload().await.unwrap(), 2);
        assert_eq!(store.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unavailable_store_detected() {
        let store = Arc::new(StubStore::default());
        let guard = SchemaGuard::new(store.clone()).await.unwrap();
        store.offline.store(true, Ordering::SeqCst);
        assert!(matches!(guard.ensure_available().await, Err(SchemaError::Unavailable)));
    }
}
