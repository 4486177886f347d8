//! Schema-and-connection context.
//!
//! A [`Store`] couples the connection pool with the validated
//! [`SchemaRegistry`]. It is constructed once at startup and cloned into every
//! consumer; there is no process-wide instance. Operations acquire a pooled
//! connection for their own duration and release it on return.

pub mod accounts;
pub mod departments;
pub mod employees;
mod error;
pub mod integrity;
pub mod introspect;
pub mod refresh_tokens;
pub mod requests;
pub mod retry;
pub mod workflows;

use std::sync::Arc;
use std::time::{Duration, Instant};

use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use diesel::PgConnection;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use error::{classify, ConnectionError, ReferentialError, StoreError, ValidationError};
pub use integrity::{DeleteReport, Related};
pub use retry::RetryPolicy;

use crate::config::DatabaseConfig;
use crate::registry::{self, Entity, LiveSchema, SchemaRegistry, SyncOptions, SyncPlan};
use crate::telemetry::metrics::{record_cascade_delete, record_store_operation};

pub type DbPool = r2d2::Pool<ConnectionManager<PgConnection>>;
pub type PooledConn = r2d2::PooledConnection<ConnectionManager<PgConnection>>;

#[derive(Clone)]
pub struct Store {
    pool: DbPool,
    registry: Arc<SchemaRegistry>,
}

impl Store {
    pub fn new(pool: DbPool, registry: SchemaRegistry) -> Self {
        Self {
            pool,
            registry: Arc::new(registry),
        }
    }

    /// Builds the pool. Only `min_connections` are opened eagerly, so with the
    /// default of zero this succeeds even while the database is down.
    pub fn connect(config: &DatabaseConfig, registry: SchemaRegistry) -> Result<Self, StoreError> {
        let manager = ConnectionManager::<PgConnection>::new(&config.url);
        let pool = r2d2::Pool::builder()
            .max_size(config.max_connections)
            .min_idle(Some(config.min_connections))
            .connection_timeout(Duration::from_secs(config.connection_timeout_secs))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_secs)))
            .build(manager)
            .map_err(|e| ConnectionError::Unavailable(e.to_string()))?;

        Ok(Self::new(pool, registry))
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn conn(&self) -> Result<PooledConn, StoreError> {
        self.pool.get().map_err(StoreError::from)
    }

    /// Runs `f` on a pooled connection, classifying any storage error.
    pub fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut PgConnection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.conn()?;
        f(&mut conn).map_err(|e| classify(&self.registry, e))
    }

    /// Runs `f` in one storage transaction: all of it applies or none of it.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&mut PgConnection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.with_conn(|conn| conn.transaction(f))
    }

    /// Moves a blocking store operation off the async runtime.
    pub async fn run<T, F>(&self, operation: &'static str, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Store) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        let start = Instant::now();

        let result = tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| StoreError::Internal(format!("store task failed: {}", e)))?;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        record_store_operation(operation, outcome, start.elapsed());

        result
    }

    /// [`Store::run`] wrapped in the caller's retry policy.
    pub async fn run_with_retry<T, F>(
        &self,
        policy: &RetryPolicy,
        operation: &'static str,
        f: F,
    ) -> Result<T, StoreError>
    where
        F: Fn(&Store) -> Result<T, StoreError> + Clone + Send + 'static,
        T: Send + 'static,
    {
        policy
            .run(operation, || self.run(operation, f.clone()))
            .await
    }

    pub fn ping(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            diesel::sql_query("SELECT 1").execute(conn)?;
            Ok(())
        })
    }

    /// Like [`Store::ping`], but gives up acquiring a connection after
    /// `timeout` instead of the pool-wide acquire timeout.
    pub fn ping_within(&self, timeout: Duration) -> Result<(), StoreError> {
        let mut conn = self.pool.get_timeout(timeout)?;
        diesel::sql_query("SELECT 1")
            .execute(&mut conn)
            .map_err(|e| classify(&self.registry, e.into()))?;
        Ok(())
    }

    pub fn live_schema(&self) -> Result<LiveSchema, StoreError> {
        self.with_conn(|conn| Ok(introspect::live_schema(conn)?))
    }

    /// Reconciles the live tables with the registry. Returns the plan that was
    /// applied; an empty plan means nothing changed.
    pub fn synchronize(&self, options: SyncOptions) -> Result<SyncPlan, StoreError> {
        let declared = &*self.registry;

        self.with_conn(|conn| {
            let live = introspect::live_schema(conn).map_err(|e| {
                StoreError::Sync(registry::SyncError::Introspection(e.to_string()))
            })?;
            let plan = registry::sync::plan(declared, &live, options)?;

            for retained in &plan.retained {
                warn!(column = %retained, "Keeping undeclared column");
            }

            if plan.is_empty() {
                debug!("Schema already synchronized");
                return Ok(plan);
            }

            conn.transaction::<_, StoreError, _>(|conn| {
                for action in &plan.actions {
                    let sql = action.to_sql();
                    debug!(sql = %sql, "Applying schema change");
                    diesel::sql_query(&sql).execute(conn).map_err(|e| {
                        StoreError::Sync(registry::SyncError::Statement {
                            sql: sql.clone(),
                            message: e.to_string(),
                        })
                    })?;
                }
                Ok(())
            })?;

            info!(
                changes = plan.actions.len(),
                destructive = options.destructive,
                "Schema synchronized"
            );
            Ok(plan)
        })
    }

    pub fn entity_id(&self, entity: Entity) -> Result<registry::EntityId, StoreError> {
        Ok(self.registry.require(entity.name())?)
    }

    /// Deletes one row and applies every delete policy it owns, atomically.
    pub fn delete(&self, entity: Entity, id: Uuid) -> Result<DeleteReport, StoreError> {
        let entity_id = self.entity_id(entity)?;
        let registry = &self.registry;

        let report = self.transaction(|conn| integrity::delete(conn, registry, entity_id, id))?;
        record_cascade_delete(entity.name(), report.removed_total());
        Ok(report)
    }

    /// Follows the relationship named `name` from one row.
    pub fn related(&self, entity: Entity, id: Uuid, name: &str) -> Result<Related, StoreError> {
        let entity_id = self.entity_id(entity)?;
        let registry = &self.registry;
        self.with_conn(|conn| integrity::related(conn, registry, entity_id, id, name))
    }

    /// Fails with a referential error unless `dependent.foreign_key = id`
    /// names an existing row.
    pub(crate) fn ensure_reference(
        &self,
        conn: &mut PgConnection,
        dependent: Entity,
        foreign_key: &str,
        id: Uuid,
    ) -> Result<(), StoreError> {
        let dependent = self.entity_id(dependent)?;
        integrity::ensure_reference(conn, &self.registry, dependent, foreign_key, id)
    }
}

/// Outcome of a list query: one page plus the total match count.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}

/// Current time in the representation stored in `TIMESTAMP` columns.
pub(crate) fn now() -> chrono::NaiveDateTime {
    chrono::Utc::now().naive_utc()
}
