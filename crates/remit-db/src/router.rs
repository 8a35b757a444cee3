//! Tenant-scoped data-source router.
//!
//! Owns one connection pool per tenant. Pools are opened lazily on first use
//! and live until [`DataSourceRouter::close_all`] runs at shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use remit_core::{JobContext, Tenant, TenantId};
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::tenants::{TenantDirectory, TenantError};
use crate::{connect_pool, DbError, PoolConfig};

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("no tenant in context")]
    NoTenantInContext,
    #[error("no data sources are available")]
    NoDataSourcesAvailable,
    #[error("data-source router is closed")]
    Closed,
    #[error("getting connection string for tenant {tenant_id}: {source}")]
    ConnectionString {
        tenant_id: TenantId,
        #[source]
        source: TenantError,
    },
    #[error("opening connection pool for tenant {tenant_id}: {source}")]
    Open {
        tenant_id: TenantId,
        #[source]
        source: DbError,
    },
}

/// Opens and closes the pools the router hands out.
#[async_trait]
pub trait PoolOpener: Send + Sync + 'static {
    type Pool: Send + Sync + 'static;

    async fn open(&self, dsn: &str) -> Result<Self::Pool, DbError>;

    async fn close(&self, pool: &Self::Pool);

    /// Cheap liveness check on an open pool.
    async fn ping(&self, pool: &Self::Pool) -> Result<(), DbError>;
}

/// Opens Postgres pools with the same [`PoolConfig`] for every tenant.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgPoolOpener {
    config: PoolConfig,
}

impl PgPoolOpener {
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PoolOpener for PgPoolOpener {
    type Pool = PgPool;

    async fn open(&self, dsn: &str) -> Result<PgPool, DbError> {
        Ok(connect_pool(dsn, self.config).await?)
    }

    async fn close(&self, pool: &PgPool) {
        pool.close().await;
    }

    async fn ping(&self, pool: &PgPool) -> Result<(), DbError> {
        Ok(crate::ping(pool).await?)
    }
}

pub type TenantPoolRouter = DataSourceRouter<PgPoolOpener>;

pub struct DataSourceRouter<O: PoolOpener> {
    pools: DashMap<TenantId, Arc<O::Pool>>,
    // Held only while a pool is being created, never while one is in use.
    create_lock: Mutex<()>,
    tenants: Arc<dyn TenantDirectory>,
    opener: O,
    closed: AtomicBool,
}

impl<O: PoolOpener> std::fmt::Debug for DataSourceRouter<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSourceRouter")
            .field("pools", &self.pools.len())
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl<O: PoolOpener> DataSourceRouter<O> {
    #[must_use]
    pub fn new(tenants: Arc<dyn TenantDirectory>, opener: O) -> Self {
        Self {
            pools: DashMap::new(),
            create_lock: Mutex::new(()),
            tenants,
            opener,
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the tenant's pool, opening it on first access.
    ///
    /// Concurrent first calls for the same tenant open exactly one pool. A
    /// failed open leaves nothing behind, so the next call tries again.
    ///
    /// # Errors
    ///
    /// [`RouterError::ConnectionString`] or [`RouterError::Open`] when the pool
    /// cannot be created, [`RouterError::Closed`] after shutdown.
    pub async fn get(&self, tenant: &Tenant) -> Result<Arc<O::Pool>, RouterError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RouterError::Closed);
        }
        if let Some(pool) = self.lookup(tenant.id) {
            return Ok(pool);
        }
        self.get_or_create(tenant).await
    }

    /// Pool for the tenant carried by `ctx`.
    ///
    /// # Errors
    ///
    /// [`RouterError::NoTenantInContext`] for host-level contexts, otherwise as
    /// [`DataSourceRouter::get`].
    pub async fn get_for_context(&self, ctx: &JobContext) -> Result<Arc<O::Pool>, RouterError> {
        let tenant = ctx.tenant().ok_or(RouterError::NoTenantInContext)?;
        self.get(tenant).await
    }

    /// Any one open pool, for work that needs a connection but no particular
    /// tenant.
    ///
    /// # Errors
    ///
    /// [`RouterError::NoDataSourcesAvailable`] when no pool has been opened.
    pub fn any_pool(&self) -> Result<Arc<O::Pool>, RouterError> {
        self.pools
            .iter()
            .next()
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(RouterError::NoDataSourcesAvailable)
    }

    /// Snapshot of every open pool. Pools opened while the snapshot is taken
    /// may or may not be included.
    #[must_use]
    pub fn all_pools(&self) -> Vec<(TenantId, Arc<O::Pool>)> {
        self.pools
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect()
    }

    /// Pings every pool in an [`all_pools`](Self::all_pools) snapshot and
    /// returns the ones that failed.
    pub async fn ping_all(&self) -> Vec<(TenantId, DbError)> {
        let mut failures = Vec::new();
        for (tenant_id, pool) in self.all_pools() {
            if let Err(e) = self.opener.ping(&pool).await {
                failures.push((tenant_id, e));
            }
        }
        failures
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Closes every pool exactly once and refuses further opens.
    ///
    /// Returns the number of pools closed. Calling it again closes nothing.
    pub async fn close_all(&self) -> usize {
        self.closed.store(true, Ordering::Release);
        // Wait out any creation already past the closed check.
        let _guard = self.create_lock.lock().await;

        let ids: Vec<TenantId> = self.pools.iter().map(|entry| *entry.key()).collect();
        let drained: Vec<(TenantId, Arc<O::Pool>)> = ids
            .into_iter()
            .filter_map(|id| self.pools.remove(&id))
            .collect();

        for (tenant_id, pool) in &drained {
            self.opener.close(pool).await;
            tracing::debug!(tenant_id = %tenant_id, "router: closed tenant pool");
        }
        tracing::info!(count = drained.len(), "router: all tenant pools closed");
        drained.len()
    }

    fn lookup(&self, tenant_id: TenantId) -> Option<Arc<O::Pool>> {
        self.pools
            .get(&tenant_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    async fn get_or_create(&self, tenant: &Tenant) -> Result<Arc<O::Pool>, RouterError> {
        let _guard = self.create_lock.lock().await;

        if self.closed.load(Ordering::Acquire) {
            return Err(RouterError::Closed);
        }
        // Another task may have created it while we waited for the lock.
        if let Some(pool) = self.lookup(tenant.id) {
            return Ok(pool);
        }

        let dsn = self
            .tenants
            .connection_string_for(tenant)
            .await
            .map_err(|source| RouterError::ConnectionString {
                tenant_id: tenant.id,
                source,
            })?;
        if dsn.trim().is_empty() {
            return Err(RouterError::ConnectionString {
                tenant_id: tenant.id,
                source: TenantError::Db(DbError::EmptyDsn),
            });
        }

        let pool = self
            .opener
            .open(&dsn)
            .await
            .map(Arc::new)
            .map_err(|source| RouterError::Open {
                tenant_id: tenant.id,
                source,
            })?;
        self.pools.insert(tenant.id, Arc::clone(&pool));

        tracing::info!(
            tenant_id = %tenant.id,
            tenant = %tenant.name,
            pools = self.pools.len(),
            "router: opened tenant pool"
        );
        Ok(pool)
    }
}
