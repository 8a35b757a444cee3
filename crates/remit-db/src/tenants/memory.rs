use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use remit_core::{Tenant, TenantId};

use super::{single_default, TenantDirectory, TenantError};
use crate::dsn::tenant_dsn;

/// In-memory tenant directory.
///
/// Intended for tests and local runs. Can be told to fail every call to
/// simulate an unreachable directory.
#[derive(Debug)]
pub struct InMemoryTenantDirectory {
    tenants: RwLock<HashMap<TenantId, Tenant>>,
    base_dsn: String,
    unavailable: AtomicBool,
    lookups: AtomicUsize,
}

impl Default for InMemoryTenantDirectory {
    fn default() -> Self {
        Self::new("postgres://localhost/remit")
    }
}

impl InMemoryTenantDirectory {
    #[must_use]
    pub fn new(base_dsn: impl Into<String>) -> Self {
        Self {
            tenants: RwLock::new(HashMap::new()),
            base_dsn: base_dsn.into(),
            unavailable: AtomicBool::new(false),
            lookups: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn with_tenants(tenants: impl IntoIterator<Item = Tenant>) -> Self {
        let directory = Self::default();
        for tenant in tenants {
            directory.upsert(tenant);
        }
        directory
    }

    /// Inserts or replaces a tenant record.
    pub fn upsert(&self, tenant: Tenant) {
        let mut tenants = self
            .tenants
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        tenants.insert(tenant.id, tenant);
    }

    /// Makes every subsequent call fail with [`TenantError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of directory calls served so far, failures included.
    #[must_use]
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn snapshot(&self) -> Result<Vec<Tenant>, TenantError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(TenantError::Unavailable(
                "in-memory directory switched off".to_string(),
            ));
        }
        let tenants = self
            .tenants
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut all: Vec<Tenant> = tenants.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }
}

#[async_trait]
impl TenantDirectory for InMemoryTenantDirectory {
    async fn list_active_tenants(&self) -> Result<Vec<Tenant>, TenantError> {
        Ok(self
            .snapshot()?
            .into_iter()
            .filter(Tenant::is_active)
            .collect())
    }

    async fn get_tenant_by_id(&self, id: TenantId) -> Result<Tenant, TenantError> {
        self.snapshot()?
            .into_iter()
            .find(|t| t.id == id && t.is_active())
            .ok_or_else(|| TenantError::NotFound(id.to_string()))
    }

    async fn get_tenant_by_name(&self, name: &str) -> Result<Tenant, TenantError> {
        self.snapshot()?
            .into_iter()
            .find(|t| t.name == name && t.is_active())
            .ok_or_else(|| TenantError::NotFound(name.to_string()))
    }

    async fn get_default(&self) -> Result<Tenant, TenantError> {
        let defaults = self
            .snapshot()?
            .into_iter()
            .filter(|t| t.is_default)
            .collect();
        single_default(defaults)
    }

    async fn connection_string_for(&self, tenant: &Tenant) -> Result<String, TenantError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(TenantError::Unavailable(
                "in-memory directory switched off".to_string(),
            ));
        }
        let schema = tenant
            .schema_name()
            .map_err(|source| TenantError::InvalidRecord {
                id: tenant.id.to_string(),
                source,
            })?;
        Ok(tenant_dsn(&self.base_dsn, &schema)?)
    }
}
