use async_trait::async_trait;
use chrono::{DateTime, Utc};
use remit_core::{AccountType, Tenant, TenantId, TenantStatus};
use sqlx::PgPool;
use uuid::Uuid;

use super::{single_default, TenantDirectory, TenantError};
use crate::dsn::tenant_dsn;

const TENANT_COLUMNS: &str = "id, name, status, is_default, distribution_account_type, \
     distribution_account_address, created_at, updated_at, deleted_at";

/// A row from the admin `tenants` table.
#[derive(Debug, Clone, sqlx::FromRow)]
struct TenantRow {
    id: Uuid,
    name: String,
    status: String,
    is_default: bool,
    distribution_account_type: Option<String>,
    distribution_account_address: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<TenantRow> for Tenant {
    type Error = TenantError;

    fn try_from(row: TenantRow) -> Result<Self, Self::Error> {
        let invalid = |source| TenantError::InvalidRecord {
            id: row.id.to_string(),
            source,
        };
        let status = row.status.parse::<TenantStatus>().map_err(invalid)?;
        let distribution_account_type = row
            .distribution_account_type
            .as_deref()
            .map(str::parse::<AccountType>)
            .transpose()
            .map_err(invalid)?;

        Ok(Tenant {
            id: TenantId::from_uuid(row.id),
            name: row.name,
            status,
            is_default: row.is_default,
            distribution_account_type,
            distribution_account_address: row.distribution_account_address,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

/// Tenant directory backed by the admin database.
#[derive(Debug, Clone)]
pub struct PgTenantDirectory {
    pool: PgPool,
    base_dsn: String,
}

impl PgTenantDirectory {
    /// `base_dsn` is the admin database URL; tenant DSNs are derived from it.
    #[must_use]
    pub fn new(pool: PgPool, base_dsn: impl Into<String>) -> Self {
        Self {
            pool,
            base_dsn: base_dsn.into(),
        }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TenantDirectory for PgTenantDirectory {
    async fn list_active_tenants(&self) -> Result<Vec<Tenant>, TenantError> {
        let rows = sqlx::query_as::<_, TenantRow>(&format!(
            "SELECT {TENANT_COLUMNS} FROM tenants \
             WHERE status <> 'TENANT_DEACTIVATED' AND deleted_at IS NULL \
             ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Tenant::try_from).collect()
    }

    async fn get_tenant_by_id(&self, id: TenantId) -> Result<Tenant, TenantError> {
        let row = sqlx::query_as::<_, TenantRow>(&format!(
            "SELECT {TENANT_COLUMNS} FROM tenants \
             WHERE id = $1 AND status <> 'TENANT_DEACTIVATED' AND deleted_at IS NULL"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| TenantError::NotFound(id.to_string()))
            .and_then(Tenant::try_from)
    }

    async fn get_tenant_by_name(&self, name: &str) -> Result<Tenant, TenantError> {
        let row = sqlx::query_as::<_, TenantRow>(&format!(
            "SELECT {TENANT_COLUMNS} FROM tenants \
             WHERE name = $1 AND status <> 'TENANT_DEACTIVATED' AND deleted_at IS NULL"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| TenantError::NotFound(name.to_string()))
            .and_then(Tenant::try_from)
    }

    async fn get_default(&self) -> Result<Tenant, TenantError> {
        let rows = sqlx::query_as::<_, TenantRow>(&format!(
            "SELECT {TENANT_COLUMNS} FROM tenants WHERE is_default = true"
        ))
        .fetch_all(&self.pool)
        .await?;

        let defaults = rows
            .into_iter()
            .map(Tenant::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        single_default(defaults)
    }

    async fn connection_string_for(&self, tenant: &Tenant) -> Result<String, TenantError> {
        let schema = tenant
            .schema_name()
            .map_err(|source| TenantError::InvalidRecord {
                id: tenant.id.to_string(),
                source,
            })?;
        Ok(tenant_dsn(&self.base_dsn, &schema)?)
    }
}
