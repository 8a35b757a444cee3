use std::sync::Arc;

use async_trait::async_trait;
use remit_core::{is_ledger_public_key, AccountType, JobContext, TenantId};
use remit_db::{TenantDirectory, TenantError};
use thiserror::Error;

use crate::backend::BackendSelection;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no tenant in context")]
    NoTenantInContext,
    #[error("tenant {0} has no distribution account configured")]
    DistributionAccountMissing(TenantId),
    #[error("tenant {tenant_id} is configured with non-distribution account type {account_type}")]
    NotADistributionAccount {
        tenant_id: TenantId,
        account_type: AccountType,
    },
    #[error("invalid host distribution account: {0}")]
    InvalidHostAccount(String),
    #[error(transparent)]
    Tenant(#[from] TenantError),
}

/// Answers "which settlement backend does this execution use".
#[async_trait]
pub trait DistributionBackendResolver: Send + Sync {
    /// Backend of the tenant carried by `ctx`, read fresh from the directory.
    ///
    /// # Errors
    ///
    /// [`ResolveError::NoTenantInContext`] for host-level contexts. Never falls
    /// back to the host backend.
    async fn resolve_for_tenant(&self, ctx: &JobContext) -> Result<BackendSelection, ResolveError>;

    /// Process-wide backend used by host-level work.
    fn resolve_host_level(&self) -> BackendSelection;
}

/// Resolver backed by the tenant directory and the configured host account.
pub struct TenantBackendResolver {
    tenants: Arc<dyn TenantDirectory>,
    host: BackendSelection,
}

impl TenantBackendResolver {
    /// # Errors
    ///
    /// [`ResolveError::InvalidHostAccount`] when `host_address` is not a ledger
    /// public key.
    pub fn new(
        tenants: Arc<dyn TenantDirectory>,
        host_address: impl Into<String>,
    ) -> Result<Self, ResolveError> {
        let host_address = host_address.into();
        if !is_ledger_public_key(&host_address) {
            return Err(ResolveError::InvalidHostAccount(host_address));
        }
        Ok(Self {
            tenants,
            host: BackendSelection::new(AccountType::HostStellarEnv, host_address),
        })
    }
}

#[async_trait]
impl DistributionBackendResolver for TenantBackendResolver {
    async fn resolve_for_tenant(&self, ctx: &JobContext) -> Result<BackendSelection, ResolveError> {
        let tenant_id = ctx.tenant().ok_or(ResolveError::NoTenantInContext)?.id;

        // The context copy may be stale; administrators edit backend config.
        let tenant = self.tenants.get_tenant_by_id(tenant_id).await?;

        let account_type = tenant
            .distribution_account_type
            .ok_or(ResolveError::DistributionAccountMissing(tenant_id))?;
        if account_type == AccountType::HostStellarEnv {
            return Err(ResolveError::NotADistributionAccount {
                tenant_id,
                account_type,
            });
        }
        let address = tenant
            .distribution_account_address
            .filter(|a| !a.trim().is_empty())
            .ok_or(ResolveError::DistributionAccountMissing(tenant_id))?;

        Ok(BackendSelection::new(account_type, address))
    }

    fn resolve_host_level(&self) -> BackendSelection {
        self.host.clone()
    }
}

#[cfg(test)]
mod tests {
    use remit_core::{Tenant, TenantStatus};
    use remit_db::InMemoryTenantDirectory;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::backend::BackendKind;

    const HOST: &str = "GCKFBEIYV2U22IO2BJ4KVJOIP7XPWQGQFKKWXR6DOSJBV7STMAQSMTGG";
    const WALLET: &str = "1000216185";

    fn resolver(directory: &Arc<InMemoryTenantDirectory>) -> TenantBackendResolver {
        let tenants: Arc<dyn TenantDirectory> = directory.clone();
        TenantBackendResolver::new(tenants, HOST).unwrap()
    }

    fn circle_tenant() -> Tenant {
        Tenant::new("circle-org")
            .with_status(TenantStatus::Activated)
            .with_distribution_account(AccountType::DistributionCircleDbVault, WALLET)
    }

    #[tokio::test]
    async fn host_context_is_rejected_not_defaulted() {
        let directory = Arc::new(InMemoryTenantDirectory::default());
        let ctx = JobContext::host(CancellationToken::new());

        let err = resolver(&directory).resolve_for_tenant(&ctx).await.unwrap_err();

        assert!(matches!(err, ResolveError::NoTenantInContext));
        assert_eq!(directory.lookups(), 0);
    }

    #[tokio::test]
    async fn resolves_the_tenant_configuration() {
        let tenant = circle_tenant();
        let directory = Arc::new(InMemoryTenantDirectory::with_tenants([tenant.clone()]));
        let ctx = JobContext::for_tenant(tenant, CancellationToken::new());

        let selection = resolver(&directory).resolve_for_tenant(&ctx).await.unwrap();

        assert_eq!(selection.kind, BackendKind::CustodialApi);
        assert_eq!(selection.address, WALLET);
    }

    #[tokio::test]
    async fn reads_fresh_configuration_every_call() {
        let tenant = circle_tenant();
        let directory = Arc::new(InMemoryTenantDirectory::with_tenants([tenant.clone()]));
        let resolver = resolver(&directory);
        let ctx = JobContext::for_tenant(tenant.clone(), CancellationToken::new());

        let first = resolver.resolve_for_tenant(&ctx).await.unwrap();
        directory.upsert(tenant.with_distribution_account(
            AccountType::DistributionStellarDbVault,
            "GBUKOFF6FX6767LKKOD3P7KAS43I3Z7CNUBPCH33YZKPPR53ZDRAHCE7",
        ));
        let second = resolver.resolve_for_tenant(&ctx).await.unwrap();

        assert_eq!(first.kind, BackendKind::CustodialApi);
        assert_eq!(second.kind, BackendKind::LedgerDirect);
        assert_eq!(directory.lookups(), 2);
    }

    #[tokio::test]
    async fn missing_account_is_an_error() {
        let tenant = Tenant::new("bare").with_status(TenantStatus::Activated);
        let directory = Arc::new(InMemoryTenantDirectory::with_tenants([tenant.clone()]));
        let ctx = JobContext::for_tenant(tenant.clone(), CancellationToken::new());

        let err = resolver(&directory).resolve_for_tenant(&ctx).await.unwrap_err();

        assert!(matches!(err, ResolveError::DistributionAccountMissing(id) if id == tenant.id));
    }

    #[tokio::test]
    async fn deactivated_tenant_is_not_found() {
        let tenant = circle_tenant().with_status(TenantStatus::Deactivated);
        let directory = Arc::new(InMemoryTenantDirectory::with_tenants([tenant.clone()]));
        let ctx = JobContext::for_tenant(tenant, CancellationToken::new());

        let err = resolver(&directory).resolve_for_tenant(&ctx).await.unwrap_err();

        assert!(matches!(err, ResolveError::Tenant(TenantError::NotFound(_))));
    }

    #[tokio::test]
    async fn each_context_resolves_its_own_tenant() {
        let a = circle_tenant();
        let b = Tenant::new("ledger-org")
            .with_status(TenantStatus::Activated)
            .with_distribution_account(
                AccountType::DistributionStellarEnv,
                "GBUKOFF6FX6767LKKOD3P7KAS43I3Z7CNUBPCH33YZKPPR53ZDRAHCE7",
            );
        let directory = Arc::new(InMemoryTenantDirectory::with_tenants([a.clone(), b.clone()]));
        let resolver = resolver(&directory);

        let for_a = resolver
            .resolve_for_tenant(&JobContext::for_tenant(a, CancellationToken::new()))
            .await
            .unwrap();
        let for_b = resolver
            .resolve_for_tenant(&JobContext::for_tenant(b, CancellationToken::new()))
            .await
            .unwrap();

        assert_eq!(for_a.address, WALLET);
        assert_eq!(for_b.kind, BackendKind::LedgerDirect);
    }

    #[test]
    fn host_level_uses_the_host_account() {
        let directory = Arc::new(InMemoryTenantDirectory::default());
        let selection = resolver(&directory).resolve_host_level();
        assert_eq!(selection.account_type, AccountType::HostStellarEnv);
        assert_eq!(selection.kind, BackendKind::LedgerDirect);
        assert_eq!(selection.address, HOST);
    }

    #[test]
    fn malformed_host_account_is_rejected() {
        let tenants: Arc<dyn TenantDirectory> = Arc::new(InMemoryTenantDirectory::default());
        assert!(matches!(
            TenantBackendResolver::new(tenants, "not-a-key"),
            Err(ResolveError::InvalidHostAccount(_))
        ));
    }
}
