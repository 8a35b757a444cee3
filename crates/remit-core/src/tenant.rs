//! Tenant records and the distribution account types a tenant can be
//! configured with.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CoreError;

/// Identifier of a tenant (the multi-tenant isolation boundary).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(Uuid);

impl TenantId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for TenantId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl FromStr for TenantId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::from_str(s)
            .map(Self)
            .map_err(|e| CoreError::InvalidTenantId(format!("{s}: {e}")))
    }
}

/// Lifecycle status of a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TenantStatus {
    #[serde(rename = "TENANT_CREATED")]
    Created,
    #[serde(rename = "TENANT_PROVISIONED")]
    Provisioned,
    #[serde(rename = "TENANT_ACTIVATED")]
    Activated,
    #[serde(rename = "TENANT_DEACTIVATED")]
    Deactivated,
}

impl TenantStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "TENANT_CREATED",
            Self::Provisioned => "TENANT_PROVISIONED",
            Self::Activated => "TENANT_ACTIVATED",
            Self::Deactivated => "TENANT_DEACTIVATED",
        }
    }
}

impl std::fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TenantStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TENANT_CREATED" => Ok(Self::Created),
            "TENANT_PROVISIONED" => Ok(Self::Provisioned),
            "TENANT_ACTIVATED" => Ok(Self::Activated),
            "TENANT_DEACTIVATED" => Ok(Self::Deactivated),
            other => Err(CoreError::InvalidTenantStatus(other.to_string())),
        }
    }
}

/// Settlement platform an account lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Platform {
    /// Payments are signed and submitted straight to the ledger network.
    Stellar,
    /// Payments are handed to a custodial API that settles on our behalf.
    Circle,
}

/// Fully-qualified account type, serialized as `ROLE.PLATFORM.STORAGE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountType {
    #[serde(rename = "HOST.STELLAR.ENV")]
    HostStellarEnv,
    #[serde(rename = "DISTRIBUTION_ACCOUNT.STELLAR.ENV")]
    DistributionStellarEnv,
    #[serde(rename = "DISTRIBUTION_ACCOUNT.STELLAR.DB_VAULT")]
    DistributionStellarDbVault,
    #[serde(rename = "DISTRIBUTION_ACCOUNT.CIRCLE.DB_VAULT")]
    DistributionCircleDbVault,
}

impl AccountType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HostStellarEnv => "HOST.STELLAR.ENV",
            Self::DistributionStellarEnv => "DISTRIBUTION_ACCOUNT.STELLAR.ENV",
            Self::DistributionStellarDbVault => "DISTRIBUTION_ACCOUNT.STELLAR.DB_VAULT",
            Self::DistributionCircleDbVault => "DISTRIBUTION_ACCOUNT.CIRCLE.DB_VAULT",
        }
    }

    #[must_use]
    pub fn platform(self) -> Platform {
        match self {
            Self::HostStellarEnv | Self::DistributionStellarEnv | Self::DistributionStellarDbVault => {
                Platform::Stellar
            }
            Self::DistributionCircleDbVault => Platform::Circle,
        }
    }

    #[must_use]
    pub fn is_stellar(self) -> bool {
        self.platform() == Platform::Stellar
    }

    #[must_use]
    pub fn is_circle(self) -> bool {
        self.platform() == Platform::Circle
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HOST.STELLAR.ENV" => Ok(Self::HostStellarEnv),
            "DISTRIBUTION_ACCOUNT.STELLAR.ENV" => Ok(Self::DistributionStellarEnv),
            "DISTRIBUTION_ACCOUNT.STELLAR.DB_VAULT" => Ok(Self::DistributionStellarDbVault),
            "DISTRIBUTION_ACCOUNT.CIRCLE.DB_VAULT" => Ok(Self::DistributionCircleDbVault),
            other => Err(CoreError::InvalidAccountType(other.to_string())),
        }
    }
}

/// A tenant as recorded in the tenant directory.
///
/// `id` and `name` never change once created. Status and the distribution
/// account fields are edited administratively, so anything derived from them
/// must be re-read rather than cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub status: TenantStatus,
    pub is_default: bool,
    pub distribution_account_type: Option<AccountType>,
    /// Ledger public key for Stellar accounts, custodial wallet id for Circle.
    pub distribution_account_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Tenant {
    /// Builds a freshly created tenant with no distribution account.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: TenantId::new(),
            name: name.into(),
            status: TenantStatus::Created,
            is_default: false,
            distribution_account_type: None,
            distribution_account_address: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: TenantStatus) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn with_distribution_account(
        mut self,
        account_type: AccountType,
        address: impl Into<String>,
    ) -> Self {
        self.distribution_account_type = Some(account_type);
        self.distribution_account_address = Some(address.into());
        self
    }

    /// Active means neither deactivated nor soft-deleted.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status != TenantStatus::Deactivated && self.deleted_at.is_none()
    }

    /// Name of the Postgres schema holding this tenant's data.
    ///
    /// The result goes unquoted into `search_path`, so names outside
    /// [`is_valid_tenant_name`] are refused.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidTenantName`] for a name that is not a plain
    /// identifier.
    pub fn schema_name(&self) -> Result<String, CoreError> {
        if !is_valid_tenant_name(&self.name) {
            return Err(CoreError::InvalidTenantName(self.name.clone()));
        }
        Ok(format!("sdp_{}", self.name))
    }
}

/// Lowercase ASCII letter first, then lowercase letters, digits, `-` or `_`.
#[must_use]
pub fn is_valid_tenant_name(name: &str) -> bool {
    let mut bytes = name.bytes();
    bytes.next().is_some_and(|b| b.is_ascii_lowercase())
        && bytes.all(|b| matches!(b, b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_'))
}
