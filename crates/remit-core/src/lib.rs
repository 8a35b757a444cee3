//! Domain primitives shared by every `remit` crate: tenants, distribution
//! account types, the per-execution [`JobContext`], and application config.

pub mod app_config;
pub mod config;
pub mod context;
pub mod tenant;

pub use app_config::{AppConfig, CustodialApiConfig, Environment};
pub use config::{is_ledger_public_key, load_app_config, load_app_config_from_env};
pub use context::JobContext;
pub use tenant::{is_valid_tenant_name, AccountType, Platform, Tenant, TenantId, TenantStatus};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid tenant status: {0}")]
    InvalidTenantStatus(String),
    #[error("invalid account type: {0}")]
    InvalidAccountType(String),
    #[error("invalid tenant id: {0}")]
    InvalidTenantId(String),
    #[error("invalid tenant name '{0}': expected lowercase letters, digits, '-' or '_'")]
    InvalidTenantName(String),
}
