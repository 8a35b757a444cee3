use remit_core::{AccountType, Platform};
use serde::Serialize;

/// Settlement rail a payment batch is submitted through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Transactions are built and submitted to the ledger network by us.
    LedgerDirect,
    /// Transfers are requested from a custodial API.
    CustodialApi,
}

impl BackendKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LedgerDirect => "ledger_direct",
            Self::CustodialApi => "custodial_api",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Platform> for BackendKind {
    fn from(platform: Platform) -> Self {
        match platform {
            Platform::Stellar => Self::LedgerDirect,
            Platform::Circle => Self::CustodialApi,
        }
    }
}

/// Backend a tenant (or the host) is configured to use right now.
///
/// Never cache this across executions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendSelection {
    pub kind: BackendKind,
    pub account_type: AccountType,
    /// Ledger public key or custodial wallet id, depending on `kind`.
    pub address: String,
}

impl BackendSelection {
    #[must_use]
    pub fn new(account_type: AccountType, address: impl Into<String>) -> Self {
        Self {
            kind: account_type.platform().into(),
            account_type,
            address: address.into(),
        }
    }
}
