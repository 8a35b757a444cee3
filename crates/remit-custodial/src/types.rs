//! Wire types for the custodial transfer API.

use remit_dispatch::TransferStatus;
use serde::{Deserialize, Serialize};

/// Success responses wrap their payload in `{"data": ...}`.
#[derive(Debug, Deserialize)]
pub struct DataEnvelope<T> {
    pub data: T,
}

/// Error responses: `{"code": 2, "message": "..."}`.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: Option<i64>,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferBody {
    pub idempotency_key: String,
    pub source: WalletRef,
    pub destination: ChainAddress,
    pub amount: Money,
}

#[derive(Debug, Serialize)]
pub struct WalletRef {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct ChainAddress {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub address: String,
    pub chain: String,
}

#[derive(Debug, Serialize)]
pub struct Money {
    pub amount: String,
    pub currency: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferData {
    pub id: String,
    pub status: TransferStatus,
    #[serde(default)]
    pub transaction_hash: Option<String>,
}
