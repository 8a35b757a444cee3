//! HTTP client for the custodial transfer API.
//!
//! Wraps `reqwest` with bearer-token auth, typed request and response bodies,
//! and retry on transient failures. Implements the dispatch
//! [`TransferClient`] seam.

use std::time::Duration;

use async_trait::async_trait;
use remit_core::CustodialApiConfig;
use remit_dispatch::{Transfer, TransferClient, TransferError, TransferRequest};
use reqwest::{Client, Url};

use crate::error::CustodialError;
use crate::retry::Backoff;
use crate::types::{
    ApiErrorBody, ChainAddress, DataEnvelope, Money, TransferBody, TransferData, WalletRef,
};

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 100;

/// Client for the custodial transfer API.
///
/// Use [`CustodialClient::from_config`] in the server or
/// [`CustodialClient::with_base_url`] to point at a mock server in tests.
pub struct CustodialClient {
    client: Client,
    api_key: String,
    base_url: Url,
    backoff: Backoff,
}

impl std::fmt::Debug for CustodialClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustodialClient")
            .field("api_key", &"[redacted]")
            .field("base_url", &self.base_url.as_str())
            .field("max_retries", &self.backoff.max_retries())
            .finish_non_exhaustive()
    }
}

impl CustodialClient {
    /// # Errors
    ///
    /// Returns [`CustodialError::Http`] if the `reqwest::Client` cannot be
    /// built, or [`CustodialError::InvalidBaseUrl`] for a malformed URL.
    pub fn from_config(config: &CustodialApiConfig) -> Result<Self, CustodialError> {
        Ok(
            Self::with_base_url(&config.api_key, config.request_timeout_secs, &config.base_url)?
                .with_retry(config.max_retries, config.retry_backoff_ms),
        )
    }

    /// # Errors
    ///
    /// Returns [`CustodialError::Http`] if the `reqwest::Client` cannot be
    /// built, or [`CustodialError::InvalidBaseUrl`] for a malformed URL.
    pub fn with_base_url(
        api_key: &str,
        timeout_secs: u64,
        base_url: &str,
    ) -> Result<Self, CustodialError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("remit/0.1 (disbursements)")
            .build()?;

        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised)
            .map_err(|e| CustodialError::InvalidBaseUrl(format!("'{base_url}': {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.to_owned(),
            base_url,
            backoff: Backoff::new(DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BACKOFF_MS),
        })
    }

    #[must_use]
    pub fn with_retry(mut self, max_retries: u32, retry_backoff_ms: u64) -> Self {
        self.backoff = Backoff::new(max_retries, retry_backoff_ms);
        self
    }

    /// Creates a wallet-to-address transfer.
    ///
    /// # Errors
    ///
    /// - [`CustodialError::Api`] for non-2xx responses (after retries for 429/5xx).
    /// - [`CustodialError::Http`] on network failure.
    /// - [`CustodialError::Deserialize`] if the body is not a transfer.
    pub async fn post_transfer(
        &self,
        request: &TransferRequest,
    ) -> Result<TransferData, CustodialError> {
        let url = self
            .base_url
            .join("v1/transfers")
            .map_err(|e| CustodialError::InvalidBaseUrl(e.to_string()))?;
        let body = TransferBody {
            idempotency_key: request.idempotency_key.clone(),
            source: WalletRef {
                kind: "wallet",
                id: request.source_wallet_id.clone(),
            },
            destination: ChainAddress {
                kind: "blockchain",
                address: request.destination_address.clone(),
                chain: request.chain.clone(),
            },
            amount: Money {
                amount: request.amount.to_string(),
                currency: request.currency.clone(),
            },
        };

        let (url, body) = (&url, &body);
        self.backoff
            .run(move || self.post_json::<TransferData, _>(url, body))
            .await
    }

    async fn post_json<T, B>(&self, url: &Url, body: &B) -> Result<T, CustodialError>
    where
        T: serde::de::DeserializeOwned,
        B: serde::Serialize + ?Sized,
    {
        let response = self
            .client
            .post(url.clone())
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .map(|b| b.message)
                .unwrap_or(text);
            return Err(CustodialError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: DataEnvelope<T> =
            serde_json::from_str(&text).map_err(|e| CustodialError::Deserialize {
                context: url.path().to_string(),
                source: e,
            })?;
        Ok(envelope.data)
    }
}

#[async_trait]
impl TransferClient for CustodialClient {
    async fn create_transfer(&self, request: &TransferRequest) -> Result<Transfer, TransferError> {
        let data = self.post_transfer(request).await?;
        Ok(Transfer {
            id: data.id,
            status: data.status,
            transaction_hash: data.transaction_hash,
        })
    }
}
