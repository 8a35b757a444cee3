use remit_dispatch::TransferError;
use thiserror::Error;

/// Errors returned by the custodial API client.
#[derive(Debug, Error)]
pub enum CustodialError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response. `message` is the API's own message when the body
    /// carried one.
    #[error("custodial API returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// The response body could not be deserialized into the expected type.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
}

impl From<CustodialError> for TransferError {
    fn from(err: CustodialError) -> Self {
        match err {
            CustodialError::Api { status, message } => Self::Rejected { status, message },
            CustodialError::Deserialize { .. } => Self::Decode(err.to_string()),
            CustodialError::Http(_) | CustodialError::InvalidBaseUrl(_) => {
                Self::Transport(err.to_string())
            }
        }
    }
}
