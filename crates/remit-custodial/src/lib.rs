//! HTTP client for the custodial transfer API.

pub mod client;
pub mod error;
mod retry;
pub mod types;

pub use client::CustodialClient;
pub use error::CustodialError;
