//! Tenant connection-string derivation.
//!
//! Every tenant lives in its own Postgres schema on the admin database, so a
//! tenant DSN is the admin DSN with `search_path` pinned through the libpq
//! `options` startup parameter.

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

use crate::DbError;

/// Returns `base` with `options=-c search_path=<schema>` appended.
///
/// Existing query parameters are kept, except a previous `options` entry which
/// is replaced.
///
/// # Errors
///
/// Returns [`DbError::EmptyDsn`] when `base` is blank.
pub fn tenant_dsn(base: &str, schema: &str) -> Result<String, DbError> {
    let base = base.trim();
    if base.is_empty() {
        return Err(DbError::EmptyDsn);
    }

    let (head, query) = match base.split_once('?') {
        Some((head, query)) => (head, query),
        None => (base, ""),
    };

    let mut params: Vec<&str> = query
        .split('&')
        .filter(|p| !p.is_empty() && !p.starts_with("options="))
        .collect();

    let options = format!("-c search_path={schema}");
    let encoded = format!("options={}", utf8_percent_encode(&options, NON_ALPHANUMERIC));
    params.push(&encoded);

    Ok(format!("{head}?{}", params.join("&")))
}
