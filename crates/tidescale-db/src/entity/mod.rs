//! database entity models for sea-orm.
//!
//! these entities map to database tables and handle serialization
//! of complex types to/from database columns.

pub mod auth_key;
pub mod node;
pub mod registration_request;
pub mod tailnet;
pub mod user;

use tracing::warn;

/// decode a json column, falling back to the default on corrupt data.
pub(crate) fn json_or_default<T>(raw: &str, table: &str, id: i64, column: &str) -> T
where
    T: serde::de::DeserializeOwned + Default,
{
    match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!(table, id, column, error = %e, "failed to parse JSON column, using default");
            T::default()
        }
    }
}

/// encode a json column. the domain types always serialize.
pub(crate) fn to_json<T: serde::Serialize>(value: &T, empty: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| empty.to_string())
}

/// raw 32-byte key column.
pub(crate) fn key_bytes(raw: &[u8], table: &str, id: i64) -> [u8; 32] {
    match raw.try_into() {
        Ok(bytes) => bytes,
        Err(_) => {
            warn!(table, id, len = raw.len(), "stored key has the wrong length, using zero key");
            [0; 32]
        }
    }
}
