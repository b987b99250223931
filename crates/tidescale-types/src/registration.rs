//! pending interactive registrations.
//!
//! a registration request is created the first time a machine contacts the
//! server without credentials. it is keyed by the machine key and carries a
//! short random code that ends up in the auth url. once a human completes
//! authentication (or the attempt fails) the request is resolved and
//! removed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::keys::MachineKey;
use crate::tailnet::TailnetId;
use crate::user::UserId;

/// short random code identifying a pending registration in auth urls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegistrationId(String);

impl RegistrationId {
    /// 8 random bytes, hex encoded.
    pub fn generate() -> Self {
        use rand::Rng;
        let bytes: [u8; 8] = rand::rng().random();
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RegistrationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// a registration waiting on interactive authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub machine_key: MachineKey,
    pub code: RegistrationId,
    pub tailnet_id: TailnetId,

    /// the client's original request, replayed once authentication completes.
    pub payload: serde_json::Value,

    pub authenticated: bool,

    /// set when authentication failed.
    pub error: Option<String>,

    /// the user that completed authentication.
    pub user_id: Option<UserId>,

    pub created_at: DateTime<Utc>,
}

impl RegistrationRequest {
    pub fn new(machine_key: MachineKey, tailnet_id: TailnetId, payload: serde_json::Value) -> Self {
        Self {
            machine_key,
            code: RegistrationId::generate(),
            tailnet_id,
            payload,
            authenticated: false,
            error: None,
            user_id: None,
            created_at: Utc::now(),
        }
    }

    /// whether the request has reached a terminal state.
    pub fn is_resolved(&self) -> bool {
        self.authenticated || self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_is_short_hex() {
        let code = RegistrationId::generate();
        assert_eq!(code.as_str().len(), 16);
        assert!(code.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_resolution() {
        let mut req = RegistrationRequest::new(
            MachineKey::random(),
            TailnetId(1),
            serde_json::Value::Null,
        );
        assert!(!req.is_resolved());
        req.error = Some("denied".to_string());
        assert!(req.is_resolved());
    }
}
