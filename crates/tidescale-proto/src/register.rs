//! registration request and response types.
//!
//! keys use the prefixed hex encoding (`nodekey:...`), field names are
//! pascalcase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tidescale_types::{HostInfo, NodeKey};

use crate::CapabilityVersion;

/// a registration request from a client.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct RegisterRequest {
    /// client capability version.
    #[serde(default)]
    pub version: CapabilityVersion,

    /// node's current public key.
    pub node_key: NodeKey,

    /// previous node key, set when rotating.
    #[serde(default)]
    pub old_node_key: NodeKey,

    /// credentials for non-interactive registration.
    #[serde(default)]
    pub auth: Option<RegisterAuth>,

    /// host metadata.
    #[serde(default)]
    pub hostinfo: Option<HostInfo>,

    /// request an ephemeral node.
    #[serde(default)]
    pub ephemeral: bool,

    /// auth url from a previous response the client is waiting on.
    #[serde(default)]
    pub followup: String,

    /// requested key expiry. a time in the past is a logout.
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

impl RegisterRequest {
    /// the auth key token, if one was supplied.
    pub fn auth_key(&self) -> Option<&str> {
        self.auth
            .as_ref()
            .map(|a| a.auth_key.as_str())
            .filter(|k| !k.is_empty())
    }

    /// requested expiry, treating the zero time as unset.
    pub fn requested_expiry(&self) -> Option<DateTime<Utc>> {
        self.expiry.filter(|e| e.timestamp() > 0)
    }

    /// whether the client asked for a logout (expiry in the past).
    pub fn is_logout_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.requested_expiry(), Some(e) if e <= now)
    }
}

/// credentials inside a [`RegisterRequest`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct RegisterAuth {
    /// auth key token.
    #[serde(default)]
    pub auth_key: String,
}

/// a registration response.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct RegisterResponse {
    /// owning user.
    pub user: TailcfgUser,

    /// login for the owning user.
    pub login: TailcfgLogin,

    /// the node key has expired and must be rotated.
    #[serde(default)]
    pub node_key_expired: bool,

    /// whether the machine is authorized.
    pub machine_authorized: bool,

    /// if non-empty, the user must visit this url to finish.
    #[serde(rename = "AuthURL", default, skip_serializing_if = "String::is_empty")]
    pub auth_url: String,

    /// registration failure message.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl RegisterResponse {
    /// a response asking the client to authenticate at `url`.
    pub fn auth_required(url: impl Into<String>) -> Self {
        Self {
            auth_url: url.into(),
            ..Default::default()
        }
    }

    /// a response carrying only an error message.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            ..Default::default()
        }
    }
}

/// user in a registration response.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct TailcfgUser {
    /// user id.
    #[serde(rename = "ID")]
    pub id: u64,
    /// display name.
    #[serde(default)]
    pub display_name: String,
}

/// login in a registration response.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct TailcfgLogin {
    /// login id. same as the user id.
    #[serde(rename = "ID")]
    pub id: u64,
    /// identity provider.
    #[serde(default)]
    pub provider: String,
    /// login name.
    #[serde(default)]
    pub login_name: String,
    /// display name.
    #[serde(default)]
    pub display_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_auth_key_request() {
        let json = r#"{
            "Version": 106,
            "NodeKey": "nodekey:0000000000000000000000000000000000000000000000000000000000000001",
            "Auth": {"AuthKey": "tskey-auth-abc"},
            "Hostinfo": {"Hostname": "web-1", "RequestTags": ["tag:server"]}
        }"#;
        let req: RegisterRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.auth_key(), Some("tskey-auth-abc"));
        assert!(req.followup.is_empty());
        assert!(req.requested_expiry().is_none());
    }

    #[test]
    fn test_zero_expiry_is_unset() {
        let json = r#"{
            "NodeKey": "",
            "Expiry": "0001-01-01T00:00:00Z"
        }"#;
        let req: RegisterRequest = serde_json::from_str(json).unwrap();
        assert!(req.requested_expiry().is_none());
        assert!(!req.is_logout_at(Utc::now()));
    }

    #[test]
    fn test_past_expiry_is_logout() {
        let req = RegisterRequest {
            expiry: Some(Utc::now() - chrono::Duration::hours(1)),
            ..Default::default()
        };
        assert!(req.is_logout_at(Utc::now()));
    }

    #[test]
    fn test_auth_required_omits_error() {
        let json = serde_json::to_value(RegisterResponse::auth_required("http://x/a/1")).unwrap();
        assert_eq!(json["AuthURL"], "http://x/a/1");
        assert!(json.get("Error").is_none());
    }
}
