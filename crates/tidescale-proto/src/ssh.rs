//! ssh policy sent to clients.
//!
//! unlike the rest of the protocol these types use camelcase field names.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// rules for incoming ssh connections, evaluated in order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SshPolicy {
    /// the rules. first match wins.
    pub rules: Vec<SshRule>,
}

impl SshPolicy {
    /// whether the policy has no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// a rule mapping principals to an action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SshRule {
    /// principals matching this rule. any one suffices.
    pub principals: Vec<SshPrincipal>,

    /// remote user -> local user. `"*"` matches any user, `"="` keeps the
    /// requested name, an empty value denies.
    pub ssh_users: BTreeMap<String, String>,

    /// what to do on match.
    pub action: SshAction,

    /// environment variables the client may set.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accept_env: Vec<String>,
}

/// who an ssh rule applies to.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct SshPrincipal {
    /// stable node id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,

    /// tailnet address of the connecting node.
    #[serde(rename = "nodeIP", default, skip_serializing_if = "Option::is_none")]
    pub node_ip: Option<String>,

    /// login of the connecting user.
    #[serde(rename = "userLogin", default, skip_serializing_if = "Option::is_none")]
    pub user_login: Option<String>,

    /// match any connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub any: Option<bool>,
}

impl SshPrincipal {
    /// a principal matching one node address.
    pub fn node_ip(ip: impl Into<String>) -> Self {
        Self {
            node_ip: Some(ip.into()),
            ..Default::default()
        }
    }
}

/// action taken for a matching ssh rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SshAction {
    /// message shown to the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// reject the connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject: Option<bool>,

    /// accept the connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept: Option<bool>,

    /// maximum session length, encoded as nanoseconds.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nanos")]
    pub session_duration: Option<Duration>,

    /// allow agent forwarding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_agent_forwarding: Option<bool>,

    /// url the client asks before accepting (check mode).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold_and_delegate: Option<String>,

    /// allow `-L` forwarding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_local_port_forwarding: Option<bool>,

    /// allow `-R` forwarding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_remote_port_forwarding: Option<bool>,
}

impl SshAction {
    /// plain accept with forwarding enabled.
    pub fn accept() -> Self {
        Self {
            accept: Some(true),
            allow_agent_forwarding: Some(true),
            allow_local_port_forwarding: Some(true),
            allow_remote_port_forwarding: Some(true),
            ..Default::default()
        }
    }

    /// accept, but bound the session to `period` so the user has to come back.
    pub fn check(period: Option<Duration>) -> Self {
        Self {
            session_duration: period,
            ..Self::accept()
        }
    }
}

mod nanos {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_u64(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_nanos))
    }
}
