//! ssh rules in the policy document and their expansion into client policy.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tidescale_proto::{SshAction, SshPolicy, SshPrincipal, SshRule};
use tidescale_types::Node;

use crate::alias::{Alias, Autogroup};
use crate::engine::{PolicyEngine, UserResolver, same_owner};
use crate::error::ValidationError;

const NONROOT: &str = "autogroup:nonroot";

/// an ssh rule in the policy document.
///
/// ```json
/// {
///   "action": "check",
///   "checkPeriod": "12h",
///   "src": ["group:admins"],
///   "dst": ["tag:server"],
///   "users": ["root", "autogroup:nonroot"]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshPolicyRule {
    /// `accept` or `check`.
    pub action: SshActionType,

    /// how long a `check` approval lasts.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "humantime_serde"
    )]
    pub check_period: Option<Duration>,

    /// who may connect.
    pub src: Vec<Alias>,

    /// where to.
    pub dst: Vec<Alias>,

    /// remote users, or `autogroup:nonroot`.
    pub users: Vec<String>,
}

impl SshPolicyRule {
    /// check the rule's structure.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.src.is_empty() {
            return Err(ValidationError::EmptySrc);
        }
        if self.dst.is_empty() {
            return Err(ValidationError::EmptyDst);
        }
        if self.users.is_empty() {
            return Err(ValidationError::EmptySshUsers);
        }
        if self.action == SshActionType::Check && self.check_period.is_none() {
            return Err(ValidationError::MissingCheckPeriod);
        }
        Ok(())
    }

    fn action(&self) -> SshAction {
        match self.action {
            SshActionType::Accept => SshAction::accept(),
            SshActionType::Check => SshAction::check(self.check_period),
        }
    }

    /// remote user -> local user.
    ///
    /// `autogroup:nonroot` becomes `* -> =` and denies root unless root is
    /// listed explicitly.
    fn ssh_users(&self) -> BTreeMap<String, String> {
        let mut users = BTreeMap::new();
        for user in &self.users {
            if user == NONROOT {
                users.insert("*".to_string(), "=".to_string());
            } else {
                users.insert(user.clone(), user.clone());
            }
        }
        if self.users.iter().any(|u| u == NONROOT) && !self.users.iter().any(|u| u == "root") {
            users.insert("root".to_string(), String::new());
        }
        users
    }
}

/// ssh action type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SshActionType {
    /// accept immediately.
    Accept,
    /// accept, re-authenticating every check period.
    Check,
}

impl PolicyEngine {
    /// ssh policy for connections into `dst` from `peers`.
    ///
    /// a rule expands to at most two client rules: one for `autogroup:self`
    /// (sources owned by dst's user) and one for the other destinations.
    pub fn build_ssh_policy(&self, peers: &[Node], dst: &Node, users: &dyn UserResolver) -> SshPolicy {
        let mut rules = Vec::new();

        for rule in &self.policy().ssh {
            // tagged nodes cannot answer an interactive check
            let sources: Vec<&Alias> = rule
                .src
                .iter()
                .filter(|a| !(rule.action == SshActionType::Check && matches!(a, Alias::Tag(_))))
                .collect();
            let is_source = |peer: &Node| sources.iter().any(|a| self.node_matches(a, peer, users));

            let self_scope = !dst.is_tagged()
                && rule
                    .dst
                    .iter()
                    .any(|a| *a == Alias::Autogroup(Autogroup::SelfDevices));
            if self_scope {
                let principals =
                    principals(peers.iter().filter(|p| same_owner(p, dst) && is_source(*p)));
                if !principals.is_empty() {
                    rules.push(SshRule {
                        principals,
                        ssh_users: rule.ssh_users(),
                        action: rule.action(),
                        accept_env: vec![],
                    });
                }
            }

            let other_scope = rule.dst.iter().any(|a| match a {
                Alias::Autogroup(Autogroup::SelfDevices) => false,
                other => self.node_matches(other, dst, users),
            });
            if other_scope {
                let principals = principals(peers.iter().filter(|p| is_source(*p)));
                if !principals.is_empty() {
                    rules.push(SshRule {
                        principals,
                        ssh_users: rule.ssh_users(),
                        action: rule.action(),
                        accept_env: vec![],
                    });
                }
            }
        }

        SshPolicy { rules }
    }
}

fn principals<'a>(nodes: impl Iterator<Item = &'a Node>) -> Vec<SshPrincipal> {
    let ips: BTreeSet<String> = nodes.flat_map(|n| n.ips().map(|ip| ip.to_string())).collect();
    ips.into_iter().map(SshPrincipal::node_ip).collect()
}
