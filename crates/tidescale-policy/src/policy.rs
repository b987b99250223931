//! the access control policy document.

use std::collections::BTreeMap;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use tidescale_types::Tag;

use crate::acl::AclEntry;
use crate::alias::{Alias, parse_prefix};
use crate::error::{Error, Result, ValidationError};
use crate::grant::Grant;
use crate::hujson;
use crate::ssh::SshPolicyRule;

/// a parsed policy document.
///
/// ```json
/// {
///   "groups": {"group:eng": ["alice@example.com"]},
///   "hosts": {"db": "10.0.0.5"},
///   "tagOwners": {"tag:server": ["group:eng"]},
///   "acls": [{"action": "accept", "src": ["group:eng"], "dst": ["tag:server:22"]}],
///   "grants": [{"src": ["*"], "dst": ["tag:web"], "ip": ["tcp:443"]}],
///   "autoApprovers": {"routes": {"10.0.0.0/8": ["tag:router"]}, "exitNode": ["tag:exit"]},
///   "ssh": [{"action": "accept", "src": ["autogroup:member"], "dst": ["autogroup:self"], "users": ["autogroup:nonroot"]}],
///   "nodeAttrs": [{"target": ["*"], "attr": ["mullvad"]}]
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AclPolicy {
    /// group name (with `group:` prefix) -> member logins.
    pub groups: BTreeMap<String, Vec<String>>,

    /// host alias -> address or prefix.
    pub hosts: BTreeMap<String, String>,

    /// acl entries.
    pub acls: Vec<AclEntry>,

    /// grants.
    pub grants: Vec<Grant>,

    /// tag -> who may apply it.
    pub tag_owners: BTreeMap<String, Vec<Alias>>,

    /// who may have routes approved automatically.
    pub auto_approvers: AutoApprovers,

    /// ssh rules.
    pub ssh: Vec<SshPolicyRule>,

    /// extra node capabilities.
    pub node_attrs: Vec<NodeAttr>,
}

/// automatic route approval.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AutoApprovers {
    /// prefix -> approvers. advertised routes inside the prefix are approved.
    pub routes: BTreeMap<String, Vec<Alias>>,

    /// approvers for exit routes.
    pub exit_node: Vec<Alias>,
}

impl AutoApprovers {
    /// route approvers with parsed prefixes. keys were checked by validate.
    pub(crate) fn route_entries(&self) -> impl Iterator<Item = (IpNet, &[Alias])> {
        self.routes
            .iter()
            .filter_map(|(prefix, approvers)| Some((parse_prefix(prefix)?, approvers.as_slice())))
    }
}

/// capabilities attached to matching nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeAttr {
    /// nodes receiving the attributes.
    pub target: Vec<Alias>,
    /// capability names.
    pub attr: Vec<String>,
}

impl AclPolicy {
    /// the policy used when a tailnet has none: everyone may reach everything.
    pub fn allow_all() -> Self {
        Self {
            acls: vec![AclEntry::allow_all()],
            ..Default::default()
        }
    }

    /// parse a stored policy document.
    ///
    /// comments and trailing commas are accepted. an empty document yields
    /// [`AclPolicy::allow_all`].
    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::allow_all());
        }
        let mut policy: AclPolicy = serde_json::from_str(&hujson::standardize(text))?;
        policy.validate()?;
        policy.prefer_hosts();
        Ok(policy)
    }

    /// turn literal aliases that spell a `hosts` name into host aliases.
    ///
    /// a host entry wins over the literal reading of the same text.
    fn prefer_hosts(&mut self) {
        let named: Vec<(IpNet, String)> = self
            .hosts
            .keys()
            .filter_map(|name| parse_prefix(name).map(|net| (net, name.clone())))
            .collect();
        if named.is_empty() {
            return;
        }

        for acl in &mut self.acls {
            for alias in &mut acl.src {
                prefer_host(alias, &named);
            }
            for dst in &mut acl.dst {
                prefer_host(&mut dst.alias, &named);
            }
        }
        for grant in &mut self.grants {
            for alias in grant.src.iter_mut().chain(grant.dst.iter_mut()) {
                prefer_host(alias, &named);
            }
        }
        for rule in &mut self.ssh {
            for alias in rule.src.iter_mut().chain(rule.dst.iter_mut()) {
                prefer_host(alias, &named);
            }
        }
    }

    /// check every section.
    pub fn validate(&self) -> Result<()> {
        for name in self.groups.keys() {
            if !name.starts_with("group:") {
                return Err(ValidationError::InvalidGroupName(name.clone()).into());
            }
        }
        for (name, value) in &self.hosts {
            if parse_prefix(value).is_none() {
                return Err(ValidationError::InvalidHost {
                    name: name.clone(),
                    value: value.clone(),
                }
                .into());
            }
        }
        for tag in self.tag_owners.keys() {
            if tag.parse::<Tag>().is_err() {
                return Err(ValidationError::InvalidTagOwner(tag.clone()).into());
            }
        }
        for route in self.auto_approvers.routes.keys() {
            if parse_prefix(route).is_none() {
                return Err(ValidationError::InvalidRoute(route.clone()).into());
            }
        }
        for (index, acl) in self.acls.iter().enumerate() {
            acl.validate()
                .map_err(|cause| Error::InvalidAcl { index, cause })?;
        }
        for (index, grant) in self.grants.iter().enumerate() {
            grant
                .validate()
                .map_err(|cause| Error::InvalidGrant { index, cause })?;
        }
        for (index, rule) in self.ssh.iter().enumerate() {
            rule.validate()
                .map_err(|cause| Error::InvalidSshRule { index, cause })?;
        }
        Ok(())
    }

    /// whether `login` is listed in `group`.
    pub fn is_group_member(&self, group: &str, login: &str) -> bool {
        self.groups
            .get(group)
            .is_some_and(|members| members.iter().any(|m| m == login))
    }

    /// resolve a host alias.
    pub fn host(&self, name: &str) -> Option<IpNet> {
        self.hosts.get(name).and_then(|v| parse_prefix(v))
    }
}

fn prefer_host(alias: &mut Alias, named: &[(IpNet, String)]) {
    if let Alias::Prefix(net) = *alias {
        if let Some((_, name)) = named.iter().find(|(n, _)| *n == net) {
            *alias = Alias::Host(name.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_allows_all() {
        let policy = AclPolicy::parse("  \n").unwrap();
        assert_eq!(policy.acls.len(), 1);
        assert_eq!(policy.acls[0].src, vec![Alias::Wildcard]);
    }

    #[test]
    fn test_empty_object_denies() {
        let policy = AclPolicy::parse("{}").unwrap();
        assert!(policy.acls.is_empty());
        assert!(policy.grants.is_empty());
    }

    #[test]
    fn test_parse_full_document() {
        let policy = AclPolicy::parse(
            r#"{
                // groups
                "groups": {"group:eng": ["alice@example.com"]},
                "hosts": {"db": "10.0.0.5"},
                "tagOwners": {"tag:server": ["group:eng"]},
                "acls": [
                    {"action": "accept", "src": ["group:eng"], "dst": ["tag:server:22"]},
                ],
                "autoApprovers": {
                    "routes": {"10.0.0.0/8": ["tag:router"]},
                    "exitNode": ["tag:exit"],
                },
                "ssh": [
                    {"action": "accept", "src": ["autogroup:member"], "dst": ["autogroup:self"], "users": ["autogroup:nonroot"]},
                ],
                "nodeAttrs": [{"target": ["*"], "attr": ["funnel"]}],
            }"#,
        )
        .unwrap();

        assert!(policy.is_group_member("group:eng", "alice@example.com"));
        assert!(!policy.is_group_member("group:eng", "bob@example.com"));
        assert_eq!(policy.host("db"), Some("10.0.0.5/32".parse().unwrap()));
        assert_eq!(policy.tag_owners["tag:server"], vec![Alias::Group("group:eng".into())]);
        assert_eq!(policy.auto_approvers.route_entries().count(), 1);
        assert_eq!(policy.ssh.len(), 1);
        assert_eq!(policy.node_attrs[0].attr, vec!["funnel".to_string()]);
    }

    #[test]
    fn test_host_named_like_a_prefix_wins() {
        let policy = AclPolicy::parse(
            r#"{
                "hosts": {"10.0.0.0/8": "100.64.0.5"},
                "acls": [
                    {"action": "accept", "src": ["10.0.0.0/8"], "dst": ["192.168.0.0/16:*"]},
                ],
            }"#,
        )
        .unwrap();

        let acl = &policy.acls[0];
        assert_eq!(acl.src, vec![Alias::Host("10.0.0.0/8".into())]);
        assert_eq!(
            policy.host("10.0.0.0/8"),
            Some("100.64.0.5/32".parse().unwrap())
        );
        // literals with no host entry stay literal
        assert_eq!(
            acl.dst[0].alias,
            Alias::Prefix("192.168.0.0/16".parse().unwrap())
        );
    }

    #[test]
    fn test_rejects_bad_sections() {
        assert!(matches!(
            AclPolicy::parse(r#"{"groups": {"eng": []}}"#),
            Err(Error::Invalid(ValidationError::InvalidGroupName(_)))
        ));
        assert!(matches!(
            AclPolicy::parse(r#"{"hosts": {"db": "not-an-ip"}}"#),
            Err(Error::Invalid(ValidationError::InvalidHost { .. }))
        ));
        assert!(matches!(
            AclPolicy::parse(r#"{"tagOwners": {"server": []}}"#),
            Err(Error::Invalid(ValidationError::InvalidTagOwner(_)))
        ));
        assert!(matches!(
            AclPolicy::parse(r#"{"acls": [{"action": "accept", "src": [], "dst": ["*:*"]}]}"#),
            Err(Error::InvalidAcl { index: 0, .. })
        ));
        assert!(matches!(
            AclPolicy::parse(r#"{"acls": [{"action": "accept", "src": ["*"], "dst": ["*"]}]}"#),
            Err(Error::ParseJson(_))
        ));
    }
}
