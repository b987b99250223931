//! automatic approval of advertised routes.

use std::collections::BTreeSet;

use ipnet::IpNet;
use tidescale_types::{Tag, User, is_exit_route};

use crate::alias::{Alias, Autogroup};
use crate::engine::PolicyEngine;

impl PolicyEngine {
    /// the subset of `routes` that `autoApprovers` approves for a node with
    /// `tags` owned by `user`.
    ///
    /// computed from scratch on every call: a route that is no longer
    /// advertised drops out.
    pub fn find_auto_approved_ips(&self, routes: &[IpNet], tags: &[Tag], user: &User) -> Vec<IpNet> {
        let approvers = &self.policy().auto_approvers;
        let mut approved = BTreeSet::new();

        for route in routes {
            let ok = if is_exit_route(route) {
                approvers
                    .exit_node
                    .iter()
                    .any(|a| self.approver_matches(a, tags, user))
            } else {
                approvers.route_entries().any(|(prefix, list)| {
                    prefix.contains(route) && list.iter().any(|a| self.approver_matches(a, tags, user))
                })
            };
            if ok {
                approved.insert(*route);
            }
        }
        approved.into_iter().collect()
    }

    /// tagged nodes are approved through their tags only.
    fn approver_matches(&self, approver: &Alias, tags: &[Tag], user: &User) -> bool {
        match approver {
            Alias::Wildcard => true,
            Alias::Tag(tag) => tags.iter().any(|t| t == tag.as_str()),
            Alias::Autogroup(Autogroup::Tagged) => !tags.is_empty(),
            Alias::User(login) => tags.is_empty() && login == user.login_name(),
            Alias::Group(group) => {
                tags.is_empty() && self.policy().is_group_member(group, user.login_name())
            }
            Alias::Autogroup(Autogroup::Member) => tags.is_empty(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use tidescale_types::{TailnetId, UserId};

    use super::*;
    use crate::policy::AclPolicy;

    fn engine() -> PolicyEngine {
        PolicyEngine::new(
            AclPolicy::parse(
                r#"{
                    "groups": {"group:net": ["alice@example.com"]},
                    "autoApprovers": {
                        "routes": {
                            "10.0.0.0/8": ["tag:router"],
                            "192.168.0.0/16": ["group:net"]
                        },
                        "exitNode": ["tag:exit"]
                    }
                }"#,
            )
            .unwrap(),
        )
    }

    fn net(s: &str) -> IpNet {
        s.parse().unwrap()
    }

    fn alice() -> User {
        User::new(UserId(1), TailnetId(1), "alice@example.com")
    }

    #[test]
    fn test_tag_approves_routes_inside_prefix() {
        let engine = engine();
        let tags = Tag::parse_all(["tag:router"]).unwrap();
        let approved = engine.find_auto_approved_ips(
            &[net("10.1.0.0/16"), net("172.16.0.0/12")],
            &tags,
            &alice(),
        );
        assert_eq!(approved, vec![net("10.1.0.0/16")]);
    }

    #[test]
    fn test_group_approves_untagged_only() {
        let engine = engine();
        let routes = [net("192.168.1.0/24")];
        assert_eq!(
            engine.find_auto_approved_ips(&routes, &[], &alice()),
            vec![net("192.168.1.0/24")]
        );
        let tags = Tag::parse_all(["tag:router"]).unwrap();
        assert!(engine.find_auto_approved_ips(&routes, &tags, &alice()).is_empty());
    }

    #[test]
    fn test_exit_routes() {
        let engine = engine();
        let exit = Tag::parse_all(["tag:exit"]).unwrap();
        let routes = [net("0.0.0.0/0"), net("::/0")];
        assert_eq!(engine.find_auto_approved_ips(&routes, &exit, &alice()).len(), 2);
        assert!(engine.find_auto_approved_ips(&routes, &[], &alice()).is_empty());
    }
}
