//! the policy evaluation engine.
//!
//! acl entries and grants are compiled into one list of rules at
//! construction. peer visibility and packet filters are both derived from
//! that list, so a peer is visible exactly when some filter rule admits it.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::IpAddr;
use std::sync::Arc;

use ipnet::IpNet;
use tidescale_proto::{CapGrant, CapMap, FilterRule, NetPortRange};
use tidescale_types::{Node, User, UserId};

use crate::alias::{Alias, Autogroup};
use crate::capability::NetworkCapability;
use crate::error::Result;
use crate::policy::AclPolicy;

/// looks up the users that own nodes.
pub trait UserResolver {
    /// the user with this id, if known.
    fn resolve_user(&self, user_id: UserId) -> Option<&User>;
}

impl UserResolver for HashMap<UserId, User> {
    fn resolve_user(&self, user_id: UserId) -> Option<&User> {
        self.get(&user_id)
    }
}

/// a compiled acl entry or grant.
#[derive(Debug)]
struct Rule {
    src: Vec<Alias>,
    dst: Vec<Destination>,
    app: CapMap,
}

#[derive(Debug)]
struct Destination {
    alias: Alias,
    caps: Vec<NetworkCapability>,
}

impl Destination {
    fn is_self(&self) -> bool {
        self.alias == Alias::Autogroup(Autogroup::SelfDevices)
    }
}

/// which destinations of a rule are being expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// `autogroup:self`: only sources owned by the destination's user.
    SameOwner,
    /// everything else.
    Other,
}

/// thread-safe policy evaluation engine.
///
/// cheap to clone. every method is pure.
#[derive(Debug, Clone)]
pub struct PolicyEngine {
    policy: Arc<AclPolicy>,
    rules: Arc<[Rule]>,
}

impl PolicyEngine {
    /// compile a policy.
    pub fn new(policy: AclPolicy) -> Self {
        // devices of one person can always reach each other
        let mut rules = vec![Rule {
            src: vec![Alias::Autogroup(Autogroup::Member)],
            dst: vec![Destination {
                alias: Alias::Autogroup(Autogroup::SelfDevices),
                caps: vec![NetworkCapability::WILDCARD],
            }],
            app: CapMap::new(),
        }];

        for acl in &policy.acls {
            rules.push(Rule {
                src: acl.src.clone(),
                dst: acl
                    .destinations()
                    .map(|(alias, caps)| Destination {
                        alias: alias.clone(),
                        caps,
                    })
                    .collect(),
                app: CapMap::new(),
            });
        }

        for grant in &policy.grants {
            rules.push(Rule {
                src: grant.src.clone(),
                dst: grant
                    .dst
                    .iter()
                    .map(|alias| Destination {
                        alias: alias.clone(),
                        caps: grant.ip.clone(),
                    })
                    .collect(),
                app: grant.app.clone(),
            });
        }

        Self {
            policy: Arc::new(policy),
            rules: rules.into(),
        }
    }

    /// parse and compile a stored policy document.
    pub fn from_document(text: &str) -> Result<Self> {
        Ok(Self::new(AclPolicy::parse(text)?))
    }

    /// an engine for the default allow-all policy.
    pub fn allow_all() -> Self {
        Self::new(AclPolicy::allow_all())
    }

    /// the policy this engine was built from.
    pub fn policy(&self) -> &AclPolicy {
        &self.policy
    }

    /// whether `src` may open connections to `dst`.
    ///
    /// always true for two untagged nodes of the same user.
    pub fn is_valid_peer(&self, src: &Node, dst: &Node, users: &dyn UserResolver) -> bool {
        self.rules.iter().any(|rule| {
            rule.src.iter().any(|a| self.node_matches(a, src, users))
                && rule.dst.iter().any(|d| {
                    (!d.caps.is_empty() || !rule.app.is_empty())
                        && !self.dst_targets(&d.alias, dst, src, users).is_empty()
                })
        })
    }

    /// packet filter for `dst`, listing who among `peers` may reach it.
    ///
    /// returns a single [`FilterRule::deny_all`] when nothing matches.
    pub fn build_filter_rules(
        &self,
        peers: &[Node],
        dst: &Node,
        users: &dyn UserResolver,
    ) -> Vec<FilterRule> {
        let mut rules = Vec::new();

        for rule in self.rules.iter() {
            for scope in [Scope::SameOwner, Scope::Other] {
                let targets: Vec<(&Destination, Vec<IpNet>)> = rule
                    .dst
                    .iter()
                    .filter(|d| d.is_self() == (scope == Scope::SameOwner))
                    .map(|d| (d, self.dst_targets(&d.alias, dst, dst, users)))
                    .filter(|(_, t)| !t.is_empty())
                    .collect();
                if targets.is_empty() {
                    continue;
                }

                let candidates: Vec<&Node> = match scope {
                    Scope::SameOwner => peers.iter().filter(|p| same_owner(p, dst)).collect(),
                    Scope::Other => peers.iter().collect(),
                };
                let src_ips = self.source_ips(&rule.src, &candidates, scope, users);
                if src_ips.is_empty() {
                    continue;
                }

                let mut by_proto: BTreeMap<Vec<i32>, Vec<NetPortRange>> = BTreeMap::new();
                for (d, nets) in &targets {
                    for cap in &d.caps {
                        let ports = by_proto.entry(cap.ip_proto()).or_default();
                        for net in nets {
                            let range = NetPortRange {
                                ip: render_net(net),
                                ports: cap.wire_ports(),
                            };
                            if !ports.contains(&range) {
                                ports.push(range);
                            }
                        }
                    }
                }
                for (ip_proto, dst_ports) in by_proto {
                    rules.push(FilterRule {
                        src_ips: src_ips.clone(),
                        dst_ports,
                        ip_proto,
                        cap_grant: vec![],
                    });
                }

                if !rule.app.is_empty() {
                    let dsts: BTreeSet<String> = targets
                        .iter()
                        .flat_map(|(_, nets)| nets.iter().map(|n| n.to_string()))
                        .collect();
                    rules.push(FilterRule {
                        src_ips,
                        dst_ports: vec![],
                        ip_proto: vec![],
                        cap_grant: vec![CapGrant {
                            dsts: dsts.into_iter().collect(),
                            cap_map: rule.app.clone(),
                        }],
                    });
                }
            }
        }

        if rules.is_empty() {
            rules.push(FilterRule::deny_all());
        }
        rules
    }

    /// capabilities granted to `node` through `nodeAttrs`.
    pub fn node_capabilities(&self, node: &Node, users: &dyn UserResolver) -> CapMap {
        let mut caps = CapMap::new();
        for attr in &self.policy.node_attrs {
            if attr.target.iter().any(|a| self.node_matches(a, node, users)) {
                for name in &attr.attr {
                    caps.entry(name.clone()).or_default();
                }
            }
        }
        caps
    }

    /// whether `node` is one of the nodes `alias` names, judged on its own.
    ///
    /// aliases that only make sense relative to another node
    /// (`autogroup:self`) or that do not name nodes never match here.
    pub(crate) fn node_matches(&self, alias: &Alias, node: &Node, users: &dyn UserResolver) -> bool {
        match alias {
            Alias::Wildcard | Alias::Autogroup(Autogroup::DangerAll) => true,
            Alias::Autogroup(Autogroup::Member) => !node.is_tagged(),
            Alias::Autogroup(Autogroup::Tagged) => node.is_tagged(),
            Alias::Autogroup(
                Autogroup::SelfDevices | Autogroup::Internet | Autogroup::NonRoot,
            ) => false,
            Alias::User(login) => {
                !node.is_tagged() && owner_login(node, users).is_some_and(|l| l == login)
            }
            Alias::Group(group) => {
                !node.is_tagged()
                    && owner_login(node, users)
                        .is_some_and(|l| self.policy.is_group_member(group, l))
            }
            Alias::Tag(tag) => node.has_tag(tag),
            Alias::Host(name) => self
                .policy
                .host(name)
                .is_some_and(|net| node.ips().any(|ip| net.contains(&ip))),
            Alias::Prefix(net) => node.ips().any(|ip| net.contains(&ip)),
        }
    }

    /// the networks of `dst` that `alias` names, as seen from `src`.
    ///
    /// empty when the alias does not cover `dst`.
    fn dst_targets(&self, alias: &Alias, dst: &Node, src: &Node, users: &dyn UserResolver) -> Vec<IpNet> {
        let own = || dst.ips().map(IpNet::from).collect::<Vec<_>>();
        match alias {
            Alias::Wildcard | Alias::Autogroup(Autogroup::DangerAll) => {
                let mut nets = own();
                nets.extend(dst.subnet_routes());
                nets
            }
            Alias::Autogroup(Autogroup::SelfDevices) => {
                if same_owner(src, dst) {
                    own()
                } else {
                    vec![]
                }
            }
            Alias::Autogroup(Autogroup::Internet) => dst
                .allowed_routes()
                .into_iter()
                .filter(tidescale_types::is_exit_route)
                .collect(),
            Alias::Prefix(net) => prefix_targets(*net, dst),
            Alias::Host(name) => self
                .policy
                .host(name)
                .map(|net| prefix_targets(net, dst))
                .unwrap_or_default(),
            other => {
                if self.node_matches(other, dst, users) {
                    own()
                } else {
                    vec![]
                }
            }
        }
    }

    /// the source set a rule's `src` expands to over `candidates`.
    ///
    /// in the same-owner scope every alias is matched node by node, since
    /// only the owner's devices may appear. otherwise wildcards and literal
    /// networks are passed through as written.
    fn source_ips(
        &self,
        aliases: &[Alias],
        candidates: &[&Node],
        scope: Scope,
        users: &dyn UserResolver,
    ) -> Vec<String> {
        let mut ips = BTreeSet::new();

        for alias in aliases {
            if scope == Scope::Other {
                match alias {
                    Alias::Wildcard | Alias::Autogroup(Autogroup::DangerAll) => {
                        ips.insert("*".to_string());
                        continue;
                    }
                    Alias::Prefix(net) => {
                        ips.insert(render_net(net));
                        continue;
                    }
                    Alias::Host(name) => {
                        if let Some(net) = self.policy.host(name) {
                            ips.insert(render_net(&net));
                        }
                        continue;
                    }
                    _ => {}
                }
            }
            for node in candidates {
                if self.node_matches(alias, node, users) {
                    ips.extend(node.ips().map(|ip| ip.to_string()));
                }
            }
        }
        ips.into_iter().collect()
    }
}

/// two untagged nodes of the same user.
pub(crate) fn same_owner(a: &Node, b: &Node) -> bool {
    !a.is_tagged() && !b.is_tagged() && a.user_id() == b.user_id()
}

fn owner_login<'a>(node: &Node, users: &'a dyn UserResolver) -> Option<&'a str> {
    users.resolve_user(node.user_id()).map(User::login_name)
}

/// the parts of `net` that belong to `dst`: its own addresses inside `net`
/// and the overlap with the subnets it routes.
fn prefix_targets(net: IpNet, dst: &Node) -> Vec<IpNet> {
    let mut nets: Vec<IpNet> = dst
        .ips()
        .filter(|ip| net.contains(ip))
        .map(IpNet::from)
        .collect();
    for route in dst.subnet_routes() {
        if route.contains(&net) {
            nets.push(net);
        } else if net.contains(&route) {
            nets.push(route);
        }
    }
    nets
}

/// single addresses are written bare, networks with their length.
fn render_net(net: &IpNet) -> String {
    if net.prefix_len() == net.max_prefix_len() {
        net.addr().to_string()
    } else {
        net.to_string()
    }
}

/// whether a filter source list covers `ip`.
pub fn src_covers(src_ips: &[String], ip: IpAddr) -> bool {
    src_ips.iter().any(|s| {
        s == "*"
            || s.parse::<IpAddr>().is_ok_and(|a| a == ip)
            || s.parse::<IpNet>().is_ok_and(|n| n.contains(&ip))
    })
}

#[cfg(test)]
mod tests {
    use tidescale_proto::PortRange;
    use tidescale_types::test_utils::TestNodeBuilder;
    use tidescale_types::{Tag, TailnetId};

    use super::*;

    fn users() -> HashMap<UserId, User> {
        (1..=3)
            .map(|id| {
                let login = format!("user{id}@example.com");
                (UserId(id), User::new(UserId(id), TailnetId(1), login))
            })
            .collect()
    }

    fn tagged(id: u64, tag: &str) -> Node {
        TestNodeBuilder::new(id)
            .with_user_id(UserId(1))
            .with_tags(vec![tag.parse::<Tag>().unwrap()])
            .build()
    }

    fn engine(doc: &str) -> PolicyEngine {
        PolicyEngine::from_document(doc).unwrap()
    }

    #[test]
    fn test_default_policy_connects_everyone() {
        let engine = PolicyEngine::allow_all();
        let a = TestNodeBuilder::new(1).build();
        let b = TestNodeBuilder::new(2).build();
        let server = tagged(3, "tag:server");
        for (src, dst) in [(&a, &b), (&b, &a), (&a, &server), (&server, &b)] {
            assert!(engine.is_valid_peer(src, dst, &users()));
        }

        let rules = engine.build_filter_rules(&[a.clone(), server], &b, &users());
        assert!(rules.iter().any(|r| r.src_ips == vec!["*".to_string()]));
    }

    #[test]
    fn test_empty_object_only_allows_same_owner() {
        let engine = engine("{}");
        let laptop = TestNodeBuilder::new(1).with_user_id(UserId(1)).build();
        let phone = TestNodeBuilder::new(2).with_user_id(UserId(1)).build();
        let other = TestNodeBuilder::new(3).with_user_id(UserId(2)).build();

        assert!(engine.is_valid_peer(&laptop, &phone, &users()));
        assert!(!engine.is_valid_peer(&other, &phone, &users()));

        let rules = engine.build_filter_rules(&[laptop.clone(), other.clone()], &phone, &users());
        assert_eq!(rules.len(), 1);
        assert!(src_covers(&rules[0].src_ips, laptop.ipv4().unwrap().into()));
        assert!(!src_covers(&rules[0].src_ips, other.ipv4().unwrap().into()));
    }

    #[test]
    fn test_deny_all_sentinel() {
        let engine = engine("{}");
        let a = TestNodeBuilder::new(1).build();
        let b = TestNodeBuilder::new(2).build();
        let rules = engine.build_filter_rules(&[a], &b, &users());
        assert_eq!(rules, vec![FilterRule::deny_all()]);
        assert!(rules[0].is_deny_all());
    }

    #[test]
    fn test_tagged_destination_filter() {
        let engine = engine(
            r#"{
                "tagOwners": {"tag:server": ["user1@example.com"]},
                "acls": [{"action": "accept", "src": ["autogroup:tagged"], "dst": ["tag:server:22"]}]
            }"#,
        );
        let server = tagged(1, "tag:server");
        let ci = tagged(2, "tag:ci");
        let laptop = TestNodeBuilder::new(3).with_user_id(UserId(1)).build();

        assert!(engine.is_valid_peer(&ci, &server, &users()));
        assert!(!engine.is_valid_peer(&laptop, &server, &users()));
        assert!(!engine.is_valid_peer(&server, &laptop, &users()));

        let rules = engine.build_filter_rules(&[ci.clone(), laptop.clone()], &server, &users());
        assert_eq!(rules.len(), 1);
        let rule = &rules[0];
        assert!(src_covers(&rule.src_ips, ci.ipv4().unwrap().into()));
        assert!(!src_covers(&rule.src_ips, laptop.ipv4().unwrap().into()));
        assert!(rule.ip_proto.is_empty());
        assert!(rule.dst_ports.iter().all(|d| d.ports == PortRange::single(22)));
        assert!(rule
            .dst_ports
            .iter()
            .any(|d| d.ip == server.ipv4().unwrap().to_string()));
    }

    #[test]
    fn test_groups_and_users() {
        let engine = engine(
            r#"{
                "groups": {"group:eng": ["user2@example.com"]},
                "acls": [
                    {"action": "accept", "src": ["group:eng"], "dst": ["user1@example.com:*"]},
                    {"action": "accept", "src": ["user3@example.com"], "dst": ["group:eng:443"]}
                ]
            }"#,
        );
        let one = TestNodeBuilder::new(1).build();
        let two = TestNodeBuilder::new(2).build();
        let three = TestNodeBuilder::new(3).build();

        assert!(engine.is_valid_peer(&two, &one, &users()));
        assert!(!engine.is_valid_peer(&one, &two, &users()));
        assert!(engine.is_valid_peer(&three, &two, &users()));
        assert!(!engine.is_valid_peer(&three, &one, &users()));
    }

    #[test]
    fn test_tagged_nodes_never_match_person_aliases() {
        let engine = engine(
            r#"{"acls": [{"action": "accept", "src": ["user1@example.com", "autogroup:member"], "dst": ["*:*"]}]}"#,
        );
        let server = tagged(1, "tag:server");
        let laptop = TestNodeBuilder::new(2).build();
        assert!(!engine.is_valid_peer(&server, &laptop, &users()));
    }

    #[test]
    fn test_subnet_routes_in_destinations() {
        let route: IpNet = "10.0.0.0/24".parse().unwrap();
        let engine = engine(
            r#"{"acls": [{"action": "accept", "src": ["*"], "dst": ["10.0.0.0/16:80"]}]}"#,
        );
        let router = TestNodeBuilder::new(1)
            .with_routes(vec![route])
            .with_approved_routes(vec![route])
            .build();
        let client = TestNodeBuilder::new(2).build();

        assert!(engine.is_valid_peer(&client, &router, &users()));
        let rules = engine.build_filter_rules(&[client], &router, &users());
        assert_eq!(rules[0].dst_ports[0].ip, "10.0.0.0/24");
    }

    #[test]
    fn test_internet_destination_requires_exit_route() {
        let exit: IpNet = "0.0.0.0/0".parse().unwrap();
        let engine = engine(
            r#"{"acls": [{"action": "accept", "src": ["*"], "dst": ["autogroup:internet:*"]}]}"#,
        );
        let exit_node = TestNodeBuilder::new(1)
            .with_routes(vec![exit])
            .with_approved_routes(vec![exit])
            .build();
        let plain = TestNodeBuilder::new(2).build();
        assert!(engine.is_valid_peer(&plain, &exit_node, &users()));
        assert!(!engine.is_valid_peer(&exit_node, &plain, &users()));
    }

    #[test]
    fn test_app_grants_become_cap_grants() {
        let engine = engine(
            r#"{"grants": [{"src": ["*"], "dst": ["tag:web"], "app": {"example.com/cap/web": [{"role": "viewer"}]}}]}"#,
        );
        let web = tagged(1, "tag:web");
        let client = TestNodeBuilder::new(2).build();

        assert!(engine.is_valid_peer(&client, &web, &users()));
        let rules = engine.build_filter_rules(&[client], &web, &users());
        let grant = rules
            .iter()
            .find(|r| !r.cap_grant.is_empty())
            .expect("cap grant rule");
        assert!(grant.cap_grant[0].cap_map.contains_key("example.com/cap/web"));
        assert!(grant.dst_ports.is_empty());
    }

    #[test]
    fn test_node_capabilities_from_node_attrs() {
        let engine = engine(
            r#"{"nodeAttrs": [{"target": ["tag:server"], "attr": ["funnel", "drive:share"]}]}"#,
        );
        let server = tagged(1, "tag:server");
        let laptop = TestNodeBuilder::new(2).build();
        let caps = engine.node_capabilities(&server, &users());
        assert!(caps.contains_key("funnel"));
        assert!(caps.contains_key("drive:share"));
        assert!(engine.node_capabilities(&laptop, &users()).is_empty());
    }

    #[test]
    fn test_src_covers() {
        let srcs = vec!["100.64.0.1".to_string(), "10.0.0.0/8".to_string()];
        assert!(src_covers(&srcs, "100.64.0.1".parse().unwrap()));
        assert!(src_covers(&srcs, "10.9.9.9".parse().unwrap()));
        assert!(!src_covers(&srcs, "100.64.0.2".parse().unwrap()));
        assert!(src_covers(&["*".to_string()], "::1".parse().unwrap()));
    }
}
