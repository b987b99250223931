//! network map construction.
//!
//! [`Mapper`] renders a node's view of its tailnet from storage: its own
//! record, the peers the policy lets it see, the packet filter, ssh rules,
//! dns and relay settings. [`Synchronizer`] owns a [`MapSession`] and turns
//! successive snapshots into the full-then-delta stream a poll sends.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Utc;
use ipnet::IpNet;
use tidescale_db::{Repository, TidescaleDb};
use tidescale_policy::{Claims, IamPolicy, PolicyEngine};
use tidescale_proto::{
    CAP_ADMIN, CAP_FILE_SHARING, CAP_FUNNEL, CAP_FUNNEL_PORTS, CAP_HTTPS, CAP_SSH, CapMap,
    DnsConfig, DnsResolver, MapResponse, MapResponseNode, UserProfile,
};
use tidescale_types::{Config, DerpMap, Node, NodeId, Tailnet, User, UserId, is_exit_route};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::broker::Broker;
use crate::error::{Error, Result};
use crate::map_session::MapSession;

/// renders network maps from storage.
#[derive(Clone)]
pub struct Mapper {
    db: TidescaleDb,
    config: Config,
    broker: Broker,
}

impl Mapper {
    /// create a mapper.
    pub fn new(db: TidescaleDb, config: Config, broker: Broker) -> Self {
        Self { db, config, broker }
    }

    /// build the complete network map for `node_id`.
    ///
    /// with `omit_peers` the peer list is left out but the node's own
    /// record, filter and settings are still rendered.
    pub async fn build_snapshot(&self, node_id: NodeId, omit_peers: bool) -> Result<MapResponse> {
        let node = self
            .db
            .get_node(node_id)
            .await?
            .ok_or_else(|| Error::not_found("node", node_id))?;
        let tailnet = self
            .db
            .get_tailnet(node.tailnet_id())
            .await?
            .ok_or_else(|| Error::not_found("tailnet", node.tailnet_id()))?;

        let users: HashMap<UserId, User> = self
            .db
            .list_users(tailnet.id)
            .await?
            .into_iter()
            .map(|u| (u.id, u))
            .collect();

        let engine = PolicyEngine::from_document(&tailnet.acl_policy).map_err(Error::internal)?;

        // unauthorized machines take no part in anyone's map
        let candidates: Vec<Node> = self
            .db
            .list_peers(tailnet.id, node.id())
            .await?
            .into_iter()
            .filter(|p| p.authorized())
            .collect();

        let mut peers: Vec<&Node> = if omit_peers {
            Vec::new()
        } else {
            candidates
                .iter()
                .filter(|p| {
                    engine.is_valid_peer(&node, p, &users) || engine.is_valid_peer(p, &node, &users)
                })
                .collect()
        };
        peers.sort_by_key(|p| p.id());

        let primaries = primary_routes(&node, &peers);
        let domain = self.tailnet_domain(&tailnet);

        let mut self_node = self.render_node(&node, &tailnet, &domain, &primaries, None);
        self_node.cap_map = Some(self.self_capabilities(&node, &tailnet, &engine, &users));

        let rendered_peers = peers
            .iter()
            .map(|peer| {
                let online = self.broker.has_session(tailnet.id, peer.id());
                self.render_node(peer, &tailnet, &domain, &primaries, Some(online))
            })
            .collect();

        let packet_filter = engine.build_filter_rules(&candidates, &node, &users);
        let ssh_policy = tailnet
            .ssh
            .then(|| engine.build_ssh_policy(&candidates, &node, &users));

        debug!(
            node_id = %node.id(),
            tailnet = %tailnet.name,
            peers = peers.len(),
            "built network map"
        );

        Ok(MapResponse {
            node: Some(self_node),
            peers: (!omit_peers).then_some(rendered_peers),
            dns_config: Some(self.dns_config(&node, &tailnet, &domain)),
            derp_map: Some(self.derp_map(&tailnet)),
            packet_filter: Some(packet_filter),
            user_profiles: user_profiles(&node, &peers, &tailnet, &users),
            ssh_policy,
            collect_services: Some(tailnet.service_collection),
            domain,
            control_time: Some(Utc::now().to_rfc3339()),
            ..Default::default()
        })
    }

    /// `<tailnet>.<base_domain>`
    fn tailnet_domain(&self, tailnet: &Tailnet) -> String {
        format!("{}.{}", tailnet.name, self.config.base_domain)
    }

    /// the relay map in effect: the tailnet override or the server default.
    fn derp_map(&self, tailnet: &Tailnet) -> DerpMap {
        tailnet
            .derp_map
            .clone()
            .unwrap_or_else(|| self.config.derp.clone())
    }

    fn render_node(
        &self,
        node: &Node,
        tailnet: &Tailnet,
        domain: &str,
        primaries: &HashMap<NodeId, Vec<IpNet>>,
        online: Option<bool>,
    ) -> MapResponseNode {
        let addresses: Vec<String> = node.ips().map(|ip| IpNet::from(ip).to_string()).collect();
        let primary: Vec<String> = primaries
            .get(&node.id())
            .map(|routes| routes.iter().map(IpNet::to_string).collect())
            .unwrap_or_default();

        let mut allowed_ips = addresses.clone();
        allowed_ips.extend(primary.iter().cloned());
        allowed_ips.extend(
            node.allowed_routes()
                .iter()
                .filter(|r| is_exit_route(r))
                .map(IpNet::to_string),
        );

        let hostinfo = node.hostinfo().cloned().map(|mut hostinfo| {
            if !tailnet.service_collection {
                hostinfo.services.retain(|s| s.proto.is_peerapi());
            }
            hostinfo
        });
        let home_derp = node
            .hostinfo()
            .and_then(|h| h.net_info.as_ref())
            .map(|n| n.preferred_derp)
            .unwrap_or_default();

        let key_expiry = if node.key_expiry_disabled() {
            None
        } else {
            node.expiry().map(|e| e.to_rfc3339())
        };

        MapResponseNode {
            id: node.id().as_u64(),
            stable_id: node.id().stable_id(),
            name: format!("{}.{}.", node.display_name(), domain),
            user: profile_owner(node).0,
            node_key: *node.node_key(),
            key_expiry,
            machine_key: *node.machine_key(),
            disco_key: *node.disco_key(),
            addresses,
            allowed_ips,
            endpoints: node.endpoints().iter().map(|e| e.to_string()).collect(),
            home_derp,
            hostinfo,
            created: node.created_at().to_rfc3339(),
            online,
            last_seen: node.last_seen().map(|t| t.to_rfc3339()),
            tags: node.tags().iter().map(|t| t.to_string()).collect(),
            primary_routes: primary,
            machine_authorized: node.authorized(),
            expired: node.is_expired(),
            cap: 0,
            cap_map: None,
        }
    }

    /// capabilities of the node a map is built for. peers never carry any.
    fn self_capabilities(
        &self,
        node: &Node,
        tailnet: &Tailnet,
        engine: &PolicyEngine,
        users: &HashMap<UserId, User>,
    ) -> CapMap {
        let mut caps = engine.node_capabilities(node, users);

        if tailnet.file_sharing {
            caps.entry(CAP_FILE_SHARING.to_string()).or_default();
        }
        if tailnet.ssh {
            caps.entry(CAP_SSH.to_string()).or_default();
        }
        if tailnet.dns.https_certs {
            caps.entry(CAP_HTTPS.to_string()).or_default();
        }
        if self.is_admin(node, tailnet, users) {
            caps.entry(CAP_ADMIN.to_string()).or_default();
        }

        caps.retain(|name, _| name != CAP_FUNNEL && !name.starts_with(CAP_FUNNEL_PORTS));
        caps
    }

    /// whether the node's user holds the admin role. tagged nodes never do.
    fn is_admin(&self, node: &Node, tailnet: &Tailnet, users: &HashMap<UserId, User>) -> bool {
        if node.is_tagged() {
            return false;
        }
        let Some(user) = users.get(&node.user_id()) else {
            return false;
        };

        let policy = match IamPolicy::parse(&tailnet.iam_policy) {
            Ok(policy) => policy,
            Err(e) => {
                warn!(tailnet = %tailnet.name, error = %e, "invalid iam policy, skipping admin check");
                return false;
            }
        };
        match policy.evaluate_role(&Claims::for_user(user)) {
            Ok(role) => role.is_admin(),
            Err(e) => {
                warn!(user = %user.login_name(), error = %e, "iam filter failed, skipping admin check");
                false
            }
        }
    }

    fn dns_config(&self, node: &Node, tailnet: &Tailnet, domain: &str) -> DnsConfig {
        let dns = &tailnet.dns;
        let mut config = DnsConfig {
            resolvers: dns
                .nameservers
                .iter()
                .map(|ip| DnsResolver::new(ip.to_string()))
                .collect(),
            routes: dns
                .routes
                .iter()
                .map(|(suffix, servers)| {
                    let servers = servers.iter().map(|ip| DnsResolver::new(ip.to_string()));
                    (suffix.clone(), servers.collect())
                })
                .collect(),
            ..Default::default()
        };

        if dns.magic_dns {
            // an empty route means the client answers from its own peer list
            config.domains.push(domain.to_string());
            config.routes.entry(format!("{domain}.")).or_default();
            config.proxied = true;
        }
        config.domains.extend(dns.search_domains.iter().cloned());

        if dns.https_certs {
            config
                .cert_domains
                .push(format!("{}.{}", node.display_name(), domain));
        }
        config
    }
}

/// the user id a node is presented under.
fn profile_owner(node: &Node) -> UserId {
    if node.is_tagged() {
        UserId::TAGGED_DEVICES
    } else {
        node.user_id()
    }
}

/// assign each approved subnet route to a single router.
///
/// the lowest node id advertising a route wins. the choice holds for this
/// snapshot only.
fn primary_routes(node: &Node, peers: &[&Node]) -> HashMap<NodeId, Vec<IpNet>> {
    let mut routers: Vec<&Node> = peers.to_vec();
    routers.push(node);
    routers.sort_by_key(|n| n.id());

    let mut claimed = HashSet::new();
    let mut primaries: HashMap<NodeId, Vec<IpNet>> = HashMap::new();
    for router in routers {
        for route in router.subnet_routes() {
            if claimed.insert(route) {
                primaries.entry(router.id()).or_default().push(route);
            }
        }
    }
    primaries
}

/// one profile per distinct owner among the node and its peers.
fn user_profiles(
    node: &Node,
    peers: &[&Node],
    tailnet: &Tailnet,
    users: &HashMap<UserId, User>,
) -> Vec<UserProfile> {
    let mut profiles = BTreeMap::new();
    for n in std::iter::once(node).chain(peers.iter().copied()) {
        let owner = profile_owner(n);
        if profiles.contains_key(&owner.0) {
            continue;
        }
        let user = if owner == UserId::TAGGED_DEVICES {
            User::tagged_devices(tailnet.id)
        } else {
            match users.get(&owner) {
                Some(user) => user.clone(),
                None => {
                    warn!(node_id = %n.id(), user_id = owner.0, "node owner missing, no profile");
                    continue;
                }
            }
        };
        profiles.insert(
            owner.0,
            UserProfile {
                id: owner.0,
                login_name: user.login_name().to_string(),
                display_name: user.display().to_string(),
                profile_pic_url: user.profile_pic_url.clone(),
            },
        );
    }
    profiles.into_values().collect()
}

/// per-session map state for one polling node.
///
/// the session is behind an async mutex so the signal path and the sync
/// path never build snapshots concurrently.
pub struct Synchronizer {
    mapper: Mapper,
    node_id: NodeId,
    omit_peers: bool,
    session: Mutex<MapSession>,
}

impl Synchronizer {
    /// a synchronizer for `node_id`. `omit_peers` leaves peers out of every map.
    pub fn new(mapper: Mapper, node_id: NodeId, omit_peers: bool) -> Self {
        let handle = hex::encode(rand::random::<[u8; 8]>());
        Self {
            mapper,
            node_id,
            omit_peers,
            session: Mutex::new(MapSession::new(handle)),
        }
    }

    /// a full snapshot, resetting what the client is known to hold.
    pub async fn full(&self) -> Result<MapResponse> {
        let mut session = self.session.lock().await;
        let snapshot = self.mapper.build_snapshot(self.node_id, self.omit_peers).await?;
        Ok(session.apply_full(snapshot))
    }

    /// only what changed since the previous frame.
    pub async fn delta(&self) -> Result<MapResponse> {
        let mut session = self.session.lock().await;
        let snapshot = self.mapper.build_snapshot(self.node_id, self.omit_peers).await?;
        Ok(session.compute_delta(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::time::Duration;

    use tidescale_db::embed_v6;
    use tidescale_types::test_utils::TestNodeBuilder;
    use tidescale_types::{HostInfo, Service, ServiceProto, Tag, TailnetId};
    use tokio::sync::mpsc;

    use super::*;
    use crate::broker::SessionRegistry;

    struct Fixture {
        db: TidescaleDb,
        tailnet: Tailnet,
        alice: User,
        bob: User,
        mapper: Mapper,
        broker: Broker,
    }

    async fn fixture(tailnet: Tailnet) -> Fixture {
        let db = TidescaleDb::new_in_memory().await.unwrap();
        let tailnet = db.create_tailnet(&tailnet).await.unwrap();
        let alice = db
            .create_user(&User::new(UserId(0), tailnet.id, "alice@example.com"))
            .await
            .unwrap();
        let bob = db
            .create_user(&User::new(UserId(0), tailnet.id, "bob@example.com"))
            .await
            .unwrap();
        let broker = Broker::new(Duration::ZERO);
        let mapper = Mapper::new(db.clone(), Config::default(), broker.clone());
        Fixture {
            db,
            tailnet,
            alice,
            bob,
            mapper,
            broker,
        }
    }

    impl Fixture {
        async fn node(&self, user: &User, n: u8, f: impl FnOnce(TestNodeBuilder) -> TestNodeBuilder) -> Node {
            let v4 = Ipv4Addr::new(100, 64, 0, n);
            let builder = TestNodeBuilder::new(0)
                .with_tailnet(self.tailnet.id)
                .with_user_id(user.id)
                .with_name(format!("host-{n}"))
                .with_ipv4(v4)
                .with_ipv6(embed_v6(v4));
            self.db.create_node(&f(builder).build()).await.unwrap()
        }
    }

    fn tag(s: &str) -> Tag {
        s.parse().unwrap()
    }

    fn peer_ids(resp: &MapResponse) -> Vec<u64> {
        let mut ids: Vec<u64> = resp.peers.iter().flatten().map(|p| p.id).collect();
        ids.sort_unstable();
        ids
    }

    #[tokio::test]
    async fn test_default_policy_shows_everyone() {
        let f = fixture(Tailnet::new(TailnetId(0), "example")).await;
        let a = f.node(&f.alice, 1, |b| b).await;
        let b = f.node(&f.bob, 2, |b| b).await;
        let c = f.node(&f.bob, 3, |b| b).await;

        let resp = f.mapper.build_snapshot(a.id(), false).await.unwrap();
        assert_eq!(peer_ids(&resp), vec![b.id().as_u64(), c.id().as_u64()]);

        let me = resp.node.unwrap();
        assert_eq!(me.id, a.id().as_u64());
        assert_eq!(me.name, "host-1.example.tidescale.net.");
        assert_eq!(me.addresses[0], "100.64.0.1/32");
        assert_eq!(resp.domain, "example.tidescale.net");
        assert!(resp.derp_map.is_some());
        assert!(resp.packet_filter.is_some());
    }

    #[tokio::test]
    async fn test_omit_peers_leaves_peer_list_out() {
        let f = fixture(Tailnet::new(TailnetId(0), "example")).await;
        let a = f.node(&f.alice, 1, |b| b).await;
        f.node(&f.bob, 2, |b| b).await;

        let resp = f.mapper.build_snapshot(a.id(), true).await.unwrap();
        assert!(resp.peers.is_none());
        assert!(resp.node.is_some());
    }

    #[tokio::test]
    async fn test_tagged_server_hidden_from_untagged_node() {
        let mut tailnet = Tailnet::new(TailnetId(0), "example");
        tailnet.acl_policy = r#"{
            // servers only talk to each other
            "tagOwners": {"tag:server": ["alice@example.com"]},
            "acls": [{"action": "accept", "src": ["tag:server"], "dst": ["tag:server:*"]}],
        }"#
        .to_string();
        let f = fixture(tailnet).await;
        let server = f.node(&f.alice, 1, |b| b.with_tags(vec![tag("tag:server")])).await;
        let other = f.node(&f.alice, 2, |b| b.with_tags(vec![tag("tag:server")])).await;
        let laptop = f.node(&f.bob, 3, |b| b).await;

        let resp = f.mapper.build_snapshot(server.id(), false).await.unwrap();
        assert_eq!(peer_ids(&resp), vec![other.id().as_u64()]);

        let laptop_ip = laptop.ipv4().unwrap().to_string();
        for rule in resp.packet_filter.unwrap() {
            assert!(!rule.src_ips.iter().any(|s| s.starts_with(&laptop_ip)));
        }

        let laptop_view = f.mapper.build_snapshot(laptop.id(), false).await.unwrap();
        assert!(peer_ids(&laptop_view).is_empty());
    }

    #[tokio::test]
    async fn test_unauthorized_peers_are_hidden() {
        let f = fixture(Tailnet::new(TailnetId(0), "example")).await;
        let a = f.node(&f.alice, 1, |b| b).await;
        let mut pending = f.node(&f.bob, 2, |b| b).await;
        pending.set_authorized(false);
        f.db.update_node(&pending).await.unwrap();

        let resp = f.mapper.build_snapshot(a.id(), false).await.unwrap();
        assert!(peer_ids(&resp).is_empty());
    }

    #[tokio::test]
    async fn test_tagged_nodes_use_tagged_devices_profile() {
        let f = fixture(Tailnet::new(TailnetId(0), "example")).await;
        let a = f.node(&f.alice, 1, |b| b).await;
        f.node(&f.alice, 2, |b| b.with_tags(vec![tag("tag:server")])).await;
        f.node(&f.alice, 3, |b| b.with_tags(vec![tag("tag:db")])).await;

        let resp = f.mapper.build_snapshot(a.id(), false).await.unwrap();
        for peer in resp.peers.as_ref().unwrap() {
            assert_eq!(peer.user, UserId::TAGGED_DEVICES.0);
        }

        let ids: Vec<u64> = resp.user_profiles.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![f.alice.id.0, UserId::TAGGED_DEVICES.0]);
    }

    #[tokio::test]
    async fn test_online_comes_from_registry() {
        let f = fixture(Tailnet::new(TailnetId(0), "example")).await;
        let a = f.node(&f.alice, 1, |b| b).await;
        let b = f.node(&f.bob, 2, |b| b).await;

        let (tx, _rx) = mpsc::channel(4);
        f.broker.sessions(f.tailnet.id).register(b.id(), tx);

        let resp = f.mapper.build_snapshot(a.id(), false).await.unwrap();
        assert_eq!(resp.peers.unwrap()[0].online, Some(true));
        let resp = f.mapper.build_snapshot(b.id(), false).await.unwrap();
        assert_eq!(resp.peers.unwrap()[0].online, Some(false));
    }

    #[tokio::test]
    async fn test_peer_services_hidden_without_collection() {
        let service = |proto, port| Service {
            proto,
            port,
            description: String::new(),
        };
        let hostinfo = HostInfo {
            services: vec![
                service(ServiceProto::Tcp, 22),
                service(ServiceProto::PeerApi4, 41641),
            ],
            ..Default::default()
        };

        let f = fixture(Tailnet::new(TailnetId(0), "example")).await;
        let a = f.node(&f.alice, 1, |b| b).await;
        f.node(&f.bob, 2, |b| b.with_hostinfo(hostinfo.clone())).await;
        let resp = f.mapper.build_snapshot(a.id(), false).await.unwrap();
        let services = resp.peers.unwrap()[0].hostinfo.clone().unwrap().services;
        assert_eq!(services, vec![service(ServiceProto::PeerApi4, 41641)]);

        let mut tailnet = Tailnet::new(TailnetId(0), "example");
        tailnet.service_collection = true;
        let f = fixture(tailnet).await;
        let a = f.node(&f.alice, 1, |b| b).await;
        f.node(&f.bob, 2, |b| b.with_hostinfo(hostinfo.clone())).await;
        let resp = f.mapper.build_snapshot(a.id(), false).await.unwrap();
        let services = resp.peers.unwrap()[0].hostinfo.clone().unwrap().services;
        assert_eq!(services.len(), 2);
    }

    #[tokio::test]
    async fn test_first_router_wins_primary_route() {
        let f = fixture(Tailnet::new(TailnetId(0), "example")).await;
        let subnet: IpNet = "10.0.0.0/24".parse().unwrap();
        let viewer = f.node(&f.alice, 1, |b| b).await;
        let first = f
            .node(&f.alice, 2, |b| b.with_routes(vec![subnet]).with_approved_routes(vec![subnet]))
            .await;
        let second = f
            .node(&f.alice, 3, |b| b.with_routes(vec![subnet]).with_approved_routes(vec![subnet]))
            .await;

        let resp = f.mapper.build_snapshot(viewer.id(), false).await.unwrap();
        let peers = resp.peers.unwrap();
        let by_id = |id: NodeId| peers.iter().find(|p| p.id == id.as_u64()).unwrap();

        assert_eq!(by_id(first.id()).primary_routes, vec!["10.0.0.0/24".to_string()]);
        assert!(by_id(first.id()).allowed_ips.contains(&"10.0.0.0/24".to_string()));
        assert!(by_id(second.id()).primary_routes.is_empty());
        assert!(!by_id(second.id()).allowed_ips.contains(&"10.0.0.0/24".to_string()));
    }

    #[tokio::test]
    async fn test_self_capabilities() {
        let mut tailnet = Tailnet::new(TailnetId(0), "example");
        tailnet.dns.https_certs = true;
        tailnet.iam_policy = r#"{"roles": {"alice@example.com": "admin"}}"#.to_string();
        tailnet.acl_policy = format!(
            r#"{{
                "acls": [{{"action": "accept", "src": ["*"], "dst": ["*:*"]}}],
                "nodeAttrs": [{{"target": ["*"], "attr": ["{CAP_FUNNEL}", "custom-attr"]}}]
            }}"#
        );
        let f = fixture(tailnet).await;
        let a = f.node(&f.alice, 1, |b| b).await;
        let b = f.node(&f.bob, 2, |b| b).await;

        let resp = f.mapper.build_snapshot(a.id(), false).await.unwrap();
        let caps = resp.node.unwrap().cap_map.unwrap();
        for cap in [CAP_ADMIN, CAP_FILE_SHARING, CAP_SSH, CAP_HTTPS, "custom-attr"] {
            assert!(caps.contains_key(cap), "missing {cap}");
        }
        assert!(!caps.contains_key(CAP_FUNNEL));
        assert!(resp.peers.unwrap().iter().all(|p| p.cap_map.is_none()));

        let caps = f
            .mapper
            .build_snapshot(b.id(), false)
            .await
            .unwrap()
            .node
            .unwrap()
            .cap_map
            .unwrap();
        assert!(!caps.contains_key(CAP_ADMIN));
    }

    #[tokio::test]
    async fn test_dns_config_from_tailnet() {
        let mut tailnet = Tailnet::new(TailnetId(0), "example");
        tailnet.dns.nameservers = vec!["1.1.1.1".parse().unwrap()];
        tailnet.dns.search_domains = vec!["corp.internal".to_string()];
        tailnet
            .dns
            .routes
            .insert("lab.internal".to_string(), vec!["10.0.0.53".parse().unwrap()]);
        tailnet.dns.https_certs = true;
        let f = fixture(tailnet).await;
        let a = f.node(&f.alice, 1, |b| b).await;

        let dns = f.mapper.build_snapshot(a.id(), false).await.unwrap().dns_config.unwrap();
        assert_eq!(dns.resolvers, vec![DnsResolver::new("1.1.1.1")]);
        assert_eq!(
            dns.domains,
            vec!["example.tidescale.net".to_string(), "corp.internal".to_string()]
        );
        assert!(dns.proxied);
        assert_eq!(dns.routes["lab.internal"], vec![DnsResolver::new("10.0.0.53")]);
        assert!(dns.routes["example.tidescale.net."].is_empty());
        assert_eq!(dns.cert_domains, vec!["host-1.example.tidescale.net".to_string()]);
    }

    #[tokio::test]
    async fn test_ssh_policy_follows_tailnet_toggle() {
        let mut tailnet = Tailnet::new(TailnetId(0), "example");
        tailnet.ssh = false;
        let f = fixture(tailnet).await;
        let a = f.node(&f.alice, 1, |b| b).await;

        let resp = f.mapper.build_snapshot(a.id(), false).await.unwrap();
        assert!(resp.ssh_policy.is_none());
        assert!(!resp.node.unwrap().cap_map.unwrap().contains_key(CAP_SSH));
    }

    #[tokio::test]
    async fn test_missing_node() {
        let f = fixture(Tailnet::new(TailnetId(0), "example")).await;
        let result = f.mapper.build_snapshot(NodeId(999), false).await;
        assert!(matches!(result, Err(Error::NotFound { kind: "node", .. })));
    }

    #[tokio::test]
    async fn test_synchronizer_full_then_delta() {
        let f = fixture(Tailnet::new(TailnetId(0), "example")).await;
        let a = f.node(&f.alice, 1, |b| b).await;
        let b = f.node(&f.bob, 2, |b| b).await;
        let sync = Synchronizer::new(f.mapper.clone(), a.id(), false);

        let first = sync.full().await.unwrap();
        assert_eq!(first.seq, 1);
        assert!(!first.map_session_handle.is_empty());
        assert_eq!(peer_ids(&first), vec![b.id().as_u64()]);

        f.db.delete_node(b.id()).await.unwrap();
        let delta = sync.delta().await.unwrap();
        assert_eq!(delta.seq, 2);
        assert!(delta.peers.is_none());
        assert_eq!(delta.peers_removed, vec![b.id().as_u64()]);
        assert!(delta.derp_map.is_none());
    }
}
