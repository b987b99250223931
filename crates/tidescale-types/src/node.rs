//! nodes: registered devices within a tailnet.
//!
//! a node is either user-owned (no tags) or tagged. tagged nodes take their
//! identity from their tags and are never matched by person aliases, even
//! though the user that registered them is still recorded as the owner.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use chrono::{DateTime, Utc};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::keys::{DiscoKey, MachineKey, NodeKey};
use crate::tag::Tag;
use crate::tailnet::TailnetId;
use crate::user::UserId;

/// unique identifier for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl NodeId {
    /// stable id string used on the wire.
    pub fn stable_id(&self) -> String {
        format!("n{}", self.0)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// a registered node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) tailnet_id: TailnetId,
    pub(crate) user_id: UserId,
    pub(crate) machine_key: MachineKey,
    pub(crate) node_key: NodeKey,
    pub(crate) disco_key: DiscoKey,
    pub(crate) name: String,
    pub(crate) name_index: u32,
    pub(crate) ipv4: Option<Ipv4Addr>,
    pub(crate) ipv6: Option<Ipv6Addr>,
    pub(crate) endpoints: Vec<SocketAddr>,
    pub(crate) hostinfo: Option<HostInfo>,
    pub(crate) tags: Vec<Tag>,
    pub(crate) approved_routes: Vec<IpNet>,
    pub(crate) auto_approved_routes: Vec<IpNet>,
    pub(crate) ephemeral: bool,
    pub(crate) authorized: bool,
    pub(crate) auth_key_id: Option<u64>,
    pub(crate) expiry: Option<DateTime<Utc>>,
    pub(crate) key_expiry_disabled: bool,
    pub(crate) last_seen: Option<DateTime<Utc>>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

/// builder for [`Node`].
///
/// required fields: tailnet, user, machine key, node key and name.
pub struct NodeBuilder {
    node: Node,
}

impl NodeBuilder {
    pub fn new(
        tailnet_id: TailnetId,
        user_id: UserId,
        machine_key: MachineKey,
        node_key: NodeKey,
        name: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            node: Node {
                id: NodeId(0),
                tailnet_id,
                user_id,
                machine_key,
                node_key,
                disco_key: DiscoKey::default(),
                name: name.into(),
                name_index: 0,
                ipv4: None,
                ipv6: None,
                endpoints: Vec::new(),
                hostinfo: None,
                tags: Vec::new(),
                approved_routes: Vec::new(),
                auto_approved_routes: Vec::new(),
                ephemeral: false,
                authorized: true,
                auth_key_id: None,
                expiry: None,
                key_expiry_disabled: false,
                last_seen: None,
                created_at: now,
                updated_at: now,
            },
        }
    }

    pub fn id(mut self, id: NodeId) -> Self {
        self.node.id = id;
        self
    }

    pub fn name_index(mut self, index: u32) -> Self {
        self.node.name_index = index;
        self
    }

    pub fn disco_key(mut self, key: DiscoKey) -> Self {
        self.node.disco_key = key;
        self
    }

    pub fn addresses(mut self, ipv4: Ipv4Addr, ipv6: Ipv6Addr) -> Self {
        self.node.ipv4 = Some(ipv4);
        self.node.ipv6 = Some(ipv6);
        self
    }

    pub fn endpoints(mut self, endpoints: Vec<SocketAddr>) -> Self {
        self.node.endpoints = endpoints;
        self
    }

    pub fn hostinfo(mut self, hostinfo: HostInfo) -> Self {
        self.node.hostinfo = Some(hostinfo);
        self
    }

    pub fn tags(mut self, tags: Vec<Tag>) -> Self {
        self.node.tags = tags;
        self
    }

    pub fn approved_routes(mut self, routes: Vec<IpNet>) -> Self {
        self.node.approved_routes = routes;
        self
    }

    pub fn auto_approved_routes(mut self, routes: Vec<IpNet>) -> Self {
        self.node.auto_approved_routes = routes;
        self
    }

    pub fn ephemeral(mut self, ephemeral: bool) -> Self {
        self.node.ephemeral = ephemeral;
        self
    }

    pub fn authorized(mut self, authorized: bool) -> Self {
        self.node.authorized = authorized;
        self
    }

    pub fn auth_key_id(mut self, id: u64) -> Self {
        self.node.auth_key_id = Some(id);
        self
    }

    pub fn expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.node.expiry = Some(expiry);
        self
    }

    pub fn key_expiry_disabled(mut self, disabled: bool) -> Self {
        self.node.key_expiry_disabled = disabled;
        self
    }

    pub fn last_seen(mut self, at: DateTime<Utc>) -> Self {
        self.node.last_seen = Some(at);
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.node.created_at = at;
        self
    }

    pub fn updated_at(mut self, at: DateTime<Utc>) -> Self {
        self.node.updated_at = at;
        self
    }

    pub fn build(self) -> Node {
        self.node
    }
}

impl Node {
    pub fn builder(
        tailnet_id: TailnetId,
        user_id: UserId,
        machine_key: MachineKey,
        node_key: NodeKey,
        name: impl Into<String>,
    ) -> NodeBuilder {
        NodeBuilder::new(tailnet_id, user_id, machine_key, node_key, name)
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn tailnet_id(&self) -> TailnetId {
        self.tailnet_id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn machine_key(&self) -> &MachineKey {
        &self.machine_key
    }

    pub fn node_key(&self) -> &NodeKey {
        &self.node_key
    }

    pub fn disco_key(&self) -> &DiscoKey {
        &self.disco_key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn name_index(&self) -> u32 {
        self.name_index
    }

    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        self.ipv4
    }

    pub fn ipv6(&self) -> Option<Ipv6Addr> {
        self.ipv6
    }

    pub fn endpoints(&self) -> &[SocketAddr] {
        &self.endpoints
    }

    pub fn hostinfo(&self) -> Option<&HostInfo> {
        self.hostinfo.as_ref()
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn approved_routes(&self) -> &[IpNet] {
        &self.approved_routes
    }

    pub fn auto_approved_routes(&self) -> &[IpNet] {
        &self.auto_approved_routes
    }

    pub fn ephemeral(&self) -> bool {
        self.ephemeral
    }

    pub fn authorized(&self) -> bool {
        self.authorized
    }

    pub fn auth_key_id(&self) -> Option<u64> {
        self.auth_key_id
    }

    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expiry
    }

    pub fn key_expiry_disabled(&self) -> bool {
        self.key_expiry_disabled
    }

    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.last_seen
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn set_id(&mut self, id: NodeId) {
        self.id = id;
    }

    pub fn set_node_key(&mut self, key: NodeKey) {
        self.node_key = key;
    }

    pub fn set_disco_key(&mut self, key: DiscoKey) {
        self.disco_key = key;
    }

    pub fn set_name(&mut self, name: impl Into<String>, index: u32) {
        self.name = name.into();
        self.name_index = index;
    }

    pub fn set_addresses(&mut self, ipv4: Ipv4Addr, ipv6: Ipv6Addr) {
        self.ipv4 = Some(ipv4);
        self.ipv6 = Some(ipv6);
    }

    pub fn set_endpoints(&mut self, endpoints: Vec<SocketAddr>) {
        self.endpoints = endpoints;
    }

    /// replace the host metadata wholesale.
    pub fn set_hostinfo(&mut self, hostinfo: HostInfo) {
        self.hostinfo = Some(hostinfo);
    }

    pub fn set_tags(&mut self, tags: Vec<Tag>) {
        self.tags = tags;
    }

    pub fn set_approved_routes(&mut self, routes: Vec<IpNet>) {
        self.approved_routes = routes;
    }

    pub fn set_auto_approved_routes(&mut self, routes: Vec<IpNet>) {
        self.auto_approved_routes = routes;
    }

    pub fn set_ephemeral(&mut self, ephemeral: bool) {
        self.ephemeral = ephemeral;
    }

    pub fn set_authorized(&mut self, authorized: bool) {
        self.authorized = authorized;
    }

    pub fn set_auth_key_id(&mut self, id: Option<u64>) {
        self.auth_key_id = id;
    }

    pub fn set_expiry(&mut self, expiry: Option<DateTime<Utc>>) {
        self.expiry = expiry;
    }

    pub fn set_key_expiry_disabled(&mut self, disabled: bool) {
        self.key_expiry_disabled = disabled;
    }

    pub fn set_last_seen(&mut self, at: DateTime<Utc>) {
        self.last_seen = Some(at);
    }

    pub fn set_user_id(&mut self, user_id: UserId) {
        self.user_id = user_id;
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// the collision-free display name: `name` or `name-<index>`.
    pub fn display_name(&self) -> String {
        if self.name_index == 0 {
            self.name.clone()
        } else {
            format!("{}-{}", self.name, self.name_index)
        }
    }

    /// whether the node key has expired as of `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        if self.key_expiry_disabled {
            return false;
        }
        matches!(self.expiry, Some(expiry) if expiry <= now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// tagged nodes take their identity from their tags.
    pub fn is_tagged(&self) -> bool {
        !self.tags.is_empty()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// all addresses assigned to this node.
    pub fn ips(&self) -> impl Iterator<Item = IpAddr> + '_ {
        self.ipv4
            .map(IpAddr::V4)
            .into_iter()
            .chain(self.ipv6.map(IpAddr::V6))
    }

    /// whether `ip` is one of this node's addresses.
    pub fn owns_ip(&self, ip: IpAddr) -> bool {
        self.ips().any(|own| own == ip)
    }

    /// routes the client is currently advertising.
    pub fn announced_routes(&self) -> &[IpNet] {
        self.hostinfo
            .as_ref()
            .map(|h| h.routable_ips.as_slice())
            .unwrap_or(&[])
    }

    /// advertised routes that are approved, manually or automatically.
    pub fn allowed_routes(&self) -> Vec<IpNet> {
        self.announced_routes()
            .iter()
            .filter(|route| {
                self.approved_routes.contains(*route) || self.auto_approved_routes.contains(*route)
            })
            .copied()
            .collect()
    }

    /// allowed subnet routes, excluding exit routes.
    pub fn subnet_routes(&self) -> Vec<IpNet> {
        self.allowed_routes()
            .into_iter()
            .filter(|route| !is_exit_route(route))
            .collect()
    }

    pub fn is_exit_node(&self) -> bool {
        self.allowed_routes().iter().any(is_exit_route)
    }
}

/// whether a route is an exit route (`0.0.0.0/0` or `::/0`).
pub fn is_exit_route(route: &IpNet) -> bool {
    route.prefix_len() == 0
}

/// host metadata reported by the client. replaced wholesale on every sync.
///
/// field names match the client's pascalcase json.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostInfo {
    #[serde(rename = "IPNVersion", default, skip_serializing_if = "Option::is_none")]
    pub ipn_version: Option<String>,

    #[serde(rename = "OS", default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,

    #[serde(rename = "OSVersion", default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distro: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub go_arch: Option<String>,

    #[serde(default)]
    pub shields_up: bool,

    /// routes this node wants to advertise.
    #[serde(rename = "RoutableIPs", default, skip_serializing_if = "Vec::is_empty")]
    pub routable_ips: Vec<IpNet>,

    /// tags the node is asking for.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub request_tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_info: Option<NetInfo>,

    #[serde(rename = "sshHostKeys", default, skip_serializing_if = "Vec::is_empty")]
    pub ssh_host_keys: Vec<String>,

    /// services running on the node. only forwarded when the tailnet
    /// has service collection enabled.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<Service>,
}

/// a service advertised by a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Service {
    pub proto: ServiceProto,
    pub port: u16,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceProto {
    Tcp,
    Udp,
    #[serde(rename = "peerapi4")]
    PeerApi4,
    #[serde(rename = "peerapi6")]
    PeerApi6,
    #[serde(untagged)]
    Other(String),
}

impl ServiceProto {
    /// peerapi services are always forwarded, even without service collection.
    pub fn is_peerapi(&self) -> bool {
        matches!(self, ServiceProto::PeerApi4 | ServiceProto::PeerApi6)
    }
}

/// network conditions reported by the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetInfo {
    /// preferred relay region.
    #[serde(rename = "PreferredDERP", default)]
    pub preferred_derp: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestNodeBuilder;
    use chrono::Duration;

    #[test]
    fn test_hostinfo_deserialize_client_format() {
        let json = r#"{
            "OS": "linux",
            "OSVersion": "6.18.4",
            "IPNVersion": "1.80.0",
            "RoutableIPs": ["192.168.1.0/24", "0.0.0.0/0"],
            "RequestTags": ["tag:server"],
            "NetInfo": {"PreferredDERP": 1},
            "Hostname": "test-node",
            "Services": [{"Proto": "peerapi4", "Port": 4242}]
        }"#;

        let hostinfo: HostInfo = serde_json::from_str(json).expect("should deserialize");
        assert_eq!(hostinfo.os.as_deref(), Some("linux"));
        assert_eq!(hostinfo.routable_ips.len(), 2);
        assert_eq!(hostinfo.request_tags, vec!["tag:server".to_string()]);
        assert_eq!(hostinfo.net_info.unwrap().preferred_derp, 1);
        assert!(hostinfo.services[0].proto.is_peerapi());
    }

    #[test]
    fn test_display_name_uses_index() {
        let mut node = TestNodeBuilder::new(1).with_name("laptop").build();
        assert_eq!(node.display_name(), "laptop");
        node.set_name("laptop", 2);
        assert_eq!(node.display_name(), "laptop-2");
    }

    #[test]
    fn test_expiry() {
        let mut node = TestNodeBuilder::new(1).build();
        assert!(!node.is_expired());

        node.set_expiry(Some(Utc::now() - Duration::hours(1)));
        assert!(node.is_expired());

        node.set_key_expiry_disabled(true);
        assert!(!node.is_expired());
    }

    #[test]
    fn test_allowed_routes_union() {
        let subnet: IpNet = "10.0.0.0/24".parse().unwrap();
        let other: IpNet = "10.1.0.0/24".parse().unwrap();
        let exit: IpNet = "0.0.0.0/0".parse().unwrap();
        let mut node = TestNodeBuilder::new(1)
            .with_routes(vec![subnet, other, exit])
            .build();
        node.set_approved_routes(vec![subnet]);
        node.set_auto_approved_routes(vec![exit]);

        assert_eq!(node.allowed_routes(), vec![subnet, exit]);
        assert_eq!(node.subnet_routes(), vec![subnet]);
        assert!(node.is_exit_node());
    }

    #[test]
    fn test_approved_but_not_announced_is_not_allowed() {
        let subnet: IpNet = "10.0.0.0/24".parse().unwrap();
        let mut node = TestNodeBuilder::new(1).build();
        node.set_approved_routes(vec![subnet]);
        assert!(node.allowed_routes().is_empty());
    }

    #[test]
    fn test_ips() {
        let node = TestNodeBuilder::new(3).build();
        let ips: Vec<IpAddr> = node.ips().collect();
        assert_eq!(ips.len(), 2);
        assert!(node.owns_ip(ips[0]));
    }
}
