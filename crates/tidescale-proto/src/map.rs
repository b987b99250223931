//! map request and response types.
//!
//! a client opens a map poll with a [`MapRequest`] and receives one or more
//! [`MapResponse`] frames: a full network map first, then deltas.

use std::collections::HashMap;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use tidescale_types::{DerpMap, DiscoKey, HostInfo, MachineKey, NodeKey};

use crate::CapabilityVersion;
use crate::ssh::SshPolicy;

/// a capability map: capability name -> opaque parameters.
pub type CapMap = HashMap<String, Vec<serde_json::Value>>;

/// a map request from a client.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct MapRequest {
    /// client's capability version.
    pub version: CapabilityVersion,

    /// client's current node key.
    pub node_key: NodeKey,

    /// client's disco key.
    #[serde(default)]
    pub disco_key: DiscoKey,

    /// client's current udp endpoints.
    #[serde(default)]
    pub endpoints: Vec<SocketAddr>,

    /// client's host metadata.
    #[serde(default)]
    pub hostinfo: Option<HostInfo>,

    /// the client only wants to report state, not receive peers.
    #[serde(default)]
    pub omit_peers: bool,

    /// keep the response open and stream updates.
    #[serde(default)]
    pub stream: bool,

    /// the client asks for keep-alive frames while streaming.
    #[serde(default)]
    pub keep_alive: bool,

    /// fetch the map without updating any server-side state.
    #[serde(default)]
    pub read_only: bool,

    /// debug flags.
    #[serde(default)]
    pub debug_flags: Vec<String>,

    /// response compression ("zstd" or empty).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub compress: String,
}

impl MapRequest {
    /// whether the request wants zstd-compressed frames.
    pub fn wants_zstd(&self) -> bool {
        self.compress == "zstd"
    }
}

/// a map response frame.
///
/// `None` fields mean "unchanged since the previous frame". a full map sets
/// `peers`; a delta sets `peers_changed`, `peers_removed` and friends.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct MapResponse {
    /// opaque handle for the streaming session, sent on the first frame.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub map_session_handle: String,

    /// sequence number within the session.
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub seq: i64,

    /// this frame is only a keep-alive.
    #[serde(default, skip_serializing_if = "is_false")]
    pub keep_alive: bool,

    /// the requesting node's own record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<MapResponseNode>,

    /// complete peer list. present only in full maps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peers: Option<Vec<MapResponseNode>>,

    /// peers added or changed since the previous frame.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub peers_changed: Vec<MapResponseNode>,

    /// ids of peers no longer visible.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub peers_removed: Vec<u64>,

    /// lightweight per-peer mutations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub peers_changed_patch: Vec<PeerChange>,

    /// online status changes keyed by node id.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub online_change: HashMap<u64, bool>,

    /// dns configuration.
    #[serde(rename = "DNSConfig", default, skip_serializing_if = "Option::is_none")]
    pub dns_config: Option<DnsConfig>,

    /// relay map. omitted from deltas when unchanged.
    #[serde(rename = "DERPMap", default, skip_serializing_if = "Option::is_none")]
    pub derp_map: Option<DerpMap>,

    /// packet filter. a single empty rule denies everything.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packet_filter: Option<Vec<FilterRule>>,

    /// user profiles for every identity referenced in this frame.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_profiles: Vec<UserProfile>,

    /// ssh policy for incoming connections.
    #[serde(rename = "SSHPolicy", default, skip_serializing_if = "Option::is_none")]
    pub ssh_policy: Option<SshPolicy>,

    /// whether the client should report its services.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collect_services: Option<bool>,

    /// tailnet domain.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub domain: String,

    /// server time, rfc3339.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_time: Option<String>,

    /// health warnings. an empty list clears previous warnings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<Vec<String>>,
}

fn is_zero_i64(n: &i64) -> bool {
    *n == 0
}

fn is_zero_i32(n: &i32) -> bool {
    *n == 0
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl MapResponse {
    /// an empty keep-alive frame.
    pub fn keepalive() -> Self {
        Self {
            keep_alive: true,
            ..Default::default()
        }
    }

    /// whether the frame carries no changes at all.
    pub fn is_empty_delta(&self) -> bool {
        self.node.is_none()
            && self.peers.is_none()
            && self.peers_changed.is_empty()
            && self.peers_removed.is_empty()
            && self.peers_changed_patch.is_empty()
            && self.online_change.is_empty()
            && self.dns_config.is_none()
            && self.derp_map.is_none()
            && self.packet_filter.is_none()
            && self.ssh_policy.is_none()
    }
}

/// lightweight peer mutation. absent fields mean no change.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct PeerChange {
    /// node being mutated.
    #[serde(rename = "NodeID")]
    pub node_id: u64,

    /// new home relay region.
    #[serde(rename = "DERPRegion", default, skip_serializing_if = "Option::is_none")]
    pub derp_region: Option<i32>,

    /// new endpoints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<Vec<String>>,

    /// new node key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<NodeKey>,

    /// new disco key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disco_key: Option<DiscoKey>,

    /// new online state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub online: Option<bool>,

    /// new last-seen time, rfc3339.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,

    /// new key expiry, rfc3339.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_expiry: Option<String>,
}

/// a node as rendered in a map response.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct MapResponseNode {
    /// node id.
    #[serde(rename = "ID")]
    pub id: u64,

    /// stable id string.
    #[serde(rename = "StableID")]
    pub stable_id: String,

    /// fully qualified name, trailing dot included.
    pub name: String,

    /// owning user id, or the tagged-devices id.
    pub user: u64,

    /// node key.
    #[serde(rename = "Key")]
    pub node_key: NodeKey,

    /// node key expiry, rfc3339.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_expiry: Option<String>,

    /// machine key.
    #[serde(rename = "Machine")]
    pub machine_key: MachineKey,

    /// disco key.
    #[serde(default)]
    pub disco_key: DiscoKey,

    /// assigned addresses as /32 and /128 prefixes.
    pub addresses: Vec<String>,

    /// addresses plus routes this node serves.
    #[serde(rename = "AllowedIPs")]
    pub allowed_ips: Vec<String>,

    /// udp endpoints.
    #[serde(default)]
    pub endpoints: Vec<String>,

    /// home relay region.
    #[serde(rename = "HomeDERP", default, skip_serializing_if = "is_zero_i32")]
    pub home_derp: i32,

    /// host metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostinfo: Option<HostInfo>,

    /// creation time, rfc3339.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created: String,

    /// whether the node has an open session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub online: Option<bool>,

    /// last time the node was connected, rfc3339.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,

    /// tags on this node.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// subnet routes this node is the primary for.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary_routes: Vec<String>,

    /// whether traffic from this node is authorized.
    #[serde(default)]
    pub machine_authorized: bool,

    /// whether the node key has expired.
    #[serde(default, skip_serializing_if = "is_false")]
    pub expired: bool,

    /// capability version of this node.
    #[serde(default)]
    pub cap: u32,

    /// node capabilities. only set on the node's own record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cap_map: Option<CapMap>,
}

/// a dns resolver entry.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct DnsResolver {
    /// resolver address (ip, ip:port or a doh url).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub addr: String,
}

impl DnsResolver {
    /// create a resolver from an address string.
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

/// dns configuration for clients.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct DnsConfig {
    /// resolvers in order of preference.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resolvers: Vec<DnsResolver>,

    /// search domains.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<String>,

    /// split dns: suffix -> resolvers. an empty list routes to the in-client resolver.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub routes: HashMap<String, Vec<DnsResolver>>,

    /// names for which https certificates may be requested.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cert_domains: Vec<String>,

    /// whether the client should proxy dns.
    #[serde(default, skip_serializing_if = "is_false")]
    pub proxied: bool,
}

/// a packet filter rule.
///
/// a rule is either network-level (`dst_ports`) or application-level
/// (`cap_grant`), never both.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct FilterRule {
    /// source prefixes.
    #[serde(rename = "SrcIPs")]
    pub src_ips: Vec<String>,

    /// destination addresses and ports.
    #[serde(default)]
    pub dst_ports: Vec<NetPortRange>,

    /// ip protocol numbers. empty means tcp, udp and icmp.
    #[serde(rename = "IPProto", default, skip_serializing_if = "Vec::is_empty")]
    pub ip_proto: Vec<i32>,

    /// application capability grants.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cap_grant: Vec<CapGrant>,
}

impl FilterRule {
    /// the placeholder rule sent when nothing is allowed.
    ///
    /// clients treat an empty filter list and a list holding this single rule
    /// differently, so deny-all is always expressed with the latter.
    pub fn deny_all() -> Self {
        Self::default()
    }

    /// whether this is the deny-all placeholder.
    pub fn is_deny_all(&self) -> bool {
        self.src_ips.is_empty() && self.dst_ports.is_empty() && self.cap_grant.is_empty()
    }
}

/// application capabilities granted from a rule's sources to `dsts`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct CapGrant {
    /// destination prefixes.
    pub dsts: Vec<String>,

    /// capability name -> opaque parameters.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub cap_map: CapMap,
}

/// an inclusive port range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "PascalCase")]
pub struct PortRange {
    /// first port.
    pub first: u16,
    /// last port, inclusive.
    pub last: u16,
}

impl PortRange {
    /// a single port.
    pub fn single(port: u16) -> Self {
        Self {
            first: port,
            last: port,
        }
    }

    /// every port.
    pub fn any() -> Self {
        Self {
            first: 0,
            last: 65535,
        }
    }
}

/// a destination address with a port range.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct NetPortRange {
    /// address or prefix.
    #[serde(rename = "IP")]
    pub ip: String,

    /// port range.
    pub ports: PortRange,
}

/// a user profile referenced from nodes in a map response.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct UserProfile {
    /// user id.
    #[serde(rename = "ID")]
    pub id: u64,

    /// login name.
    pub login_name: String,

    /// display name.
    pub display_name: String,

    /// profile picture url.
    #[serde(rename = "ProfilePicURL", default, skip_serializing_if = "Option::is_none")]
    pub profile_pic_url: Option<String>,
}
