//! fixtures for building nodes in tests.
//!
//! every crate in the workspace uses these so that test nodes are built the
//! same way everywhere.

use std::net::{Ipv4Addr, Ipv6Addr};

use chrono::Utc;
use ipnet::IpNet;

use crate::{DiscoKey, HostInfo, MachineKey, Node, NodeId, NodeKey, Tag, TailnetId, UserId};

/// builder for test [`Node`] values.
///
/// ```
/// use tidescale_types::test_utils::TestNodeBuilder;
///
/// let node = TestNodeBuilder::new(1).build();
/// let tagged = TestNodeBuilder::new(2)
///     .with_tags(vec!["tag:server".parse().unwrap()])
///     .build();
/// assert!(tagged.is_tagged());
/// ```
#[derive(Debug, Clone)]
pub struct TestNodeBuilder {
    id: u64,
    tailnet_id: TailnetId,
    user_id: Option<UserId>,
    name: Option<String>,
    tags: Vec<Tag>,
    ipv4: Option<Ipv4Addr>,
    ipv6: Option<Ipv6Addr>,
    machine_key: Option<MachineKey>,
    node_key: Option<NodeKey>,
    hostinfo: Option<HostInfo>,
    approved_routes: Vec<IpNet>,
    ephemeral: bool,
}

impl TestNodeBuilder {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            tailnet_id: TailnetId(1),
            user_id: None,
            name: None,
            tags: vec![],
            ipv4: None,
            ipv6: None,
            machine_key: None,
            node_key: None,
            hostinfo: None,
            approved_routes: vec![],
            ephemeral: false,
        }
    }

    pub fn with_tailnet(mut self, tailnet_id: TailnetId) -> Self {
        self.tailnet_id = tailnet_id;
        self
    }

    /// owning user. defaults to `UserId(id)`.
    pub fn with_user_id(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<Tag>) -> Self {
        self.tags = tags;
        self
    }

    /// ipv4 address. defaults to `100.64.0.<id>` with a matching ipv6.
    pub fn with_ipv4(mut self, ip: Ipv4Addr) -> Self {
        self.ipv4 = Some(ip);
        self
    }

    pub fn with_ipv6(mut self, ip: Ipv6Addr) -> Self {
        self.ipv6 = Some(ip);
        self
    }

    pub fn with_machine_key(mut self, key: MachineKey) -> Self {
        self.machine_key = Some(key);
        self
    }

    pub fn with_node_key(mut self, key: NodeKey) -> Self {
        self.node_key = Some(key);
        self
    }

    pub fn with_hostinfo(mut self, hostinfo: HostInfo) -> Self {
        self.hostinfo = Some(hostinfo);
        self
    }

    /// advertise routes through hostinfo.
    pub fn with_routes(mut self, routes: Vec<IpNet>) -> Self {
        let mut hostinfo = self.hostinfo.take().unwrap_or_default();
        hostinfo.routable_ips = routes;
        self.hostinfo = Some(hostinfo);
        self
    }

    pub fn with_approved_routes(mut self, routes: Vec<IpNet>) -> Self {
        self.approved_routes = routes;
        self
    }

    pub fn ephemeral(mut self) -> Self {
        self.ephemeral = true;
        self
    }

    pub fn build(self) -> Node {
        let now = Utc::now();
        let low = self.id as u32;
        let ipv4 = self
            .ipv4
            .unwrap_or_else(|| Ipv4Addr::from(u32::from(Ipv4Addr::new(100, 64, 0, 0)) + low));
        let ipv6 = self.ipv6.unwrap_or_else(|| {
            let base = u128::from(Ipv6Addr::new(0xfd7a, 0x115c, 0xa1e0, 0, 0, 0, 0, 0));
            Ipv6Addr::from(base + u128::from(low))
        });

        Node {
            id: NodeId(self.id),
            tailnet_id: self.tailnet_id,
            user_id: self.user_id.unwrap_or(UserId(self.id)),
            machine_key: self.machine_key.unwrap_or_else(MachineKey::random),
            node_key: self.node_key.unwrap_or_else(NodeKey::random),
            disco_key: DiscoKey::random(),
            name: self.name.unwrap_or_else(|| format!("node-{}", self.id)),
            name_index: 0,
            ipv4: Some(ipv4),
            ipv6: Some(ipv6),
            endpoints: vec![],
            hostinfo: self.hostinfo,
            tags: self.tags,
            approved_routes: self.approved_routes,
            auto_approved_routes: vec![],
            ephemeral: self.ephemeral,
            authorized: true,
            auth_key_id: None,
            expiry: None,
            key_expiry_disabled: false,
            last_seen: Some(now),
            created_at: now,
            updated_at: now,
        }
    }
}
