//! per-tailnet dns settings.

use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// dns configuration stored on a tailnet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsSettings {
    /// resolve `<node>.<tailnet>.<base_domain>` names via the in-client resolver.
    #[serde(default = "default_true")]
    pub magic_dns: bool,

    /// upstream resolvers.
    #[serde(default)]
    pub nameservers: Vec<IpAddr>,

    /// search domains appended to unqualified names.
    #[serde(default)]
    pub search_domains: Vec<String>,

    /// split dns: suffix -> resolvers for that suffix.
    #[serde(default)]
    pub routes: BTreeMap<String, Vec<IpAddr>>,

    /// provision https certificates for node names.
    #[serde(default)]
    pub https_certs: bool,
}

fn default_true() -> bool {
    true
}

impl Default for DnsSettings {
    fn default() -> Self {
        Self {
            magic_dns: true,
            nameservers: Vec::new(),
            search_domains: Vec::new(),
            routes: BTreeMap::new(),
            https_certs: false,
        }
    }
}
