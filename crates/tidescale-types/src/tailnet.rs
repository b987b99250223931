//! tailnets: isolated network namespaces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::derp::DerpMap;
use crate::dns::DnsSettings;

/// unique identifier for a tailnet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TailnetId(pub u64);

impl std::fmt::Display for TailnetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// a tailnet and its per-network settings.
///
/// the acl and iam policy documents are kept as the text the operator wrote
/// (comments and trailing commas included) and parsed on use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tailnet {
    pub id: TailnetId,
    pub name: String,

    #[serde(default)]
    pub dns: DnsSettings,

    /// raw acl policy document. empty means the default allow-all policy.
    #[serde(default)]
    pub acl_policy: String,

    /// raw iam policy document. empty means nobody is an admin.
    #[serde(default)]
    pub iam_policy: String,

    /// relay map override. `None` falls back to the server default.
    #[serde(default)]
    pub derp_map: Option<DerpMap>,

    #[serde(default = "default_true")]
    pub file_sharing: bool,

    #[serde(default)]
    pub service_collection: bool,

    #[serde(default = "default_true")]
    pub ssh: bool,

    /// whether new nodes must be authorized before they can pass traffic.
    #[serde(default)]
    pub machine_authorization: bool,

    pub created_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl Tailnet {
    pub fn new(id: TailnetId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            dns: DnsSettings::default(),
            acl_policy: String::new(),
            iam_policy: String::new(),
            derp_map: None,
            file_sharing: true,
            service_collection: false,
            ssh: true,
            machine_authorization: false,
            created_at: Utc::now(),
        }
    }
}
