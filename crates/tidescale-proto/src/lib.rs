//! control protocol wire types for tidescale.
//!
//! this crate holds the json shapes exchanged with clients:
//! - map requests and responses (full and delta network maps)
//! - registration requests and responses
//! - packet filter and ssh policy rules
//!
//! field names follow the client's pascalcase encoding.

#![warn(missing_docs)]

mod error;
mod map;
mod register;
mod ssh;

pub use error::Error;
pub use map::{
    CapGrant, CapMap, DnsConfig, DnsResolver, FilterRule, MapRequest, MapResponse, MapResponseNode,
    NetPortRange, PeerChange, PortRange, UserProfile,
};
pub use register::{RegisterAuth, RegisterRequest, RegisterResponse, TailcfgLogin, TailcfgUser};
pub use ssh::{SshAction, SshPolicy, SshPrincipal, SshRule};
pub use tidescale_types::{DerpMap, DerpNode, DerpRegion};

use serde::{Deserialize, Serialize};

/// result type for protocol operations.
pub type Result<T> = std::result::Result<T, Error>;

/// node capability granting tailnet admin rights.
pub const CAP_ADMIN: &str = "https://tailscale.com/cap/is-admin";

/// node capability enabling file sharing.
pub const CAP_FILE_SHARING: &str = "https://tailscale.com/cap/file-sharing";

/// node capability enabling the ssh server.
pub const CAP_SSH: &str = "https://tailscale.com/cap/ssh";

/// node capability enabling https certificates.
pub const CAP_HTTPS: &str = "https";

/// funnel capability. never sent: funnel is unsupported.
pub const CAP_FUNNEL: &str = "https://tailscale.com/cap/funnel";

/// funnel port attribute prefix. stripped alongside [`CAP_FUNNEL`].
pub const CAP_FUNNEL_PORTS: &str = "https://tailscale.com/cap/funnel-ports";

/// client capability version.
///
/// different versions support different protocol features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CapabilityVersion(pub u32);

impl CapabilityVersion {
    /// minimum supported capability version.
    pub const MIN: CapabilityVersion = CapabilityVersion(68);

    /// current capability version.
    pub const CURRENT: CapabilityVersion = CapabilityVersion(106);

    /// reject clients older than [`CapabilityVersion::MIN`].
    pub fn check(self) -> Result<()> {
        if self < Self::MIN {
            return Err(Error::UnsupportedVersion(self.0));
        }
        Ok(())
    }
}

impl Default for CapabilityVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}
