//! grants: `{"src": [..], "dst": [..], "ip": [..], "app": {..}}`.

use serde::{Deserialize, Serialize};
use tidescale_proto::CapMap;

use crate::alias::Alias;
use crate::capability::NetworkCapability;
use crate::error::ValidationError;

/// a grant of network and/or application capabilities from `src` to `dst`.
///
/// grants only ever add access. several matching grants combine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grant {
    /// sources.
    pub src: Vec<Alias>,

    /// destinations.
    pub dst: Vec<Alias>,

    /// network capabilities.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ip: Vec<NetworkCapability>,

    /// application capabilities, passed through to clients untouched.
    #[serde(default, skip_serializing_if = "CapMap::is_empty")]
    pub app: CapMap,
}

impl Grant {
    /// check the grant's structure.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.src.is_empty() {
            return Err(ValidationError::EmptySrc);
        }
        if self.dst.is_empty() {
            return Err(ValidationError::EmptyDst);
        }
        if self.ip.is_empty() && self.app.is_empty() {
            return Err(ValidationError::NoCapabilities);
        }
        Ok(())
    }
}
