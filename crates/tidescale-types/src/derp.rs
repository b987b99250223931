//! relay (derp) map types.
//!
//! field names match the client's wire format. regions are kept in a
//! `BTreeMap` so the serialized form, and therefore the checksum, is stable.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// the set of relay regions advertised to nodes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DerpMap {
    pub regions: BTreeMap<i32, DerpRegion>,

    /// camelcase on the wire.
    #[serde(rename = "omitDefaultRegions", default)]
    pub omit_default_regions: bool,
}

impl DerpMap {
    /// hex sha-256 over the canonical json encoding.
    ///
    /// used to suppress resending an unchanged map in delta responses.
    pub fn checksum(&self) -> String {
        let encoded = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&encoded))
    }
}

/// a relay region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DerpRegion {
    #[serde(rename = "RegionID")]
    pub region_id: i32,
    pub region_code: String,
    pub region_name: String,
    #[serde(default)]
    pub avoid: bool,
    pub nodes: Vec<DerpNode>,
}

/// a single relay server.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DerpNode {
    pub name: String,

    #[serde(rename = "RegionID")]
    pub region_id: i32,

    pub host_name: String,

    #[serde(rename = "IPv4", default, skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<String>,

    #[serde(rename = "IPv6", default, skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<String>,

    /// 0 means 3478, -1 disables stun.
    #[serde(rename = "STUNPort", default)]
    pub stun_port: i32,

    /// 0 means 443.
    #[serde(rename = "DERPPort", default)]
    pub derp_port: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(id: i32) -> DerpRegion {
        DerpRegion {
            region_id: id,
            region_code: format!("r{id}"),
            region_name: format!("region {id}"),
            avoid: false,
            nodes: vec![DerpNode {
                name: format!("{id}a"),
                region_id: id,
                host_name: format!("derp{id}.example.com"),
                ..Default::default()
            }],
        }
    }

    #[test]
    fn test_checksum_stable_across_insert_order() {
        let mut a = DerpMap::default();
        a.regions.insert(1, region(1));
        a.regions.insert(2, region(2));

        let mut b = DerpMap::default();
        b.regions.insert(2, region(2));
        b.regions.insert(1, region(1));

        assert_eq!(a.checksum(), b.checksum());
    }

    #[test]
    fn test_checksum_changes_with_content() {
        let mut map = DerpMap::default();
        map.regions.insert(1, region(1));
        let before = map.checksum();

        map.regions.get_mut(&1).unwrap().avoid = true;
        assert_ne!(before, map.checksum());
    }

    #[test]
    fn test_wire_field_names() {
        let mut map = DerpMap::default();
        map.regions.insert(7, region(7));
        let json = serde_json::to_string(&map).unwrap();
        assert!(json.contains("\"Regions\""));
        assert!(json.contains("\"RegionID\":7"));
        assert!(json.contains("\"omitDefaultRegions\""));
    }
}
