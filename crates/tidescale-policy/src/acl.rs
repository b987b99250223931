//! legacy acl entries: `{"action": "accept", "src": [..], "dst": ["alias:ports"]}`.

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::alias::Alias;
use crate::capability::{NetworkCapability, Protocol};
use crate::error::{ParseError, ValidationError};

/// one acl entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AclEntry {
    /// only `accept` is supported.
    pub action: String,

    /// protocol restriction for every destination.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proto: Option<Protocol>,

    /// sources.
    pub src: Vec<Alias>,

    /// destinations with ports.
    pub dst: Vec<AclDestination>,
}

impl AclEntry {
    /// the allow-everything entry used when no policy is configured.
    pub fn allow_all() -> Self {
        Self {
            action: "accept".to_string(),
            proto: None,
            src: vec![Alias::Wildcard],
            dst: vec![AclDestination {
                alias: Alias::Wildcard,
                ports: vec![NetworkCapability::WILDCARD],
            }],
        }
    }

    /// check the entry's structure.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.action != "accept" {
            return Err(ValidationError::UnsupportedAction(self.action.clone()));
        }
        if self.src.is_empty() {
            return Err(ValidationError::EmptySrc);
        }
        if self.dst.is_empty() {
            return Err(ValidationError::EmptyDst);
        }
        Ok(())
    }

    /// destinations with the entry's protocol applied to every port.
    pub(crate) fn destinations(&self) -> impl Iterator<Item = (&Alias, Vec<NetworkCapability>)> {
        self.dst.iter().map(|d| {
            let caps = d
                .ports
                .iter()
                .map(|cap| NetworkCapability {
                    protocol: self.proto.or(cap.protocol),
                    ports: cap.ports,
                })
                .collect();
            (&d.alias, caps)
        })
    }
}

/// a destination written as `alias:ports`.
#[derive(Debug, Clone, PartialEq)]
pub struct AclDestination {
    /// who.
    pub alias: Alias,
    /// which ports.
    pub ports: Vec<NetworkCapability>,
}

impl AclDestination {
    /// parse `tag:web:80,443`, `*:*` or `10.0.0.0/8:22`.
    ///
    /// the ports follow the last colon, so ipv6 addresses need a prefix
    /// length: `fd7a::1/128:22`.
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        let (alias, ports) = s
            .rsplit_once(':')
            .ok_or_else(|| ParseError::MissingPorts(s.to_string()))?;
        Ok(Self {
            alias: Alias::parse(alias)?,
            ports: NetworkCapability::parse_list(None, ports)?,
        })
    }
}

impl Serialize for AclDestination {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let ports: Vec<String> = self.ports.iter().map(|p| p.to_string()).collect();
        serializer.serialize_str(&format!("{}:{}", self.alias, ports.join(",")))
    }
}

impl<'de> Deserialize<'de> for AclDestination {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        AclDestination::parse(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidescale_proto::PortRange;

    #[test]
    fn test_parse_destination() {
        let dst = AclDestination::parse("tag:web:80,443").unwrap();
        assert_eq!(dst.alias, Alias::Tag("tag:web".into()));
        assert_eq!(dst.ports.len(), 2);

        let any = AclDestination::parse("*:*").unwrap();
        assert_eq!(any.alias, Alias::Wildcard);
        assert_eq!(any.ports, vec![NetworkCapability::WILDCARD]);

        let net = AclDestination::parse("10.0.0.0/8:22").unwrap();
        assert_eq!(net.alias, Alias::Prefix("10.0.0.0/8".parse().unwrap()));
    }

    #[test]
    fn test_missing_ports() {
        assert!(matches!(
            AclDestination::parse("tagless"),
            Err(ParseError::MissingPorts(_))
        ));
    }

    #[test]
    fn test_entry_protocol_applies_to_ports() {
        let entry: AclEntry = serde_json::from_str(
            r#"{"action": "accept", "proto": "udp", "src": ["*"], "dst": ["*:53"]}"#,
        )
        .unwrap();
        let (_, caps) = entry.destinations().next().unwrap();
        assert_eq!(caps[0].protocol, Some(Protocol::Udp));
        assert_eq!(caps[0].ports, PortRange::single(53));
    }

    #[test]
    fn test_only_accept() {
        let mut entry = AclEntry::allow_all();
        assert!(entry.validate().is_ok());
        entry.action = "deny".into();
        assert!(matches!(
            entry.validate(),
            Err(ValidationError::UnsupportedAction(_))
        ));
    }
}
