//! network capabilities: which protocols and ports a rule opens.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use tidescale_proto::PortRange;

use crate::error::ParseError;

/// ip protocol named in a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    /// tcp.
    Tcp,
    /// udp.
    Udp,
    /// icmp, covering both v4 and v6.
    Icmp,
    /// gre.
    Gre,
    /// esp.
    Esp,
    /// ah.
    Ah,
    /// sctp.
    Sctp,
    /// igmp.
    Igmp,
}

impl Protocol {
    /// parse a protocol name or iana number.
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        let proto = match s.to_ascii_lowercase().as_str() {
            "tcp" | "6" => Protocol::Tcp,
            "udp" | "17" => Protocol::Udp,
            "icmp" | "1" | "ipv6-icmp" | "58" => Protocol::Icmp,
            "gre" | "47" => Protocol::Gre,
            "esp" | "50" => Protocol::Esp,
            "ah" | "51" => Protocol::Ah,
            "sctp" | "132" => Protocol::Sctp,
            "igmp" | "2" => Protocol::Igmp,
            _ => return Err(ParseError::UnknownProtocol(s.to_string())),
        };
        Ok(proto)
    }

    fn name(self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Icmp => "icmp",
            Protocol::Gre => "gre",
            Protocol::Esp => "esp",
            Protocol::Ah => "ah",
            Protocol::Sctp => "sctp",
            Protocol::Igmp => "igmp",
        }
    }

    /// iana protocol numbers for the packet filter.
    pub fn numbers(self) -> Vec<i32> {
        match self {
            Protocol::Tcp => vec![6],
            Protocol::Udp => vec![17],
            Protocol::Icmp => vec![1, 58],
            Protocol::Gre => vec![47],
            Protocol::Esp => vec![50],
            Protocol::Ah => vec![51],
            Protocol::Sctp => vec![132],
            Protocol::Igmp => vec![2],
        }
    }

    /// whether the protocol has port numbers at all.
    pub fn has_ports(self) -> bool {
        matches!(self, Protocol::Tcp | Protocol::Udp | Protocol::Sctp)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Protocol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Protocol {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Protocol::parse(&s).map_err(de::Error::custom)
    }
}

/// protocol and ports opened by a rule.
///
/// written as `*`, `443`, `80-443`, `tcp:443`, `tcp:80-443` or `icmp:*`.
/// no protocol means the client default (tcp, udp and icmp).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetworkCapability {
    /// protocol, if restricted.
    pub protocol: Option<Protocol>,
    /// ports, inclusive.
    pub ports: PortRange,
}

impl NetworkCapability {
    /// every port on the default protocols.
    pub const WILDCARD: NetworkCapability = NetworkCapability {
        protocol: None,
        ports: PortRange {
            first: 0,
            last: 65535,
        },
    };

    /// parse one capability string.
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        match s.split_once(':') {
            Some((proto, ports)) => Ok(Self {
                protocol: Some(Protocol::parse(proto)?),
                ports: parse_ports(ports)?,
            }),
            None => Ok(Self {
                protocol: None,
                ports: parse_ports(s)?,
            }),
        }
    }

    /// parse an acl port list such as `22,80,8000-8100`.
    pub fn parse_list(protocol: Option<Protocol>, list: &str) -> Result<Vec<Self>, ParseError> {
        list.split(',')
            .map(|p| {
                Ok(Self {
                    protocol,
                    ports: parse_ports(p.trim())?,
                })
            })
            .collect()
    }

    /// whether this capability opens `port` for `proto`.
    pub fn allows(&self, proto: Protocol, port: u16) -> bool {
        let proto_ok = match self.protocol {
            Some(p) => p == proto,
            None => matches!(proto, Protocol::Tcp | Protocol::Udp | Protocol::Icmp),
        };
        proto_ok && self.ports.first <= port && port <= self.ports.last
    }

    /// protocol numbers for the filter rule. empty means the default set.
    pub fn ip_proto(&self) -> Vec<i32> {
        self.protocol.map(Protocol::numbers).unwrap_or_default()
    }

    /// ports as sent to clients. portless protocols always get every port.
    pub fn wire_ports(&self) -> PortRange {
        match self.protocol {
            Some(p) if !p.has_ports() => PortRange::any(),
            _ => self.ports,
        }
    }
}

fn parse_ports(s: &str) -> Result<PortRange, ParseError> {
    if s == "*" {
        return Ok(PortRange::any());
    }
    let port = |p: &str| p.parse::<u16>().map_err(|_| ParseError::InvalidPort(s.to_string()));
    match s.split_once('-') {
        Some((first, last)) => {
            let (first, last) = (port(first)?, port(last)?);
            if first > last {
                return Err(ParseError::InvalidPort(s.to_string()));
            }
            Ok(PortRange { first, last })
        }
        None => Ok(PortRange::single(port(s)?)),
    }
}

impl fmt::Display for NetworkCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(proto) = self.protocol {
            write!(f, "{proto}:")?;
        }
        let PortRange { first, last } = self.ports;
        if first == 0 && last == 65535 {
            f.write_str("*")
        } else if first == last {
            write!(f, "{first}")
        } else {
            write!(f, "{first}-{last}")
        }
    }
}

impl Serialize for NetworkCapability {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NetworkCapability {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        NetworkCapability::parse(&s).map_err(de::Error::custom)
    }
}
