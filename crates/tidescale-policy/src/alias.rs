//! aliases: the names used in src, dst, tag owner and approver lists.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use ipnet::IpNet;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::error::ParseError;

/// a reference to a set of nodes or addresses.
///
/// parsing follows the resolution precedence: `*`, then `autogroup:`, then
/// user logins, `group:` and `tag:`. bare names are host aliases looked up in
/// the policy's `hosts` table. text that reads as an address parses as a
/// literal, and [`AclPolicy::parse`](crate::AclPolicy::parse) turns it back
/// into a host alias when a host of that name exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Alias {
    /// every node.
    Wildcard,
    /// built-in group.
    Autogroup(Autogroup),
    /// user login (`alice@example.com`).
    User(String),
    /// named group, prefix included (`group:eng`).
    Group(String),
    /// tag, prefix included (`tag:server`).
    Tag(String),
    /// name from the `hosts` table.
    Host(String),
    /// literal address or prefix.
    Prefix(IpNet),
}

/// built-in autogroups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Autogroup {
    /// devices owned by people (untagged).
    Member,
    /// tagged devices.
    Tagged,
    /// devices owned by the same user as the other side of the rule.
    SelfDevices,
    /// the internet, reached through exit nodes.
    Internet,
    /// everything, including addresses outside the tailnet.
    DangerAll,
    /// any ssh user except root. only valid in ssh `users`.
    NonRoot,
}

impl Autogroup {
    fn name(self) -> &'static str {
        match self {
            Autogroup::Member => "member",
            Autogroup::Tagged => "tagged",
            Autogroup::SelfDevices => "self",
            Autogroup::Internet => "internet",
            Autogroup::DangerAll => "danger-all",
            Autogroup::NonRoot => "nonroot",
        }
    }
}

impl Alias {
    /// parse an alias string.
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseError::EmptyAlias);
        }
        if s == "*" {
            return Ok(Alias::Wildcard);
        }
        if let Some(name) = s.strip_prefix("autogroup:") {
            let group = match name {
                "member" | "members" => Autogroup::Member,
                "tagged" => Autogroup::Tagged,
                "self" => Autogroup::SelfDevices,
                "internet" => Autogroup::Internet,
                "danger-all" => Autogroup::DangerAll,
                "nonroot" => Autogroup::NonRoot,
                _ => return Err(ParseError::UnknownAutogroup(name.to_string())),
            };
            return Ok(Alias::Autogroup(group));
        }
        if s.contains('@') {
            return Ok(Alias::User(s.to_string()));
        }
        if s.starts_with("group:") {
            return Ok(Alias::Group(s.to_string()));
        }
        if s.starts_with("tag:") {
            return Ok(Alias::Tag(s.to_string()));
        }
        if let Some(net) = parse_prefix(s) {
            return Ok(Alias::Prefix(net));
        }
        if s.contains('/') || s.parse::<IpAddr>().is_ok() {
            return Err(ParseError::InvalidCidr(s.to_string()));
        }
        Ok(Alias::Host(s.to_string()))
    }

    /// whether this alias names people rather than infrastructure.
    pub fn is_person(&self) -> bool {
        matches!(
            self,
            Alias::User(_) | Alias::Group(_) | Alias::Autogroup(Autogroup::Member)
        )
    }
}

/// parse `100.64.0.1` as a host prefix or `10.0.0.0/8` as a network.
pub fn parse_prefix(s: &str) -> Option<IpNet> {
    if let Ok(net) = s.parse::<IpNet>() {
        return Some(net.trunc());
    }
    s.parse::<IpAddr>().ok().map(IpNet::from)
}

impl fmt::Display for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alias::Wildcard => f.write_str("*"),
            Alias::Autogroup(g) => write!(f, "autogroup:{}", g.name()),
            Alias::User(s) | Alias::Group(s) | Alias::Tag(s) | Alias::Host(s) => f.write_str(s),
            Alias::Prefix(net) => write!(f, "{net}"),
        }
    }
}

impl FromStr for Alias {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Alias::parse(s)
    }
}

impl Serialize for Alias {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Alias {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Alias::parse(&s).map_err(de::Error::custom)
    }
}
