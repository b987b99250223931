//! wire identity keys.
//!
//! these types wrap 32 raw key bytes. on the wire they are carried as a
//! type prefix followed by lowercase hex (e.g. `nodekey:0a1b...`). the
//! control server never performs cryptography with them; they are opaque
//! identities.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// length of every key in bytes.
pub const KEY_LEN: usize = 32;

/// error returned when a prefixed-hex key cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyParseError {
    /// the string does not start with the expected prefix.
    #[error("key must start with '{0}'")]
    MissingPrefix(&'static str),

    /// the hex portion is not valid hex.
    #[error("key is not valid hex")]
    InvalidHex,

    /// the decoded key has the wrong length.
    #[error("key must be {KEY_LEN} bytes, got {0}")]
    InvalidLength(usize),
}

macro_rules! wire_key {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name([u8; KEY_LEN]);

        impl $name {
            /// textual prefix used on the wire.
            pub const PREFIX: &'static str = $prefix;

            /// wrap raw key bytes.
            pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
                Self(bytes)
            }

            /// raw key bytes.
            pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
                &self.0
            }

            /// generate a random key. only meaningful for tests and fixtures.
            pub fn random() -> Self {
                use rand::Rng;
                Self(rand::rng().random())
            }

            /// whether the key is all zeroes (unset).
            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }

            /// short representation for logging.
            pub fn short_string(&self) -> String {
                format!("{}{}", $prefix, hex::encode(&self.0[..4]))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $prefix, hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.short_string())
            }
        }

        impl FromStr for $name {
            type Err = KeyParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let hex_part = s
                    .strip_prefix($prefix)
                    .ok_or(KeyParseError::MissingPrefix($prefix))?;
                let bytes = hex::decode(hex_part).map_err(|_| KeyParseError::InvalidHex)?;
                let len = bytes.len();
                let bytes: [u8; KEY_LEN] = bytes
                    .try_into()
                    .map_err(|_| KeyParseError::InvalidLength(len))?;
                Ok(Self(bytes))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                if s.is_empty() {
                    return Ok(Self::default());
                }
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

wire_key!(
    /// machine key: the stable hardware identity of a device.
    ///
    /// survives node key rotation and is what the transport layer
    /// authenticates.
    MachineKey,
    "mkey:"
);

wire_key!(
    /// node key: the rotatable session identity of a node.
    NodeKey,
    "nodekey:"
);

wire_key!(
    /// disco key: used by peers for path discovery.
    DiscoKey,
    "discokey:"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_string() {
        let mut bytes = [0u8; KEY_LEN];
        bytes[..4].copy_from_slice(&[0xab, 0xcd, 0xef, 0x12]);
        assert_eq!(MachineKey::from_bytes(bytes).short_string(), "mkey:abcdef12");
    }

    #[test]
    fn test_display_parse() {
        let key = NodeKey::random();
        let s = key.to_string();
        assert!(s.starts_with("nodekey:"));
        assert_eq!(s.len(), "nodekey:".len() + 64);
        assert_eq!(s.parse::<NodeKey>().unwrap(), key);
    }

    #[test]
    fn test_wrong_prefix_rejected() {
        let key = NodeKey::random().to_string();
        let err = key.replace("nodekey:", "mkey:").parse::<NodeKey>().unwrap_err();
        assert_eq!(err, KeyParseError::MissingPrefix("nodekey:"));
    }

    #[test]
    fn test_short_key_rejected() {
        let err = "discokey:abcd".parse::<DiscoKey>().unwrap_err();
        assert_eq!(err, KeyParseError::InvalidLength(2));
    }

    #[test]
    fn test_serde_as_prefixed_hex() {
        let key = DiscoKey::from_bytes([7u8; KEY_LEN]);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"discokey:{}\"", "07".repeat(32)));
        let parsed: DiscoKey = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn test_empty_string_is_zero_key() {
        let key: DiscoKey = serde_json::from_str("\"\"").unwrap();
        assert!(key.is_zero());
    }
}
