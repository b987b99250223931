//! auth keys: bearer credentials for non-interactive registration.
//!
//! the token handed to operators is `tskey-auth-<key>-<secret>`. the `key`
//! part is public and used for lookup. only a sha-256 hash of the secret is
//! stored, and it is compared in constant time.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::tag::Tag;
use crate::tailnet::TailnetId;
use crate::user::UserId;

/// prefix of every auth key token.
pub const AUTH_KEY_PREFIX: &str = "tskey-auth-";

const KEY_HEX_LEN: usize = 12;
const SECRET_HEX_LEN: usize = 48;

/// unique identifier for an auth key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuthKeyId(pub u64);

impl fmt::Display for AuthKeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// a stored auth key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthKey {
    pub id: AuthKeyId,

    /// public lookup prefix.
    pub key: String,

    /// sha-256 of the secret suffix.
    #[serde(skip_serializing, default)]
    pub secret_hash: Vec<u8>,

    pub tailnet_id: TailnetId,

    /// the user nodes registered with this key belong to.
    pub user_id: UserId,

    /// nodes registered with this key are deleted once inactive.
    pub ephemeral: bool,

    /// nodes skip manual authorization.
    pub pre_authorized: bool,

    /// tags stamped onto registered nodes.
    pub tags: Vec<Tag>,

    pub expires_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl AuthKey {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expiry) if expiry <= now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// whether `token` carries this key's secret.
    pub fn verify(&self, token: &AuthKeyToken) -> bool {
        token.key() == self.key && token.verify_hash(&self.secret_hash)
    }
}

/// a parsed `tskey-auth-<key>-<secret>` token.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AuthKeyToken {
    key: String,
    secret: String,
}

impl AuthKeyToken {
    /// generate a new random token.
    pub fn generate() -> Self {
        use rand::Rng;
        let mut rng = rand::rng();
        let key: [u8; KEY_HEX_LEN / 2] = rng.random();
        let secret: [u8; SECRET_HEX_LEN / 2] = rng.random();
        Self {
            key: hex::encode(key),
            secret: hex::encode(secret),
        }
    }

    /// the public lookup part.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// sha-256 of the secret, for storage.
    pub fn secret_hash(&self) -> [u8; 32] {
        Sha256::digest(self.secret.as_bytes()).into()
    }

    /// constant-time comparison against a stored hash.
    pub fn verify_hash(&self, stored: &[u8]) -> bool {
        self.secret_hash()[..].ct_eq(stored).into()
    }
}

impl fmt::Display for AuthKeyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{AUTH_KEY_PREFIX}{}-{}", self.key, self.secret)
    }
}

// never print the secret
impl fmt::Debug for AuthKeyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthKeyToken({AUTH_KEY_PREFIX}{}-***)", self.key)
    }
}

impl FromStr for AuthKeyToken {
    type Err = AuthKeyTokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix(AUTH_KEY_PREFIX)
            .ok_or(AuthKeyTokenError::MissingPrefix)?;
        let (key, secret) = rest
            .split_once('-')
            .ok_or(AuthKeyTokenError::MissingSeparator)?;

        if key.len() != KEY_HEX_LEN || secret.len() != SECRET_HEX_LEN {
            return Err(AuthKeyTokenError::InvalidLength);
        }
        if !key
            .chars()
            .chain(secret.chars())
            .all(|c| c.is_ascii_hexdigit())
        {
            return Err(AuthKeyTokenError::InvalidHex);
        }

        Ok(Self {
            key: key.to_ascii_lowercase(),
            secret: secret.to_ascii_lowercase(),
        })
    }
}

/// error type for malformed auth key tokens.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthKeyTokenError {
    #[error("auth key must start with '{AUTH_KEY_PREFIX}'")]
    MissingPrefix,

    #[error("auth key must have the form {AUTH_KEY_PREFIX}<key>-<secret>")]
    MissingSeparator,

    #[error("auth key has the wrong length")]
    InvalidLength,

    #[error("auth key contains non-hex characters")]
    InvalidHex,
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn well_formed_tokens_parse(key in "[0-9a-f]{12}", secret in "[0-9a-f]{48}") {
            let s = format!("{AUTH_KEY_PREFIX}{key}-{secret}");
            let token: AuthKeyToken = s.parse().unwrap();
            prop_assert_eq!(token.to_string(), s);
        }

        #[test]
        fn arbitrary_input_never_panics(s in ".*") {
            let _ = s.parse::<AuthKeyToken>();
        }
    }
}
