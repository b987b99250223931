//! validated tag identities.
//!
//! a tag is `tag:` followed by 1-50 lowercase alphanumeric characters,
//! hyphens or underscores. tagged nodes take their identity from their
//! tags instead of their owning user.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// maximum length for a tag name (after the `tag:` prefix).
pub const MAX_TAG_NAME_LEN: usize = 50;

const PREFIX: &str = "tag:";

/// a validated tag string.
///
/// ```
/// use tidescale_types::Tag;
///
/// let tag: Tag = "tag:server".parse().unwrap();
/// assert_eq!(tag.name(), "server");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(String);

impl Tag {
    /// create a new tag, validating the format.
    pub fn new(s: impl Into<String>) -> Result<Self, TagError> {
        let s = s.into();
        let name = s.strip_prefix(PREFIX).ok_or(TagError::MissingPrefix)?;
        if name.is_empty() {
            return Err(TagError::EmptyName);
        }
        if name.len() > MAX_TAG_NAME_LEN {
            return Err(TagError::NameTooLong(name.len()));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        {
            return Err(TagError::InvalidCharacters);
        }
        Ok(Self(s))
    }

    /// the full tag string (e.g. `tag:server`).
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// the name portion (e.g. `server`).
    pub fn name(&self) -> &str {
        &self.0[PREFIX.len()..]
    }

    /// parse every entry, failing on the first invalid one.
    pub fn parse_all<I, S>(tags: I) -> Result<Vec<Tag>, TagError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<Tag> = Vec::new();
        for raw in tags {
            let tag = Tag::new(raw.as_ref())?;
            if !out.contains(&tag) {
                out.push(tag);
            }
        }
        Ok(out)
    }
}

impl AsRef<str> for Tag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Tag {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Tag {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Tag {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for Tag {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Tag::new(s).map_err(serde::de::Error::custom)
    }
}

impl Serialize for Tag {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

/// error type for tag validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TagError {
    /// tag must start with `tag:`.
    #[error("tag must start with 'tag:'")]
    MissingPrefix,
    /// tag name cannot be empty.
    #[error("tag name cannot be empty")]
    EmptyName,
    /// tag name exceeds the maximum length.
    #[error("tag name too long ({0} chars, max {MAX_TAG_NAME_LEN})")]
    NameTooLong(usize),
    /// tag name contains invalid characters.
    #[error("tag name must be lowercase alphanumeric with hyphens or underscores")]
    InvalidCharacters,
}
