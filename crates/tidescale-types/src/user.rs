//! user identities.
//!
//! users are scoped to a single tailnet. a person is backed by an external
//! identity (the `account_id`), a service user is the system identity that
//! owns auth keys created without a specific person. every tailnet has
//! exactly one service user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tailnet::TailnetId;

/// unique identifier for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub u64);

impl UserId {
    /// the synthetic identity shown for tagged devices.
    ///
    /// tagged nodes never expose their owning person to peers.
    pub const TAGGED_DEVICES: UserId = UserId(2147455555);
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// the kind of identity a user represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    /// a human, backed by an external identity provider.
    #[default]
    Person,
    /// the tailnet's system identity.
    Service,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Person => "person",
            UserType::Service => "service",
        }
    }
}

impl std::str::FromStr for UserType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "person" => Ok(UserType::Person),
            "service" => Ok(UserType::Service),
            other => Err(format!("unknown user type: {other}")),
        }
    }
}

/// a user within a tailnet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub tailnet_id: TailnetId,

    /// login name, usually an email address. used for policy matching.
    pub name: String,

    pub display_name: Option<String>,

    /// subject identifier at the external identity provider.
    pub account_id: Option<String>,

    pub user_type: UserType,

    pub profile_pic_url: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl User {
    /// create a new person with the given login name.
    pub fn new(id: UserId, tailnet_id: TailnetId, name: impl Into<String>) -> Self {
        Self {
            id,
            tailnet_id,
            name: name.into(),
            display_name: None,
            account_id: None,
            user_type: UserType::Person,
            profile_pic_url: None,
            created_at: Utc::now(),
        }
    }

    /// create the service user for a tailnet.
    pub fn service(id: UserId, tailnet_id: TailnetId) -> Self {
        Self {
            user_type: UserType::Service,
            display_name: Some("Service".to_string()),
            ..Self::new(id, tailnet_id, "service")
        }
    }

    /// the login name used in policy evaluation and user profiles.
    pub fn login_name(&self) -> &str {
        &self.name
    }

    /// display name, falling back to the login name.
    pub fn display(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.name)
    }

    pub fn is_service(&self) -> bool {
        self.user_type == UserType::Service
    }

    /// the synthetic user rendered for tagged devices.
    pub fn tagged_devices(tailnet_id: TailnetId) -> Self {
        Self {
            display_name: Some("Tagged Devices".to_string()),
            ..Self::new(UserId::TAGGED_DEVICES, tailnet_id, "tagged-devices")
        }
    }
}
