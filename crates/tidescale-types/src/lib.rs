//! core types for tidescale, a self-hosted control server for a mesh overlay.
//!
//! this crate provides the data structures shared by every other crate:
//! - [`node`]: a registered device within a tailnet
//! - [`tailnet`]: the isolated network namespace, its policy documents and toggles
//! - [`user`]: person and service identities scoped to a tailnet
//! - [`auth_key`]: bearer credentials for non-interactive registration
//! - [`registration`]: pending interactive registrations
//! - [`config`]: application configuration

mod auth_key;
mod config;
mod derp;
mod dns;
mod error;
mod keys;
mod node;
mod registration;
mod tag;
mod tailnet;
mod user;

pub mod test_utils;

pub use auth_key::{AUTH_KEY_PREFIX, AuthKey, AuthKeyId, AuthKeyToken, AuthKeyTokenError};
pub use config::{Config, DatabaseConfig, TuningConfig};
pub use derp::{DerpMap, DerpNode, DerpRegion};
pub use dns::DnsSettings;
pub use error::Error;
pub use keys::{DiscoKey, KeyParseError, MachineKey, NodeKey};
pub use node::{HostInfo, NetInfo, Node, NodeBuilder, NodeId, Service, ServiceProto, is_exit_route};
pub use registration::{RegistrationId, RegistrationRequest};
pub use tag::{MAX_TAG_NAME_LEN, Tag, TagError};
pub use tailnet::{Tailnet, TailnetId};
pub use user::{User, UserId, UserType};

/// result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;
