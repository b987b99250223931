//! access control for tidescale.
//!
//! a tailnet's policy document combines acl entries and grants (network and
//! application capabilities), ssh rules, tag ownership and route
//! auto-approval. [`PolicyEngine`] compiles it once and answers every
//! question the control server asks: who may see whom, what packet filter a
//! node gets, who may ssh where, who may apply a tag, which routes are
//! approved. access is deny-by-default apart from the devices of a single
//! user, which can always reach each other.
//!
//! the separate [`IamPolicy`] decides who may join a tailnet and with what
//! role.

#![warn(missing_docs)]

pub mod acl;
pub mod alias;
mod auto_approve;
pub mod capability;
pub mod engine;
pub mod error;
pub mod expr;
pub mod grant;
pub mod hujson;
pub mod iam;
pub mod policy;
pub mod ssh;
mod tag_owner;

pub use acl::{AclDestination, AclEntry};
pub use alias::{Alias, Autogroup};
pub use capability::{NetworkCapability, Protocol};
pub use engine::{PolicyEngine, UserResolver, src_covers};
pub use error::{Error, ExprError, ParseError, Result, TagOwnerError, ValidationError};
pub use expr::{ClaimValue, Claims, Expr};
pub use grant::Grant;
pub use iam::{IamPolicy, Role};
pub use policy::{AclPolicy, AutoApprovers, NodeAttr};
pub use ssh::{SshActionType, SshPolicyRule};
