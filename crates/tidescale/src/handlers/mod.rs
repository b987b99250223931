//! http handlers for the control endpoints.

mod auth;
mod error;
mod health;
mod machine_key_context;
mod map;
mod register;

pub use auth::auth;
pub use error::{ApiError, OptionExt, ResultExt};
pub use health::health;
pub use machine_key_context::{MachineKeyContext, peer_identity};
pub use map::map;
pub use register::register;
