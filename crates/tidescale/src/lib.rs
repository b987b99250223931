//! tidescale library - control server state, handlers and application setup.
//!
//! - [`broker`]: per-tailnet session registry and change fan-out
//! - [`registration`]: auth-key and interactive machine registration
//! - [`mapper`]: network map snapshots and deltas
//! - [`poll`]: the streaming map long-poll
//! - [`reaper`]: ephemeral node and registration cleanup
//! - [`handlers`]: http handlers for the control endpoints
//! - [`cli`]: command-line interface

#![warn(missing_docs)]

pub mod binder;
pub mod broker;
pub mod cli;
pub mod error;
pub mod handlers;
pub mod map_session;
pub mod mapper;
pub mod poll;
pub mod reaper;
pub mod registration;

pub use error::{Error, Result};

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tidescale_db::{AddressAllocator, TidescaleDb};
use tidescale_types::Config;

use crate::broker::Broker;
use crate::mapper::Mapper;
use crate::poll::Poller;
use crate::reaper::Reaper;
use crate::registration::Registrar;

/// shared state of the control server.
#[derive(Clone)]
pub struct AppState {
    /// persistent storage.
    pub db: TidescaleDb,
    /// server configuration.
    pub config: Config,
    /// live sessions and change notifications.
    pub broker: Broker,
    /// machine registration.
    pub registrar: Registrar,
    /// network map rendering.
    pub mapper: Mapper,
    /// map long-polls.
    pub poller: Poller,
}

impl AppState {
    /// wire up the server components around `db` and `broker`.
    pub fn new(db: TidescaleDb, config: Config, broker: Broker) -> Self {
        let mapper = Mapper::new(db.clone(), config.clone(), broker.clone());
        let registrar = Registrar::new(
            db.clone(),
            config.clone(),
            broker.clone(),
            Arc::new(AddressAllocator::new()),
        );
        let poller = Poller::new(
            db.clone(),
            mapper.clone(),
            broker.clone(),
            config.tuning.clone(),
        );
        Self {
            db,
            config,
            broker,
            registrar,
            mapper,
            poller,
        }
    }

    /// a reaper over this state's storage and broker.
    pub fn reaper(&self) -> Reaper {
        Reaper::new(
            self.db.clone(),
            self.broker.clone(),
            self.config.tuning.ephemeral_inactivity_timeout,
            self.config.tuning.registration_ttl,
        )
    }
}

/// create the axum application with all routes.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/machine/register", post(handlers::register))
        .route("/machine/map", post(handlers::map))
        .route("/a/{code}", get(handlers::auth))
        .route("/health", get(handlers::health))
        .with_state(state)
}
