//! configuration types for tidescale.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::derp::DerpMap;

/// main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// externally reachable url, used to build auth urls.
    pub server_url: String,

    /// address to bind the http server to.
    pub listen_addr: String,

    /// base domain for magicdns names (`<node>.<tailnet>.<base_domain>`).
    pub base_domain: String,

    /// name of the tailnet new machines join when no auth key says otherwise.
    pub default_tailnet: String,

    pub database: DatabaseConfig,

    /// relay map used by tailnets without an override.
    pub derp: DerpMap,

    pub tuning: TuningConfig,

    /// log level: trace, debug, info, warn or error.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".to_string(),
            listen_addr: "0.0.0.0:8080".to_string(),
            base_domain: "tidescale.net".to_string(),
            default_tailnet: "default".to_string(),
            database: DatabaseConfig::default(),
            derp: DerpMap::default(),
            tuning: TuningConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

/// database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// "sqlite" or "postgres".
    pub db_type: String,

    /// file path for sqlite, connection url for postgres.
    pub connection_string: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: "sqlite".to_string(),
            connection_string: "/var/lib/tidescale/db.sqlite".to_string(),
        }
    }
}

/// timers and windows for the session and registration machinery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    /// interval between keep-alive frames on streaming polls.
    #[serde(with = "humantime_serde")]
    pub keep_alive_interval: Duration,

    /// interval at which a streaming poll re-checks whether it is stale.
    #[serde(with = "humantime_serde")]
    pub sync_interval: Duration,

    /// how long after a disconnect peers are told the node went away.
    #[serde(with = "humantime_serde")]
    pub session_grace_period: Duration,

    /// ephemeral nodes offline for longer than this are deleted.
    #[serde(with = "humantime_serde")]
    pub ephemeral_inactivity_timeout: Duration,

    /// how often the reaper runs.
    #[serde(with = "humantime_serde")]
    pub reaper_interval: Duration,

    /// default node key validity for new registrations.
    #[serde(with = "humantime_serde")]
    pub node_key_validity: Duration,

    /// how long a followup registration poll waits before giving up.
    #[serde(with = "humantime_serde")]
    pub followup_timeout: Duration,

    /// unresolved registration requests older than this are removed.
    #[serde(with = "humantime_serde")]
    pub registration_ttl: Duration,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            keep_alive_interval: Duration::from_secs(60),
            sync_interval: Duration::from_secs(5),
            session_grace_period: Duration::from_secs(10),
            ephemeral_inactivity_timeout: Duration::from_secs(30 * 60),
            reaper_interval: Duration::from_secs(60),
            node_key_validity: Duration::from_secs(180 * 24 * 60 * 60),
            followup_timeout: Duration::from_secs(60),
            registration_ttl: Duration::from_secs(60 * 60),
        }
    }
}
