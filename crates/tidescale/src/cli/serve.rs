//! the `serve` subcommand - runs the control server.

use std::net::SocketAddr;

use clap::Args;
use color_eyre::eyre::{Context, Result};
use tidescale_db::TidescaleDb;
use tidescale_types::Config;
use tokio::net::TcpListener;
use tracing::info;

use super::{ConfigArgs, init_logging};
use crate::AppState;
use crate::broker::Broker;

/// run the tidescale control server
#[derive(Args, Debug)]
pub struct ServeCommand {
    #[command(flatten)]
    common: ConfigArgs,

    /// address to listen on
    #[arg(long, env = "TIDESCALE_LISTEN_ADDR")]
    listen_addr: Option<String>,

    /// server url (for client configuration)
    #[arg(long, env = "TIDESCALE_SERVER_URL")]
    server_url: Option<String>,

    /// base domain for magicdns
    #[arg(long, env = "TIDESCALE_BASE_DOMAIN")]
    base_domain: Option<String>,

    /// tailnet that interactive registrations join
    #[arg(long, env = "TIDESCALE_DEFAULT_TAILNET")]
    default_tailnet: Option<String>,
}

impl ServeCommand {
    /// convert cli arguments into a config struct, merging with config file if present.
    ///
    /// priority order: defaults -> config file -> cli flags
    fn into_config(self) -> Result<Config> {
        let mut config = self.common.load()?;

        if let Some(listen_addr) = self.listen_addr {
            config.listen_addr = listen_addr;
        }
        if let Some(server_url) = self.server_url {
            config.server_url = server_url;
        }
        if let Some(base_domain) = self.base_domain {
            config.base_domain = base_domain;
        }
        if let Some(default_tailnet) = self.default_tailnet {
            config.default_tailnet = default_tailnet;
        }

        Ok(config)
    }

    /// run the serve command
    pub async fn run(self) -> Result<()> {
        let config = self.into_config()?;
        init_logging(&config.log_level)?;

        info!("Starting tidescale...");
        info!("Database: {}", config.database.connection_string);
        info!("Listen address: {}", config.listen_addr);
        info!("Server URL: {}", config.server_url);

        // ensure parent directory exists for sqlite databases
        if config.database.db_type == "sqlite" {
            let db_path = std::path::Path::new(&config.database.connection_string);
            if let Some(parent) = db_path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                info!("Creating database directory: {:?}", parent);
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create database directory: {:?}", parent)
                })?;
            }
        }

        let db = TidescaleDb::new(&config)
            .await
            .context("failed to initialize database")?;

        let broker = Broker::new(config.tuning.session_grace_period);
        let state = AppState::new(db, config.clone(), broker);

        let tailnet = state
            .registrar
            .default_tailnet()
            .await
            .context("failed to set up the default tailnet")?;
        info!(tailnet = %tailnet.name, "default tailnet ready");

        let _reaper = state.reaper().spawn(config.tuning.reaper_interval);

        let addr: SocketAddr = config
            .listen_addr
            .parse()
            .context("invalid listen address")?;
        info!("Starting HTTP server on {}", addr);

        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, crate::create_app(state))
            .await
            .context("server error")?;

        Ok(())
    }
}
