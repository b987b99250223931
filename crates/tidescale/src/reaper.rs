//! background cleanup of ephemeral nodes and stale registrations.
//!
//! an ephemeral node that has been offline for longer than the inactivity
//! timeout is deleted and its peers are told. a node that still has a
//! session, or is inside its reconnect grace period, is left alone.

use std::time::Duration;

use chrono::Utc;
use tidescale_db::{Repository, TidescaleDb};
use tracing::{debug, info, warn};

use crate::broker::{Broker, Signal};
use crate::error::{Error, Result};

/// what one collection pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Collected {
    /// ephemeral nodes deleted.
    pub nodes: usize,
    /// registration requests past their ttl.
    pub registrations: u64,
}

/// deletes inactive ephemeral nodes and expired registration requests.
#[derive(Clone)]
pub struct Reaper {
    db: TidescaleDb,
    broker: Broker,
    inactivity: Duration,
    registration_ttl: Duration,
}

impl Reaper {
    /// `inactivity` of zero disables node collection.
    pub fn new(
        db: TidescaleDb,
        broker: Broker,
        inactivity: Duration,
        registration_ttl: Duration,
    ) -> Self {
        Self {
            db,
            broker,
            inactivity,
            registration_ttl,
        }
    }

    /// run one collection pass.
    ///
    /// failures on individual nodes are logged and skipped.
    pub async fn collect(&self) -> Result<Collected> {
        let mut collected = Collected::default();
        let now = Utc::now();

        if !self.inactivity.is_zero() {
            let cutoff = now - chrono::Duration::from_std(self.inactivity).map_err(Error::internal)?;
            for node in self.db.list_inactive_ephemeral(cutoff).await? {
                let (tailnet, node_id) = (node.tailnet_id(), node.id());
                if self.broker.has_session(tailnet, node_id) {
                    continue;
                }
                if let Err(e) = self.db.purge_node(node_id).await {
                    warn!(node_id = %node_id, error = %e, "failed to delete ephemeral node");
                    continue;
                }
                info!(node_id = %node_id, tailnet = %tailnet, "deleted inactive ephemeral node");
                collected.nodes += 1;

                if let Err(e) = self
                    .broker
                    .notify(tailnet, Signal::PeersRemoved(vec![node_id]), &[])
                {
                    warn!(node_id = %node_id, error = %e, "failed to announce removal");
                }
            }
        }

        let cutoff = now - chrono::Duration::from_std(self.registration_ttl).map_err(Error::internal)?;
        collected.registrations = self.db.delete_registrations_before(cutoff).await?;
        if collected.registrations > 0 {
            debug!(count = collected.registrations, "removed stale registrations");
        }

        Ok(collected)
    }

    /// run [`collect`](Self::collect) every `interval` until the task is
    /// aborted.
    pub fn spawn(self, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                inactivity_secs = self.inactivity.as_secs(),
                interval_secs = interval.as_secs(),
                "starting reaper"
            );

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                match self.collect().await {
                    Ok(collected) if collected != Collected::default() => {
                        debug!(?collected, "reaper pass completed");
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "reaper pass failed"),
                }
            }
        })
    }
}
