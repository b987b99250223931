//! the map long-poll.
//!
//! a non-streaming poll answers with one framed snapshot. a streaming poll
//! registers a session with the broker, sends a full snapshot and then keeps
//! the response body open: broker signals mark the session dirty, the sync
//! timer turns dirt into deltas, and the keep-alive timer fills silences.
//! the body is fed through a channel, so a client hanging up shows up as the
//! channel closing.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    body::Body,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use chrono::Utc;
use futures_util::StreamExt;
use serde::Serialize;
use tidescale_db::{Repository, TidescaleDb};
use tidescale_proto::{MapRequest, MapResponse};
use tidescale_types::{Node, NodeId, TuningConfig};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::binder::{Compression, marshal};
use crate::broker::{Broker, SIGNAL_BUFFER, SessionRegistry, Signal, TailnetSessions};
use crate::error::{Error, Result};
use crate::mapper::{Mapper, Synchronizer};
use crate::registration::apply_hostinfo;

/// frames queued between the session task and the response body.
const FRAME_BUFFER: usize = 8;

const FRAME_CONTENT_TYPE: &str = "application/octet-stream";

/// lifecycle of a streaming poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// updating the node and registering the session.
    Init,
    /// sending deltas and keep-alives.
    Streaming,
    /// deregistering and recording when the node was last seen.
    Draining,
}

/// serves map polls.
#[derive(Clone)]
pub struct Poller {
    db: TidescaleDb,
    mapper: Mapper,
    broker: Broker,
    tuning: TuningConfig,
}

impl Poller {
    /// a poller that renders maps with `mapper` and times sessions by `tuning`.
    pub fn new(db: TidescaleDb, mapper: Mapper, broker: Broker, tuning: TuningConfig) -> Self {
        Self {
            db,
            mapper,
            broker,
            tuning,
        }
    }

    /// answer a map request from `node`.
    pub async fn poll(&self, node: Node, req: MapRequest) -> Result<Response> {
        req.version.check()?;
        if req.read_only || !req.stream {
            self.poll_once(node, req).await
        } else {
            self.stream(node, req).await
        }
    }

    async fn poll_once(&self, mut node: Node, req: MapRequest) -> Result<Response> {
        if !req.read_only && self.update_from_request(&mut node, &req).await? {
            let node_id = node.id();
            if let Err(e) = self
                .broker
                .notify(node.tailnet_id(), Signal::PeerUpdated(node_id), &[node_id])
            {
                warn!(node_id = %node_id, error = %e, "failed to announce route change");
            }
        }
        let sync = Synchronizer::new(self.mapper.clone(), node.id(), req.omit_peers);
        let frame = marshal(Compression::for_request(&req), &sync.full().await?)?;
        Ok(frame_response(Body::from(frame)))
    }

    async fn stream(&self, mut node: Node, req: MapRequest) -> Result<Response> {
        let mut state = PollState::Init;
        debug!(node_id = %node.id(), ?state, "streaming poll");

        self.update_from_request(&mut node, &req).await?;
        let tailnet = node.tailnet_id();
        let node_id = node.id();

        // peers learn about the new endpoints before this session exists
        if let Err(e) = self
            .broker
            .notify(tailnet, Signal::PeerUpdated(node_id), &[node_id])
        {
            warn!(node_id = %node_id, error = %e, "failed to announce node");
        }

        let sessions = self.broker.sessions(tailnet);
        let (signal_tx, signals) = mpsc::channel(SIGNAL_BUFFER);
        let generation = sessions.register(node_id, signal_tx);
        let guard = DrainGuard {
            sessions,
            db: self.db.clone(),
            node_id,
            generation,
            armed: true,
        };

        let compression = Compression::for_request(&req);
        let sync = Synchronizer::new(self.mapper.clone(), node_id, req.omit_peers);
        let first = marshal(compression, &sync.full().await?)?;

        let (tx, rx) = mpsc::channel(FRAME_BUFFER);
        tx.try_send(first).map_err(Error::internal)?;

        state = PollState::Streaming;
        info!(node_id = %node_id, ?state, "map session started");
        let task = SessionTask {
            sync,
            signals,
            tx,
            compression,
            keep_alive: req.keep_alive,
            tuning: self.tuning.clone(),
            node_id,
            guard,
        };
        tokio::spawn(task.run());

        let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<Bytes, Infallible>));
        Ok(frame_response(body))
    }

    /// persist what the client reported about itself.
    ///
    /// returns whether the routes the node may serve changed.
    async fn update_from_request(&self, node: &mut Node, req: &MapRequest) -> Result<bool> {
        let mut routes_changed = false;
        if let Some(hostinfo) = &req.hostinfo {
            routes_changed = apply_hostinfo(&self.db, node, hostinfo.clone()).await?;
        }
        if !req.endpoints.is_empty() {
            node.set_endpoints(req.endpoints.clone());
        }
        if !req.disco_key.is_zero() {
            node.set_disco_key(req.disco_key);
        }
        node.set_last_seen(Utc::now());
        *node = self.db.update_node(node).await?;
        Ok(routes_changed)
    }
}

fn frame_response(body: Body) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, FRAME_CONTENT_TYPE)],
        body,
    )
        .into_response()
}

/// runs the draining steps however the session ends.
struct DrainGuard {
    sessions: TailnetSessions,
    db: TidescaleDb,
    node_id: NodeId,
    generation: u64,
    armed: bool,
}

impl DrainGuard {
    async fn drain(mut self) {
        self.armed = false;
        self.sessions.deregister(self.node_id, self.generation);
        record_last_seen(&self.db, self.node_id).await;
    }
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.sessions.deregister(self.node_id, self.generation);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let db = self.db.clone();
            let node_id = self.node_id;
            handle.spawn(async move { record_last_seen(&db, node_id).await });
        }
    }
}

async fn record_last_seen(db: &TidescaleDb, node_id: NodeId) {
    if let Err(e) = db.set_last_seen(node_id, Utc::now()).await {
        warn!(node_id = %node_id, error = %e, "failed to record last seen");
    }
}

struct SessionTask {
    sync: Synchronizer,
    signals: mpsc::Receiver<Signal>,
    tx: mpsc::Sender<Bytes>,
    compression: Compression,
    keep_alive: bool,
    tuning: TuningConfig,
    node_id: NodeId,
    guard: DrainGuard,
}

impl SessionTask {
    async fn run(mut self) {
        let mut state = PollState::Streaming;
        let mut dirty = false;
        let mut keep_alive = ticker(self.tuning.keep_alive_interval);
        let mut sync = ticker(self.tuning.sync_interval);

        while state == PollState::Streaming {
            tokio::select! {
                _ = self.tx.closed() => {
                    debug!(node_id = %self.node_id, "client went away");
                    state = PollState::Draining;
                }
                signal = self.signals.recv() => match signal {
                    Some(signal) => {
                        debug!(node_id = %self.node_id, ?signal, "session marked dirty");
                        dirty = true;
                    }
                    None => {
                        debug!(node_id = %self.node_id, "replaced by a newer session");
                        state = PollState::Draining;
                    }
                },
                _ = keep_alive.tick(), if self.keep_alive => {
                    if let Err(e) = self.send(&MapResponse::keepalive()).await {
                        debug!(node_id = %self.node_id, error = %e, "keep-alive failed");
                        state = PollState::Draining;
                    }
                }
                _ = sync.tick(), if dirty => {
                    dirty = false;
                    if let Err(e) = self.send_delta().await {
                        warn!(node_id = %self.node_id, error = %e, "map session ended");
                        state = PollState::Draining;
                    }
                }
            }
        }

        info!(node_id = %self.node_id, ?state, "map session closed");
        self.guard.drain().await;
    }

    async fn send_delta(&self) -> Result<()> {
        let delta = self.sync.delta().await?;
        if delta.is_empty_delta() {
            return Ok(());
        }
        self.send(&delta).await
    }

    async fn send<T: Serialize>(&self, value: &T) -> Result<()> {
        let frame = marshal(self.compression, value)?;
        self.tx
            .send(frame)
            .await
            .map_err(|_| Error::internal("response body closed"))
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}
