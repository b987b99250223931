//! session registry and change fan-out for streaming map sessions.
//!
//! every streaming poll registers a signal sender with the registry of its
//! tailnet. changes are published through a [`PubSub`] and relayed into the
//! local registries, which wake the affected sessions. a signal only tells a
//! session that something changed; the session rebuilds its own view.
//!
//! tailnets never share a registry, so a signal can't cross tailnets.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tidescale_types::{NodeId, TailnetId};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// capacity of a session's signal channel. a full channel means the session
/// already has a wake-up pending, so further signals are dropped.
pub const SIGNAL_BUFFER: usize = 16;

/// change notifications delivered to sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// a node changed (keys, endpoints, hostinfo, online state...).
    PeerUpdated(NodeId),
    /// nodes were deleted.
    PeersRemoved(Vec<NodeId>),
    /// the tailnet's acl policy changed.
    AclUpdated,
    /// the tailnet's dns settings changed.
    DnsUpdated,
    /// the effective relay map changed.
    DerpMapUpdated,
}

/// the sending half a session registers with.
pub type SignalSender = mpsc::Sender<Signal>;

/// something a signal could not be delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sink {
    /// a node's streaming session.
    Node(NodeId),
    /// a pub/sub subscriber.
    Subscriber(u64),
}

impl fmt::Display for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sink::Node(id) => write!(f, "node {id}"),
            Sink::Subscriber(id) => write!(f, "subscriber {id}"),
        }
    }
}

/// delivery failed for at least one sink. the others were still notified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to notify {} sink(s): {}", .failed.len(), list(.failed))]
pub struct FanoutError {
    /// every sink that could not be reached.
    pub failed: Vec<Sink>,
}

fn list(sinks: &[Sink]) -> String {
    sinks
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl FanoutError {
    fn check(failed: Vec<Sink>) -> Result<(), FanoutError> {
        if failed.is_empty() {
            Ok(())
        } else {
            Err(FanoutError { failed })
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─── Registry ───────────────────────────────────────────────────────────────

/// the per-tailnet table of live sessions.
pub trait SessionRegistry: Send + Sync {
    /// register a session for `node`, replacing any earlier one. returns the
    /// session's generation, which identifies it to [`deregister`].
    ///
    /// [`deregister`]: SessionRegistry::deregister
    fn register(&self, node: NodeId, sender: SignalSender) -> u64;

    /// end the session of `node` with the given generation. stale
    /// generations are ignored.
    fn deregister(&self, node: NodeId, generation: u64);

    /// whether `node` has a session, counting the grace period after a
    /// disconnect.
    fn has_session(&self, node: NodeId) -> bool;

    /// send `signal` to every session except those in `exclude`.
    fn notify_all(&self, signal: &Signal, exclude: &[NodeId]) -> Result<(), FanoutError>;
}

struct Session {
    generation: u64,
    sender: SignalSender,
}

#[derive(Default)]
struct Sessions {
    live: HashMap<NodeId, Session>,
    /// disconnected sessions whose grace timer has not fired yet.
    lingering: HashMap<NodeId, u64>,
    generation: u64,
}

impl Sessions {
    fn fanout(&self, signal: &Signal, exclude: &[NodeId]) -> Result<(), FanoutError> {
        let mut failed = Vec::new();
        for (node, session) in &self.live {
            if exclude.contains(node) {
                continue;
            }
            match session.sender.try_send(signal.clone()) {
                Ok(()) | Err(TrySendError::Full(_)) => {}
                Err(TrySendError::Closed(_)) => failed.push(Sink::Node(*node)),
            }
        }
        FanoutError::check(failed)
    }
}

/// the sessions of one tailnet.
///
/// every operation takes the same mutex, so operations within a tailnet are
/// totally ordered. cheap to clone.
#[derive(Clone)]
pub struct TailnetSessions {
    tailnet: TailnetId,
    grace: Duration,
    /// where disconnects are announced. `None` wakes local sessions only.
    pubsub: Option<Arc<dyn PubSub>>,
    inner: Arc<Mutex<Sessions>>,
}

impl fmt::Debug for TailnetSessions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TailnetSessions")
            .field("tailnet", &self.tailnet)
            .field("grace", &self.grace)
            .finish_non_exhaustive()
    }
}

impl TailnetSessions {
    /// an empty registry. `grace` is how long a disconnected node still
    /// counts as connected.
    pub fn new(tailnet: TailnetId, grace: Duration) -> Self {
        Self {
            tailnet,
            grace,
            pubsub: None,
            inner: Arc::new(Mutex::new(Sessions::default())),
        }
    }

    /// a registry that announces expired sessions on `pubsub`, so sessions
    /// relayed from other instances hear about them too.
    pub fn with_pubsub(tailnet: TailnetId, grace: Duration, pubsub: Arc<dyn PubSub>) -> Self {
        Self {
            pubsub: Some(pubsub),
            ..Self::new(tailnet, grace)
        }
    }

    /// the tailnet this registry serves.
    pub fn tailnet(&self) -> TailnetId {
        self.tailnet
    }

    /// number of live (not lingering) sessions.
    pub fn len(&self) -> usize {
        lock(&self.inner).live.len()
    }

    /// whether no session is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// the grace timer fired: tell the peers, unless the node came back.
    fn expire(&self, node: NodeId, generation: u64) {
        {
            let mut inner = lock(&self.inner);
            if inner.lingering.get(&node) != Some(&generation) {
                return;
            }
            inner.lingering.remove(&node);
        }
        debug!(tailnet = %self.tailnet, node_id = %node, "grace period elapsed");

        let signal = Signal::PeerUpdated(node);
        let announced = match &self.pubsub {
            Some(pubsub) => pubsub.publish(
                self.tailnet,
                Envelope {
                    signal,
                    exclude: vec![node],
                },
            ),
            None => self.notify_all(&signal, &[node]),
        };
        if let Err(e) = announced {
            warn!(tailnet = %self.tailnet, error = %e, "failed to announce disconnect");
        }
    }
}

impl SessionRegistry for TailnetSessions {
    fn register(&self, node: NodeId, sender: SignalSender) -> u64 {
        let mut inner = lock(&self.inner);
        inner.generation += 1;
        let generation = inner.generation;
        inner.lingering.remove(&node);
        // the replaced sender is dropped, which ends the older session
        inner.live.insert(node, Session { generation, sender });
        debug!(tailnet = %self.tailnet, node_id = %node, generation, "session registered");
        generation
    }

    fn deregister(&self, node: NodeId, generation: u64) {
        {
            let mut inner = lock(&self.inner);
            match inner.live.get(&node) {
                Some(session) if session.generation == generation => {}
                _ => return,
            }
            inner.live.remove(&node);
            inner.lingering.insert(node, generation);
        }
        debug!(tailnet = %self.tailnet, node_id = %node, generation, "session deregistered");

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) if !self.grace.is_zero() => handle,
            _ => return self.expire(node, generation),
        };
        let this = self.clone();
        handle.spawn(async move {
            tokio::time::sleep(this.grace).await;
            this.expire(node, generation);
        });
    }

    fn has_session(&self, node: NodeId) -> bool {
        let inner = lock(&self.inner);
        inner.live.contains_key(&node) || inner.lingering.contains_key(&node)
    }

    fn notify_all(&self, signal: &Signal, exclude: &[NodeId]) -> Result<(), FanoutError> {
        lock(&self.inner).fanout(signal, exclude)
    }
}

// ─── Pub/Sub ────────────────────────────────────────────────────────────────

/// a signal in transit between brokers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// what changed.
    pub signal: Signal,
    /// nodes that must not be woken, usually the originator.
    pub exclude: Vec<NodeId>,
}

/// transport for signals between server instances.
pub trait PubSub: Send + Sync {
    /// deliver `envelope` to every subscriber of `tailnet`.
    fn publish(&self, tailnet: TailnetId, envelope: Envelope) -> Result<(), FanoutError>;

    /// receive everything published to `tailnet` on `sender` until the
    /// returned subscription is cancelled or dropped.
    fn subscribe(&self, tailnet: TailnetId, sender: mpsc::UnboundedSender<Envelope>)
    -> Subscription;
}

/// a live subscription. dropping it unsubscribes.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// a subscription that runs `cancel` once when it ends.
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// unsubscribe now.
    pub fn cancel(mut self) {
        self.run_cancel();
    }

    fn run_cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

type Subscribers = HashMap<TailnetId, Vec<(u64, mpsc::UnboundedSender<Envelope>)>>;

#[derive(Default)]
struct Topics {
    next_id: u64,
    subscribers: Subscribers,
}

/// in-process pub/sub for a single server instance.
#[derive(Clone, Default)]
pub struct LocalPubSub {
    topics: Arc<Mutex<Topics>>,
}

impl LocalPubSub {
    /// a bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// number of subscribers of `tailnet`.
    pub fn subscriber_count(&self, tailnet: TailnetId) -> usize {
        lock(&self.topics)
            .subscribers
            .get(&tailnet)
            .map_or(0, Vec::len)
    }
}

impl PubSub for LocalPubSub {
    fn publish(&self, tailnet: TailnetId, envelope: Envelope) -> Result<(), FanoutError> {
        let topics = lock(&self.topics);
        let mut failed = Vec::new();
        for (id, sender) in topics.subscribers.get(&tailnet).into_iter().flatten() {
            if sender.send(envelope.clone()).is_err() {
                failed.push(Sink::Subscriber(*id));
            }
        }
        FanoutError::check(failed)
    }

    fn subscribe(
        &self,
        tailnet: TailnetId,
        sender: mpsc::UnboundedSender<Envelope>,
    ) -> Subscription {
        let id = {
            let mut topics = lock(&self.topics);
            topics.next_id += 1;
            let id = topics.next_id;
            topics.subscribers.entry(tailnet).or_default().push((id, sender));
            id
        };

        let topics = Arc::clone(&self.topics);
        Subscription::new(move || {
            let mut topics = lock(&topics);
            if let Some(subs) = topics.subscribers.get_mut(&tailnet) {
                subs.retain(|(sub, _)| *sub != id);
                if subs.is_empty() {
                    topics.subscribers.remove(&tailnet);
                }
            }
        })
    }
}

// ─── Broker ─────────────────────────────────────────────────────────────────

struct TailnetEntry {
    sessions: TailnetSessions,
    _subscription: Subscription,
}

struct BrokerInner {
    pubsub: Arc<dyn PubSub>,
    grace: Duration,
    tailnets: Mutex<HashMap<TailnetId, TailnetEntry>>,
}

/// owns one [`TailnetSessions`] per tailnet, created on first use.
///
/// changes are published through the [`PubSub`]; each registry subscribes
/// when it is created and relays what arrives to its sessions.
#[derive(Clone)]
pub struct Broker {
    inner: Arc<BrokerInner>,
}

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("grace", &self.inner.grace)
            .finish_non_exhaustive()
    }
}

impl Broker {
    /// a broker backed by [`LocalPubSub`].
    pub fn new(grace: Duration) -> Self {
        Self::with_pubsub(Arc::new(LocalPubSub::new()), grace)
    }

    /// a broker publishing through `pubsub`.
    pub fn with_pubsub(pubsub: Arc<dyn PubSub>, grace: Duration) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                pubsub,
                grace,
                tailnets: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// the registry of `tailnet`, creating it and its relay on first use.
    ///
    /// must be called from within a tokio runtime.
    pub fn sessions(&self, tailnet: TailnetId) -> TailnetSessions {
        let mut tailnets = lock(&self.inner.tailnets);
        if let Some(entry) = tailnets.get(&tailnet) {
            return entry.sessions.clone();
        }

        let sessions =
            TailnetSessions::with_pubsub(tailnet, self.inner.grace, Arc::clone(&self.inner.pubsub));
        let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
        let subscription = self.inner.pubsub.subscribe(tailnet, tx);

        let relay = sessions.clone();
        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                if let Err(e) = relay.notify_all(&envelope.signal, &envelope.exclude) {
                    warn!(tailnet = %tailnet, error = %e, "failed to relay signal");
                }
            }
        });

        tailnets.insert(
            tailnet,
            TailnetEntry {
                sessions: sessions.clone(),
                _subscription: subscription,
            },
        );
        sessions
    }

    /// publish `signal` to every session of `tailnet` except `exclude`.
    pub fn notify(
        &self,
        tailnet: TailnetId,
        signal: Signal,
        exclude: &[NodeId],
    ) -> Result<(), FanoutError> {
        debug!(tailnet = %tailnet, ?signal, "publishing signal");
        self.inner.pubsub.publish(
            tailnet,
            Envelope {
                signal,
                exclude: exclude.to_vec(),
            },
        )
    }

    /// whether `node` of `tailnet` has a session on this instance.
    pub fn has_session(&self, tailnet: TailnetId, node: NodeId) -> bool {
        lock(&self.inner.tailnets)
            .get(&tailnet)
            .is_some_and(|entry| entry.sessions.has_session(node))
    }
}
