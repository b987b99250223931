//! per-connection session state for delta map responses.
//!
//! tracks the last-sent peers so later updates can be delta-encoded
//! (PeersChanged/PeersRemoved/PeersChangedPatch/OnlineChange) instead of
//! resending the full peer list.

use std::collections::HashMap;

use tidescale_proto::{MapResponse, MapResponseNode, PeerChange};

/// per-streaming-connection session state
#[derive(Debug)]
pub struct MapSession {
    /// last-sent peers keyed by node id
    previous_peers: HashMap<u64, MapResponseNode>,
    /// checksum of the last relay map sent
    previous_derp_checksum: Option<String>,
    /// session handle, sent once
    handle: String,
    /// monotonic sequence number
    seq: i64,
}

impl MapSession {
    /// a fresh session; the first response through it is a full map.
    pub fn new(handle: impl Into<String>) -> Self {
        Self {
            previous_peers: HashMap::new(),
            previous_derp_checksum: None,
            handle: handle.into(),
            seq: 0,
        }
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    pub fn seq(&self) -> i64 {
        self.seq
    }

    /// ids of the peers the client currently knows about.
    pub fn previous_peer_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.previous_peers.keys().copied()
    }

    /// stamp a full snapshot and remember its peers and relay map.
    ///
    /// the session handle is only attached to the first message.
    pub fn apply_full(&mut self, mut response: MapResponse) -> MapResponse {
        self.seq += 1;
        response.seq = self.seq;
        if self.seq == 1 {
            response.map_session_handle = self.handle.clone();
        }

        self.previous_peers = response
            .peers
            .iter()
            .flatten()
            .map(|peer| (peer.id, peer.clone()))
            .collect();
        self.previous_derp_checksum = response.derp_map.as_ref().map(|m| m.checksum());

        response
    }

    /// turn a full snapshot into a delta against what was last sent.
    ///
    /// the session state is replaced before returning, so a delta that never
    /// reaches the client is not resent.
    pub fn compute_delta(&mut self, mut response: MapResponse) -> MapResponse {
        self.seq += 1;
        response.seq = self.seq;

        let current: HashMap<u64, MapResponseNode> = response
            .peers
            .take()
            .unwrap_or_default()
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut removed: Vec<u64> = self
            .previous_peers
            .keys()
            .filter(|id| !current.contains_key(id))
            .copied()
            .collect();
        removed.sort_unstable();

        let mut changed = Vec::new();
        let mut patches = Vec::new();
        let mut online_change = HashMap::new();

        for (id, node) in &current {
            match self.previous_peers.get(id) {
                None => changed.push(node.clone()),
                Some(old) => match compute_peer_patch(old, node) {
                    PatchResult::Identical => {}
                    PatchResult::NeedsFull => changed.push(node.clone()),
                    PatchResult::Patch(patch) => {
                        if is_online_only_change(&patch) {
                            if let Some(online) = patch.online {
                                online_change.insert(*id, online);
                            }
                        } else {
                            patches.push(patch);
                        }
                    }
                },
            }
        }
        changed.sort_by_key(|n| n.id);
        patches.sort_by_key(|p| p.node_id);

        response.peers_changed = changed;
        response.peers_removed = removed;
        response.peers_changed_patch = patches;
        response.online_change = online_change;

        // the relay map only travels when it changed
        let checksum = response.derp_map.as_ref().map(|m| m.checksum());
        if checksum == self.previous_derp_checksum {
            response.derp_map = None;
        } else {
            self.previous_derp_checksum = checksum;
        }

        self.previous_peers = current;
        response
    }
}

/// result of comparing two peer snapshots
enum PatchResult {
    Identical,
    /// structural change requiring a full resend
    NeedsFull,
    Patch(PeerChange),
}

fn compute_peer_patch(old: &MapResponseNode, new: &MapResponseNode) -> PatchResult {
    // fields that can't be patched
    if old.name != new.name
        || old.addresses != new.addresses
        || old.allowed_ips != new.allowed_ips
        || old.tags != new.tags
        || old.primary_routes != new.primary_routes
        || old.user != new.user
        || old.machine_key != new.machine_key
        || old.machine_authorized != new.machine_authorized
        || old.expired != new.expired
        || old.stable_id != new.stable_id
        || old.hostinfo != new.hostinfo
    {
        return PatchResult::NeedsFull;
    }

    let mut patch = PeerChange {
        node_id: old.id,
        ..Default::default()
    };
    let mut has_change = false;

    if old.home_derp != new.home_derp {
        patch.derp_region = Some(new.home_derp);
        has_change = true;
    }

    if old.endpoints != new.endpoints {
        patch.endpoints = Some(new.endpoints.clone());
        has_change = true;
    }

    if old.node_key != new.node_key {
        patch.key = Some(new.node_key);
        has_change = true;
    }

    if old.disco_key != new.disco_key {
        patch.disco_key = Some(new.disco_key);
        has_change = true;
    }

    if old.online != new.online {
        patch.online = new.online;
        has_change = true;
    }

    if old.key_expiry != new.key_expiry {
        patch.key_expiry = new.key_expiry.clone();
        has_change = true;
    }

    if has_change {
        PatchResult::Patch(patch)
    } else {
        PatchResult::Identical
    }
}

/// whether a patch carries nothing but an online flip
fn is_online_only_change(patch: &PeerChange) -> bool {
    patch.online.is_some()
        && patch.derp_region.is_none()
        && patch.endpoints.is_none()
        && patch.key.is_none()
        && patch.disco_key.is_none()
        && patch.key_expiry.is_none()
        && patch.last_seen.is_none()
}
