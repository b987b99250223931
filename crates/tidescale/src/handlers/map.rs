//! handler for /machine/map endpoint.

use axum::{extract::State, response::Response};
use bytes::Bytes;
use tidescale_db::Repository;
use tidescale_proto::MapRequest;
use tracing::debug;

use super::{ApiError, MachineKeyContext, OptionExt, ResultExt};
use crate::AppState;
use crate::binder::bind_request;

/// serve a map poll.
///
/// the node is looked up by the node key in the request and must belong to
/// the machine the connection authenticated as.
pub async fn map(
    State(state): State<AppState>,
    MachineKeyContext(machine_key): MachineKeyContext,
    body: Bytes,
) -> Result<Response, ApiError> {
    let req: MapRequest = bind_request(&body)?;

    let node = state
        .db
        .get_node_by_node_key(&req.node_key)
        .await
        .map_internal()?
        .or_unauthorized("unknown node")?;
    if *node.machine_key() != machine_key {
        debug!(node_id = %node.id(), "node key presented by another machine");
        return Err(ApiError::unauthorized("unknown node"));
    }
    if node.is_expired() {
        return Err(ApiError::unauthorized("node key expired"));
    }

    Ok(state.poller.poll(node, req).await?)
}
