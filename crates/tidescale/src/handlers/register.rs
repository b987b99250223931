//! handler for /machine/register endpoint.

use axum::{extract::State, http::StatusCode, response::Response};
use bytes::Bytes;
use tidescale_proto::RegisterRequest;

use super::{ApiError, MachineKeyContext};
use crate::AppState;
use crate::binder::{bind_request, write_response};

/// register a machine, or report the state of a pending registration.
///
/// interactive registrations answer with an auth url first; the client then
/// repeats the request with `Followup` set and is held until the user has
/// authenticated or the wait times out.
pub async fn register(
    State(state): State<AppState>,
    MachineKeyContext(machine_key): MachineKeyContext,
    body: Bytes,
) -> Result<Response, ApiError> {
    let req: RegisterRequest = bind_request(&body)?;
    let resp = state.registrar.register(machine_key, req).await?;
    Ok(write_response(StatusCode::OK, &resp))
}
