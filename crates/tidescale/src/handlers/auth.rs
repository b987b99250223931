//! status page behind the auth url handed out during registration.

use axum::extract::{Path, State};
use tidescale_db::Repository;
use tidescale_types::RegistrationId;

use super::{ApiError, OptionExt, ResultExt};
use crate::AppState;

/// `GET /a/{code}`: where a pending registration stands, as plain text.
///
/// signing in happens in front of this server; the identity layer calls
/// [`Registrar::complete_registration`](crate::registration::Registrar::complete_registration)
/// once the user is known.
pub async fn auth(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<String, ApiError> {
    let request = state
        .db
        .get_registration(&RegistrationId::from(code))
        .await
        .map_internal()?
        .or_not_found("unknown registration")?;

    Ok(match (&request.error, request.authenticated) {
        (Some(error), _) => format!("registration failed: {error}\n"),
        (None, true) => "registration complete, you can close this page\n".to_string(),
        (None, false) => "registration pending\n".to_string(),
    })
}
