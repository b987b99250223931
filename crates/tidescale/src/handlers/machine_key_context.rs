//! the authenticated machine key of a request.
//!
//! the transport that authenticates clients (the noise upgrade) puts a
//! [`MachineKeyContext`] into the request extensions before the request
//! reaches the control handlers. handlers take the key from there and never
//! trust a key from the body.

use axum::{
    extract::FromRequestParts,
    http::{Extensions, StatusCode, request::Parts},
};
use tidescale_types::MachineKey;

/// machine key of the connection a request arrived on.
#[derive(Debug, Clone, Copy)]
pub struct MachineKeyContext(pub MachineKey);

impl MachineKeyContext {
    /// get the machine key.
    pub fn machine_key(&self) -> &MachineKey {
        &self.0
    }
}

/// the machine key carried in `extensions`, if the transport set one.
pub fn peer_identity(extensions: &Extensions) -> Option<MachineKey> {
    extensions.get::<MachineKeyContext>().map(|ctx| ctx.0)
}

impl<S> FromRequestParts<S> for MachineKeyContext
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        peer_identity(&parts.extensions)
            .map(Self)
            .ok_or((StatusCode::UNAUTHORIZED, "unauthenticated connection"))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    #[tokio::test]
    async fn test_missing_context_is_unauthorized() {
        let (mut parts, _) = Request::new(()).into_parts();
        let err = MachineKeyContext::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_context_from_extensions() {
        let key = MachineKey::random();
        let mut req = Request::new(());
        req.extensions_mut().insert(MachineKeyContext(key));
        let (mut parts, _) = req.into_parts();

        let ctx = MachineKeyContext::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(*ctx.machine_key(), key);
    }
}
