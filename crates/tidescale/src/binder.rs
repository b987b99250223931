//! request decoding and response framing for the control protocol.
//!
//! map responses travel as frames: a 4-byte little-endian length followed
//! by the json payload, zstd-compressed when the client asked for it.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Serialize, de::DeserializeOwned};
use tidescale_proto::MapRequest;

use crate::error::{Error, Result};

/// payload compression for framed responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    Zstd,
}

impl Compression {
    /// the compression a map request asked for.
    pub fn for_request(req: &MapRequest) -> Self {
        if req.wants_zstd() {
            Compression::Zstd
        } else {
            Compression::None
        }
    }
}

/// decode a json request body.
pub fn bind_request<T: DeserializeOwned>(raw: &[u8]) -> Result<T> {
    serde_json::from_slice(raw).map_err(|e| Error::Validation(format!("malformed body: {e}")))
}

/// a plain json response.
pub fn write_response<T: Serialize>(code: StatusCode, value: &T) -> Response {
    (code, Json(value)).into_response()
}

/// encode `value` as a length-prefixed frame.
pub fn marshal<T: Serialize>(compression: Compression, value: &T) -> Result<Bytes> {
    let json = serde_json::to_vec(value).map_err(Error::internal)?;
    let payload = match compression {
        Compression::None => json,
        Compression::Zstd => zstd::stream::encode_all(json.as_slice(), 0).map_err(Error::internal)?,
    };

    let len = u32::try_from(payload.len())
        .map_err(|_| Error::internal(format!("frame of {} bytes too large", payload.len())))?;
    let mut frame = BytesMut::with_capacity(4 + payload.len());
    frame.put_u32_le(len);
    frame.put_slice(&payload);
    Ok(frame.freeze())
}

#[cfg(test)]
mod tests {
    use bytes::Buf;
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Ping {
        seq: u32,
    }

    #[test]
    fn test_frame_has_le_length_prefix() {
        let frame = marshal(Compression::None, &Ping { seq: 7 }).unwrap();
        let mut buf = &frame[..];
        let len = buf.get_u32_le() as usize;
        assert_eq!(len, buf.len());
        assert_eq!(serde_json::from_slice::<Ping>(buf).unwrap(), Ping { seq: 7 });
    }

    #[test]
    fn test_zstd_frame_decompresses() {
        let frame = marshal(Compression::Zstd, &Ping { seq: 9 }).unwrap();
        let mut buf = &frame[..];
        let len = buf.get_u32_le() as usize;
        assert_eq!(len, buf.len());
        let json = zstd::stream::decode_all(buf).unwrap();
        assert_eq!(serde_json::from_slice::<Ping>(&json).unwrap(), Ping { seq: 9 });
    }

    #[test]
    fn test_bind_request_rejects_garbage() {
        let result: Result<Ping> = bind_request(b"{not json");
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_compression_follows_request() {
        let mut req = MapRequest::default();
        assert_eq!(Compression::for_request(&req), Compression::None);
        req.compress = "zstd".to_string();
        assert_eq!(Compression::for_request(&req), Compression::Zstd);
    }
}
