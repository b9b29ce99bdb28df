//! Frame payload codec.
//!
//! The codec turns `(id, payload)` into frame bytes and frame bytes back
//! into `(id, outcome)`. Framing itself (length prefixes, partial reads)
//! belongs to the transport; a codec always sees exactly one frame.

// ============================================================================
// Imports
// ============================================================================

use bytes::Bytes;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

use super::request::Payload;
use super::response::Response;

// ============================================================================
// Codec
// ============================================================================

/// Serializes requests and deserializes responses.
///
/// Implementations must be stateless with respect to individual frames;
/// the connection calls them from several tasks.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a payload under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encode`] if the payload cannot be represented.
    fn serialize(&self, id: RequestId, payload: &Payload) -> Result<Bytes>;

    /// Parses one complete frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the frame is malformed.
    fn deserialize(&self, frame: &[u8]) -> Result<Response>;
}

// ============================================================================
// JsonCodec
// ============================================================================

/// JSON request envelope.
///
/// ```json
/// { "callbackIdx": 1, "request": { "kind": "command", ... } }
/// ```
#[derive(Serialize)]
struct Envelope<'a> {
    #[serde(rename = "callbackIdx")]
    id: RequestId,
    request: &'a Payload,
}

/// Codec encoding every frame as a JSON document.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn serialize(&self, id: RequestId, payload: &Payload) -> Result<Bytes> {
        let envelope = Envelope {
            id,
            request: payload,
        };
        serde_json::to_vec(&envelope)
            .map(Bytes::from)
            .map_err(|e| Error::encode(e.to_string()))
    }

    fn deserialize(&self, frame: &[u8]) -> Result<Response> {
        serde_json::from_slice(frame).map_err(|e| Error::decode(e.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================
