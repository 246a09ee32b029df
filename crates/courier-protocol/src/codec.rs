//! Codec trait and implementations for serializing/deserializing frames
//! and message payloads.
//!
//! The rest of Courier only depends on the [`Codec`] trait; [`JsonCodec`]
//! is the default because it is easy to inspect on the wire.

use serde::{Serialize, de::DeserializeOwned};

use crate::types::MAX_DATAGRAM_LEN;
use crate::{Frame, ProtocolError};

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because one codec is shared by the delivery
/// engine, the receive loop, and every spawned interpretation task.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or
    /// don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ## Example
///
/// ```rust
/// use courier_protocol::{Codec, Frame, JsonCodec, Receipt};
///
/// let codec = JsonCodec;
/// let bytes = codec.encode(&Frame::Ack { receipt: Receipt(5) }).unwrap();
/// let decoded: Frame = codec.decode(&bytes).unwrap();
/// assert_eq!(decoded, Frame::Ack { receipt: Receipt(5) });
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

// ---------------------------------------------------------------------------
// Datagram framing
// ---------------------------------------------------------------------------

/// Bytes used by the header-length prefix.
const HEADER_PREFIX: usize = 2;

/// Builds one datagram: a big-endian `u16` header length, the encoded
/// [`Frame`], then `payload` verbatim.
///
/// # Errors
/// - Whatever `codec` returns for the header.
/// - [`ProtocolError::Oversized`] if the datagram would exceed
///   [`MAX_DATAGRAM_LEN`].
pub fn encode_datagram<C: Codec>(
    codec: &C,
    frame: &Frame,
    payload: &[u8],
) -> Result<Vec<u8>, ProtocolError> {
    let header = codec.encode(frame)?;
    let len = HEADER_PREFIX + header.len() + payload.len();
    let header_len = u16::try_from(header.len()).map_err(|_| ProtocolError::Oversized {
        len,
        max: MAX_DATAGRAM_LEN,
    })?;
    if len > MAX_DATAGRAM_LEN {
        return Err(ProtocolError::Oversized {
            len,
            max: MAX_DATAGRAM_LEN,
        });
    }

    let mut datagram = Vec::with_capacity(len);
    datagram.extend_from_slice(&header_len.to_be_bytes());
    datagram.extend_from_slice(&header);
    datagram.extend_from_slice(payload);
    Ok(datagram)
}

/// Splits a datagram built by [`encode_datagram`] into its frame and
/// payload.
///
/// # Errors
/// [`ProtocolError::InvalidMessage`] if the length prefix doesn't fit the
/// datagram, or the codec's decode error for a malformed header.
pub fn decode_datagram<'a, C: Codec>(
    codec: &C,
    data: &'a [u8],
) -> Result<(Frame, &'a [u8]), ProtocolError> {
    let truncated =
        || ProtocolError::InvalidMessage(format!("truncated datagram ({} bytes)", data.len()));
    let prefix: [u8; HEADER_PREFIX] = data
        .get(..HEADER_PREFIX)
        .and_then(|p| p.try_into().ok())
        .ok_or_else(truncated)?;
    let header_end = HEADER_PREFIX + usize::from(u16::from_be_bytes(prefix));
    let header = data.get(HEADER_PREFIX..header_end).ok_or_else(truncated)?;
    let frame = codec.decode(header)?;
    Ok((frame, &data[header_end..]))
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{MessageKind, Receipt, SessionId};

    fn reliable() -> Frame {
        Frame::Reliable {
            session: SessionId(9),
            receipt: Receipt(1),
            kind: MessageKind(7),
        }
    }

    #[test]
    fn test_decode_malformed_bytes_is_decode_error() {
        let result: Result<Frame, _> = JsonCodec.decode(b"{not json");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_unknown_frame_type_is_decode_error() {
        let result: Result<Frame, _> = JsonCodec.decode(br#"{"type":"Nope","receipt":1}"#);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_payload_travels_verbatim() {
        let payload = JsonCodec.encode(&vec!["a", "b"]).unwrap();
        let datagram = encode_datagram(&JsonCodec, &reliable(), &payload).unwrap();

        let (frame, body) = decode_datagram(&JsonCodec, &datagram).unwrap();
        assert_eq!(frame, reliable());
        assert_eq!(body, payload.as_slice());
        // Header prefix + header + payload, no re-encoding of the payload.
        let header = JsonCodec.encode(&reliable()).unwrap();
        assert_eq!(datagram.len(), 2 + header.len() + payload.len());
    }

    #[test]
    fn test_ack_has_empty_payload() {
        let ack = Frame::Ack { receipt: Receipt(4) };
        let datagram = encode_datagram(&JsonCodec, &ack, &[]).unwrap();
        let (frame, body) = decode_datagram(&JsonCodec, &datagram).unwrap();
        assert_eq!(frame, ack);
        assert!(body.is_empty());
    }

    #[test]
    fn test_oversized_datagram_is_rejected() {
        let payload = vec![b'x'; MAX_DATAGRAM_LEN];
        let err = encode_datagram(&JsonCodec, &reliable(), &payload).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Oversized { max: MAX_DATAGRAM_LEN, .. }
        ));
    }

    #[test]
    fn test_truncated_datagram_is_invalid() {
        assert!(matches!(
            decode_datagram(&JsonCodec, &[0]),
            Err(ProtocolError::InvalidMessage(_))
        ));
        // Prefix claims a 200-byte header that isn't there.
        assert!(matches!(
            decode_datagram(&JsonCodec, &[0, 200, b'{']),
            Err(ProtocolError::InvalidMessage(_))
        ));
    }
}
