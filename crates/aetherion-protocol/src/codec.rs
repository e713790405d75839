//! Converts between wire frames and protocol events.
//!
//! The session server only depends on the [`Codec`] trait, so a binary
//! codec can be swapped in later without touching the handlers.

use serde::Deserialize;
use serde_json::Value;

use crate::{ClientEvent, ProtocolError, ServerEnvelope};

/// Encodes outbound envelopes to text frames and decodes inbound frames.
pub trait Codec: Send + Sync + 'static {
    /// Serializes an outbound envelope.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if serialization fails.
    fn encode(&self, envelope: &ServerEnvelope) -> Result<String, ProtocolError>;

    /// Parses one inbound frame into a typed event.
    ///
    /// # Errors
    /// - [`ProtocolError::Decode`]: not a JSON object with an `event` name
    /// - [`ProtocolError::InvalidPayload`]: unknown event, or a payload
    ///   that does not match the event's schema
    fn decode(&self, data: &[u8]) -> Result<ClientEvent, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that speaks JSON text frames.
///
/// `data` may arrive either as an object or as a string containing the
/// object's JSON; both decode to the same event.
///
/// ```rust
/// use aetherion_protocol::{ClientEvent, Codec, JsonCodec};
///
/// let codec = JsonCodec;
/// let direct = codec
///     .decode(br#"{"event":"start_game","data":{"roomId":"r1"}}"#)
///     .unwrap();
/// let stringified = codec
///     .decode(br#"{"event":"start_game","data":"{\"roomId\":\"r1\"}"}"#)
///     .unwrap();
/// assert_eq!(direct, stringified);
/// assert!(matches!(direct, ClientEvent::StartGame(_)));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[derive(Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

impl Codec for JsonCodec {
    fn encode(&self, envelope: &ServerEnvelope) -> Result<String, ProtocolError> {
        serde_json::to_string(envelope).map_err(ProtocolError::Encode)
    }

    fn decode(&self, data: &[u8]) -> Result<ClientEvent, ProtocolError> {
        let RawFrame { event, data } =
            serde_json::from_slice(data).map_err(ProtocolError::Decode)?;

        let data = match data {
            Value::String(text) => serde_json::from_str(&text).map_err(|source| {
                ProtocolError::InvalidPayload {
                    event: event.clone(),
                    source,
                }
            })?,
            Value::Null => Value::Object(Default::default()),
            other => other,
        };

        let mut frame = serde_json::Map::with_capacity(2);
        frame.insert("event".into(), Value::String(event.clone()));
        frame.insert("data".into(), data);

        serde_json::from_value(Value::Object(frame))
            .map_err(|source| ProtocolError::InvalidPayload { event, source })
    }
}
