//! Error types for the protocol layer.

/// Errors that can occur while encoding or decoding wire frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serializing an outbound envelope failed.
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The frame is not a JSON object with an `event` name.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The frame named an event, but its payload did not match that
    /// event's schema (or the event name is unknown).
    #[error("invalid payload for `{event}`: {source}")]
    InvalidPayload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}
