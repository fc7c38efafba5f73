use thiserror::Error;

/// Errors raised while validating or framing broadcast traffic
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A message decoded fine but a field is missing or out of range
    #[error("malformed {kind}: {reason}")]
    Malformed { kind: &'static str, reason: String },

    #[error("failed to decode packet: {0}")]
    Decode(#[source] bincode::Error),

    #[error("failed to encode packet: {0}")]
    Encode(#[source] bincode::Error),

    /// Encoded packet does not fit in a single datagram
    #[error("packet of {0} bytes exceeds the datagram limit")]
    Oversized(usize),
}

impl ProtocolError {
    pub fn malformed(kind: &'static str, reason: impl Into<String>) -> Self {
        ProtocolError::Malformed {
            kind,
            reason: reason.into(),
        }
    }
}
