//! Error types for frame-router.
//!
//! Every variant of [`Error`] is fatal to the connection it occurred on and
//! to nothing else: the session that hits it tears its connection down and
//! the accept loop keeps running.

use thiserror::Error;

/// Main error type for codec, dispatch and session operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport read/write/close failure, including EOF mid-packet.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed packet header.
    #[error("protocol violation: {0}")]
    ProtocolViolation(#[from] ProtocolViolation),

    /// No handler is registered for the packet's routing key.
    #[error("no handler registered for routing key {id} (type {kind})")]
    UnroutablePacket { id: u32, kind: u16 },

    /// A handler failed while processing a routed packet.
    #[error("handler failed: {0}")]
    Handler(#[from] HandlerError),
}

impl Error {
    /// True when the peer simply hung up between packets.
    pub fn is_eof(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof)
    }

    /// True when this side closed the connection, e.g. on server stop.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == std::io::ErrorKind::ConnectionAborted)
    }
}

/// Ways a packet can break the framing rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    /// Routing key 0 is reserved.
    #[error("routing key must not be zero")]
    ZeroId,

    /// Packet type outside the known range.
    #[error("packet type {0} not defined")]
    UnknownType(u16),

    /// Declared body length above the configured limit.
    #[error("body length {length} exceeds limit {max}")]
    BodyTooLarge { length: u64, max: u32 },

    /// Declared length disagrees with the body actually carried.
    #[error("declared length {declared} does not match body length {actual}")]
    LengthMismatch { declared: u32, actual: usize },
}

/// Failure raised by a [`Handler`](crate::router::Handler).
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The reply could not be written to the connection.
    #[error("failed to write reply: {0}")]
    Reply(#[from] std::io::Error),

    /// The reply packet could not be framed.
    #[error("failed to encode reply: {0}")]
    Encode(#[from] ProtocolViolation),

    /// The handler refused the packet.
    #[error("{0}")]
    Rejected(String),
}

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_eof_detection() {
        let eof = Error::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"));
        assert!(eof.is_eof());

        let reset = Error::Io(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert!(!reset.is_eof());

        assert!(!Error::from(ProtocolViolation::ZeroId).is_eof());
    }

    #[test]
    fn test_shutdown_detection() {
        let aborted = Error::Io(io::Error::new(io::ErrorKind::ConnectionAborted, "closed"));
        assert!(aborted.is_shutdown());
        assert!(!aborted.is_eof());

        let eof = Error::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"));
        assert!(!eof.is_shutdown());
        assert!(!Error::UnroutablePacket { id: 1, kind: 1234 }.is_shutdown());
    }

    #[test]
    fn test_display() {
        let err = Error::UnroutablePacket { id: 4000, kind: 1234 };
        assert_eq!(
            err.to_string(),
            "no handler registered for routing key 4000 (type 1234)"
        );

        let err = Error::from(ProtocolViolation::UnknownType(7));
        assert_eq!(err.to_string(), "protocol violation: packet type 7 not defined");
    }
}
