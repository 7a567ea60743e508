//! Connection and flow errors.

use std::time::Duration;

use crate::ActionKind;

/// Connection-level errors.
///
/// These are produced by [`Conn`](crate::Conn) implementations and wrapped
/// into a [`FlowError`] by the executor.
#[derive(Debug, thiserror::Error)]
pub enum ConnError {
    /// The connection was closed before a send could be handed off.
    #[error("connection closed")]
    Closed,
    /// The connection reached end of stream; no further packets will arrive.
    #[error("EOF")]
    Eof,
    /// `close` was called on a connection that was already closed.
    #[error("already closed")]
    AlreadyClosed,
    /// Transport-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnError {
    /// Whether this error signals a normal end of stream.
    pub fn is_eof(&self) -> bool {
        match self {
            Self::Eof => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }
}

/// The first deviation of a connection from a flow's script.
///
/// Variants produced by an action carry the zero-based `index` of that action
/// so a failing test points at the exact step.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("action {index} (send): error sending packet: {source}")]
    Send {
        index: usize,
        #[source]
        source: ConnError,
    },

    #[error("action {index} (receive): expected to receive a packet but got error: {source}")]
    Receive {
        index: usize,
        #[source]
        source: ConnError,
    },

    /// The received packet's rendering differs from the expected one.
    #[error("action {index} (receive): expected packet of {expected:?} but got {actual:?}")]
    Mismatch {
        index: usize,
        expected: String,
        actual: String,
    },

    #[error(
        "action {index} (skip): expected to skip over a received packet but got error: {source}"
    )]
    Skip {
        index: usize,
        #[source]
        source: ConnError,
    },

    #[error(
        "action {index} (close): expected connection to close successfully but got error: {source}"
    )]
    Close {
        index: usize,
        #[source]
        source: ConnError,
    },

    #[error("action {index} (end): expected EOF but got {source}")]
    ExpectedEof {
        index: usize,
        #[source]
        source: ConnError,
    },

    #[error("action {index} (end): expected no packet but got {packet}")]
    UnexpectedPacket { index: usize, packet: String },

    /// The flow did not finish before the `test_async` deadline.
    #[error("timed out waiting for flow to complete after {timeout:?}")]
    Timeout { timeout: Duration },

    /// The background executor stopped without producing a result.
    #[error("flow executor aborted: {reason}")]
    Aborted { reason: String },
}

impl FlowError {
    /// Index of the failing action, if the error came from one.
    pub fn index(&self) -> Option<usize> {
        match self {
            Self::Send { index, .. }
            | Self::Receive { index, .. }
            | Self::Mismatch { index, .. }
            | Self::Skip { index, .. }
            | Self::Close { index, .. }
            | Self::ExpectedEof { index, .. }
            | Self::UnexpectedPacket { index, .. } => Some(*index),
            Self::Timeout { .. } | Self::Aborted { .. } => None,
        }
    }

    /// Kind of the failing action, if the error came from one.
    pub fn kind(&self) -> Option<ActionKind> {
        match self {
            Self::Send { .. } => Some(ActionKind::Send),
            Self::Receive { .. } | Self::Mismatch { .. } => Some(ActionKind::Receive),
            Self::Skip { .. } => Some(ActionKind::Skip),
            Self::Close { .. } => Some(ActionKind::Close),
            Self::ExpectedEof { .. } | Self::UnexpectedPacket { .. } => Some(ActionKind::End),
            Self::Timeout { .. } | Self::Aborted { .. } => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eof_classification() {
        assert!(ConnError::Eof.is_eof());
        assert!(
            ConnError::Io(std::io::Error::from(std::io::ErrorKind::UnexpectedEof)).is_eof()
        );
        assert!(!ConnError::Closed.is_eof());
        assert!(!ConnError::AlreadyClosed.is_eof());
        assert!(!ConnError::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe)).is_eof());
    }

    #[test]
    fn mismatch_message_quotes_both_renderings() {
        let err = FlowError::Mismatch {
            index: 1,
            expected: "CONNECT".into(),
            actual: "CONNACK".into(),
        };
        assert_eq!(
            err.to_string(),
            r#"action 1 (receive): expected packet of "CONNECT" but got "CONNACK""#
        );
        assert_eq!(err.index(), Some(1));
        assert_eq!(err.kind(), Some(ActionKind::Receive));
    }

    #[test]
    fn timeout_has_no_action() {
        let err = FlowError::Timeout {
            timeout: Duration::from_millis(10),
        };
        assert!(err.is_timeout());
        assert_eq!(err.index(), None);
        assert!(err.to_string().starts_with("timed out waiting for flow to complete"));
    }
}
