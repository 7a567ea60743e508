//! Connection trait driven by a flow.
//!
//! Any transport, real or simulated, that implements [`Conn`] can be tested
//! with a [`Flow`](crate::Flow). The in-process [`Pipe`](crate::Pipe) is the
//! reference implementation: it hands each packet directly to a waiting
//! receiver, so a send never completes before the peer has observed it.
//! Socket-backed implementations may buffer; flows written against them
//! should not depend on send completion implying delivery.

use std::future::Future;
use std::sync::Arc;

use crate::{ConnError, Packet};

/// A bidirectional packet connection.
///
/// At most one in-flight `send` and one in-flight `receive` is the supported
/// usage pattern; implementations need not be reentrant beyond that.
pub trait Conn: Send + Sync + 'static {
    type Packet: Packet;

    /// Send one packet.
    fn send(&self, pkt: Self::Packet) -> impl Future<Output = Result<(), ConnError>> + Send;

    /// Receive one packet, suspending until one arrives or the connection
    /// ends. A closed connection reports an error for which
    /// [`ConnError::is_eof`] holds.
    fn receive(&self) -> impl Future<Output = Result<Self::Packet, ConnError>> + Send;

    /// Close the connection, waking any suspended send or receive.
    fn close(&self) -> impl Future<Output = Result<(), ConnError>> + Send;
}

impl<C: Conn> Conn for Arc<C> {
    type Packet = C::Packet;

    fn send(&self, pkt: Self::Packet) -> impl Future<Output = Result<(), ConnError>> + Send {
        (**self).send(pkt)
    }

    fn receive(&self) -> impl Future<Output = Result<Self::Packet, ConnError>> + Send {
        (**self).receive()
    }

    fn close(&self) -> impl Future<Output = Result<(), ConnError>> + Send {
        (**self).close()
    }
}
