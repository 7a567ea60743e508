//! Flow steps.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

pub(crate) type SideEffect = Arc<dyn Fn() + Send + Sync>;

/// One scripted step of a [`Flow`](crate::Flow).
#[derive(Clone)]
pub(crate) enum Action<P> {
    /// Send the packet.
    Send(P),
    /// Receive one packet and match its rendering.
    Receive(P),
    /// Receive one packet and discard it.
    Skip,
    /// Suspend until the signal is cancelled.
    Wait(CancellationToken),
    /// Call the side effect in-line.
    Run(SideEffect),
    Delay(Duration),
    Close,
    /// Expect end of stream and no packet.
    End,
}

impl<P> Action<P> {
    pub(crate) fn kind(&self) -> ActionKind {
        match self {
            Self::Send(_) => ActionKind::Send,
            Self::Receive(_) => ActionKind::Receive,
            Self::Skip => ActionKind::Skip,
            Self::Wait(_) => ActionKind::Wait,
            Self::Run(_) => ActionKind::Run,
            Self::Delay(_) => ActionKind::Delay,
            Self::Close => ActionKind::Close,
            Self::End => ActionKind::End,
        }
    }
}

impl<P: fmt::Display> fmt::Debug for Action<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Send(pkt) => write!(f, "Send({pkt})"),
            Self::Receive(pkt) => write!(f, "Receive({pkt})"),
            Self::Delay(d) => write!(f, "Delay({d:?})"),
            other => write!(f, "{:?}", other.kind()),
        }
    }
}

/// The kind of a flow step, used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Send,
    Receive,
    Skip,
    Wait,
    Run,
    Delay,
    Close,
    End,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Send => write!(f, "send"),
            Self::Receive => write!(f, "receive"),
            Self::Skip => write!(f, "skip"),
            Self::Wait => write!(f, "wait"),
            Self::Run => write!(f, "run"),
            Self::Delay => write!(f, "delay"),
            Self::Close => write!(f, "close"),
            Self::End => write!(f, "end"),
        }
    }
}
