//! Flow builder and executors.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::action::Action;
use crate::{ActionKind, Conn, FlowError, Packet};

/// A script of actions to test against a [`Conn`].
///
/// Built once with chained calls, then executed any number of times:
///
/// ```ignore
/// let flow = Flow::new()
///     .send(connect)
///     .receive(connack)
///     .close()
///     .end();
///
/// flow.test(&pipe).await?;
/// ```
///
/// Nothing is validated while building. A nonsensical script (an `end`
/// that is not last, a `receive` nobody sends to) shows up as an error or
/// a stall when the flow runs.
pub struct Flow<P> {
    actions: Vec<Action<P>>,
}

impl<P: Packet> Flow<P> {
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
        }
    }

    /// Send one packet.
    pub fn send(self, pkt: P) -> Self {
        self.push(Action::Send(pkt))
    }

    /// Receive one packet and match its rendering against `pkt`.
    pub fn receive(self, pkt: P) -> Self {
        self.push(Action::Receive(pkt))
    }

    /// Receive one packet without matching it.
    pub fn skip(self) -> Self {
        self.push(Action::Skip)
    }

    /// Suspend until `signal` is cancelled.
    ///
    /// Waits forever if nobody cancels it.
    pub fn wait(self, signal: CancellationToken) -> Self {
        self.push(Action::Wait(signal))
    }

    /// Call `f` and wait until it returns. Panics in `f` are not caught.
    pub fn run<F>(self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.push(Action::Run(Arc::new(f)))
    }

    /// Suspend the flow for `duration`.
    pub fn delay(self, duration: Duration) -> Self {
        self.push(Action::Delay(duration))
    }

    /// Close the connection.
    pub fn close(self) -> Self {
        self.push(Action::Close)
    }

    /// Expect the connection to end: the next receive must report end of
    /// stream and yield no packet.
    pub fn end(self) -> Self {
        self.push(Action::End)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// The kind of each action, in execution order.
    pub fn kinds(&self) -> impl Iterator<Item = ActionKind> + '_ {
        self.actions.iter().map(Action::kind)
    }

    /// Run the flow against `conn`, returning the first deviation.
    ///
    /// Actions run strictly in order. Execution stops at the first failure;
    /// the connection is left as it is (no automatic close).
    pub async fn test<C>(&self, conn: &C) -> Result<(), FlowError>
    where
        C: Conn<Packet = P>,
    {
        let span = tracing::debug_span!("flow", actions = self.actions.len());
        let result = self.run_actions(conn).instrument(span).await;
        if let Err(e) = &result {
            tracing::debug!(error = %e, "flow failed");
        }
        result
    }

    /// Run the flow on a background task, racing it against `timeout`.
    ///
    /// Returns immediately; the receiver yields exactly one result: the
    /// flow's own result if it finishes first, [`FlowError::Timeout`] if the
    /// deadline passes first. A timed-out flow is aborted at its current
    /// suspension point (a `run` side effect already executing still runs to
    /// completion). A panicking flow yields [`FlowError::Aborted`].
    ///
    /// Must be called from within a tokio runtime.
    pub fn test_async<C>(
        &self,
        conn: C,
        timeout: Duration,
    ) -> oneshot::Receiver<Result<(), FlowError>>
    where
        C: Conn<Packet = P>,
    {
        let flow = self.clone();
        let (result_tx, result_rx) = oneshot::channel();

        let executor = tokio::spawn(async move { flow.test(&conn).await });
        let abort = executor.abort_handle();

        tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, executor).await {
                Ok(Ok(result)) => result,
                Ok(Err(join_error)) => Err(FlowError::Aborted {
                    reason: join_error.to_string(),
                }),
                Err(_) => {
                    abort.abort();
                    tracing::debug!(?timeout, "flow timed out");
                    Err(FlowError::Timeout { timeout })
                }
            };
            let _ = result_tx.send(result);
        });

        result_rx
    }

    /// [`test_async`](Self::test_async) with [`default_timeout`](crate::default_timeout).
    pub fn test_async_default<C>(&self, conn: C) -> oneshot::Receiver<Result<(), FlowError>>
    where
        C: Conn<Packet = P>,
    {
        self.test_async(conn, crate::default_timeout())
    }

    async fn run_actions<C>(&self, conn: &C) -> Result<(), FlowError>
    where
        C: Conn<Packet = P>,
    {
        for (index, action) in self.actions.iter().enumerate() {
            tracing::trace!(index, kind = %action.kind(), "flow: step");

            match action {
                Action::Send(pkt) => conn
                    .send(pkt.clone())
                    .await
                    .map_err(|source| FlowError::Send { index, source })?,
                Action::Receive(expected) => {
                    let pkt = conn
                        .receive()
                        .await
                        .map_err(|source| FlowError::Receive { index, source })?;

                    let (want, got) = (expected.render(), pkt.render());
                    if want != got {
                        return Err(FlowError::Mismatch {
                            index,
                            expected: want,
                            actual: got,
                        });
                    }
                }
                Action::Skip => {
                    conn.receive()
                        .await
                        .map_err(|source| FlowError::Skip { index, source })?;
                }
                Action::Wait(signal) => signal.cancelled().await,
                Action::Run(f) => f(),
                Action::Delay(duration) => tokio::time::sleep(*duration).await,
                Action::Close => conn
                    .close()
                    .await
                    .map_err(|source| FlowError::Close { index, source })?,
                Action::End => match conn.receive().await {
                    Ok(pkt) => {
                        return Err(FlowError::UnexpectedPacket {
                            index,
                            packet: pkt.render(),
                        });
                    }
                    Err(e) if e.is_eof() => {}
                    Err(source) => return Err(FlowError::ExpectedEof { index, source }),
                },
            }
        }

        Ok(())
    }

    fn push(mut self, action: Action<P>) -> Self {
        self.actions.push(action);
        self
    }
}

impl<P: Packet> Default for Flow<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Clone> Clone for Flow<P> {
    fn clone(&self) -> Self {
        Self {
            actions: self.actions.clone(),
        }
    }
}

impl<P: fmt::Display> fmt::Debug for Flow<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.actions).finish()
    }
}
