//! In-process loopback connection.
//!
//! A [`Pipe`] hands each packet from one `send` directly to one concurrent
//! `receive`. It never buffers: a send completes only once a receiver has
//! taken the packet out of the hand-off, or fails once the pipe is closed.
//! Clones share the hand-off point, so one clone can drive the client side
//! of a conversation while another drives the server side.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::{Notify, oneshot};
use tokio_util::sync::CancellationToken;

use crate::{Conn, ConnError, Packet};

/// Rendezvous connection for driving both ends of a flow in one process.
pub struct Pipe<P> {
    inner: Arc<PipeInner<P>>,
}

struct PipeInner<P> {
    /// Receivers currently suspended in `receive`.
    waiters: Mutex<Waiters<P>>,
    /// Signalled whenever a receiver registers.
    receiver_ready: Notify,
    closed: CancellationToken,
    close_called: AtomicBool,
}

struct Waiters<P> {
    next_id: u64,
    queue: VecDeque<(u64, oneshot::Sender<Offer<P>>)>,
}

/// A packet offered to one receiver.
///
/// The packet stays in `slot` until the receiver takes it; the sender can
/// pull it back as long as it is still there.
struct Offer<P> {
    slot: Arc<Mutex<Option<P>>>,
    taken: oneshot::Sender<()>,
}

/// Removes a receiver's queue entry when its `receive` future goes away.
struct Registration<'a, P> {
    inner: &'a PipeInner<P>,
    id: u64,
}

impl<P> Drop for Registration<'_, P> {
    fn drop(&mut self) {
        self.inner
            .waiters
            .lock()
            .queue
            .retain(|(id, _)| *id != self.id);
    }
}

/// Pulls an undelivered packet back when `send` returns or is dropped.
struct Retract<P>(Arc<Mutex<Option<P>>>);

impl<P> Retract<P> {
    fn delivered(&self) -> bool {
        self.0.lock().is_none()
    }
}

impl<P> Drop for Retract<P> {
    fn drop(&mut self) {
        self.0.lock().take();
    }
}

impl<P: Packet> Pipe<P> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(PipeInner {
                waiters: Mutex::new(Waiters {
                    next_id: 0,
                    queue: VecDeque::new(),
                }),
                receiver_ready: Notify::new(),
                closed: CancellationToken::new(),
                close_called: AtomicBool::new(false),
            }),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    /// Resolves once the pipe has been closed.
    pub async fn closed(&self) {
        self.inner.closed.cancelled().await
    }

    #[cfg(test)]
    fn waiting_receivers(&self) -> usize {
        self.inner.waiters.lock().queue.len()
    }

    fn register(&self, slot: oneshot::Sender<Offer<P>>) -> Registration<'_, P> {
        let id = {
            let mut waiters = self.inner.waiters.lock();
            let id = waiters.next_id;
            waiters.next_id += 1;
            waiters.queue.push_back((id, slot));
            id
        };
        self.inner.receiver_ready.notify_one();
        Registration {
            inner: &self.inner,
            id,
        }
    }

    async fn next_waiter(&self) -> oneshot::Sender<Offer<P>> {
        loop {
            {
                let mut waiters = self.inner.waiters.lock();
                while let Some((_, waiter)) = waiters.queue.pop_front() {
                    if !waiter.is_closed() {
                        return waiter;
                    }
                }
            }
            self.inner.receiver_ready.notified().await;
        }
    }
}

impl<P: Packet> Default for Pipe<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> Clone for Pipe<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P> fmt::Debug for Pipe<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipe")
            .field("closed", &self.inner.closed.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<P: Packet> Conn for Pipe<P> {
    type Packet = P;

    async fn send(&self, pkt: P) -> Result<(), ConnError> {
        let slot = Arc::new(Mutex::new(Some(pkt)));
        let retract = Retract(slot.clone());

        loop {
            let waiter = tokio::select! {
                biased;
                _ = self.inner.closed.cancelled() => return Err(ConnError::Closed),
                waiter = self.next_waiter() => waiter,
            };

            let (taken_tx, taken_rx) = oneshot::channel();
            let offer = Offer {
                slot: slot.clone(),
                taken: taken_tx,
            };
            if waiter.send(offer).is_err() {
                continue;
            }

            tokio::select! {
                biased;
                taken = taken_rx => {
                    if taken.is_ok() || retract.delivered() {
                        return Ok(());
                    }
                    // The receiver went away without taking the packet; offer
                    // it to the next one.
                    tracing::trace!("pipe: skipping abandoned receiver");
                }
                _ = self.inner.closed.cancelled() => {
                    // Whoever gets the slot first decides: a packet the
                    // receiver already took counts as sent.
                    return if retract.0.lock().take().is_some() {
                        Err(ConnError::Closed)
                    } else {
                        Ok(())
                    };
                }
            }
        }
    }

    async fn receive(&self) -> Result<P, ConnError> {
        loop {
            if self.is_closed() {
                return Err(ConnError::Eof);
            }

            let (slot_tx, slot_rx) = oneshot::channel();
            let _registration = self.register(slot_tx);

            let offer = tokio::select! {
                biased;
                offer = slot_rx => offer,
                _ = self.inner.closed.cancelled() => return Err(ConnError::Eof),
            };

            // A sender that pulled its packet back leaves the slot empty;
            // keep waiting for the next one.
            if let Ok(offer) = offer {
                let pkt = offer.slot.lock().take();
                if let Some(pkt) = pkt {
                    let _ = offer.taken.send(());
                    return Ok(pkt);
                }
            }
        }
    }

    async fn close(&self) -> Result<(), ConnError> {
        if self.inner.close_called.swap(true, Ordering::AcqRel) {
            tracing::debug!("pipe: close on already closed pipe");
            return Err(ConnError::AlreadyClosed);
        }
        self.inner.closed.cancel();
        tracing::debug!("pipe: closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::pin::pin;
    use std::time::Duration;

    use futures::{FutureExt, poll};

    use super::*;
    use crate::testing::{Msg, msg};

    #[tokio::test]
    async fn send_waits_for_receiver() {
        let pipe = Pipe::<Msg>::new();

        // Nobody is receiving, so the send cannot complete.
        assert!(pipe.send(msg("CONNECT")).now_or_never().is_none());

        let (sent, received) = tokio::join!(pipe.send(msg("CONNECT")), pipe.receive());
        sent.unwrap();
        assert_eq!(received.unwrap().to_string(), "CONNECT");
    }

    #[tokio::test]
    async fn send_waits_until_packet_is_taken() {
        let pipe = Pipe::<Msg>::new();
        let mut receive = pin!(pipe.receive());
        let mut send = pin!(pipe.send(msg("CONNECT")));

        assert!(poll!(receive.as_mut()).is_pending());
        // Offered, but the receiver has not run since.
        assert!(poll!(send.as_mut()).is_pending());

        assert_eq!(receive.await.unwrap(), msg("CONNECT"));
        send.await.unwrap();
    }

    #[tokio::test]
    async fn clones_share_the_hand_off() {
        let client = Pipe::<Msg>::new();
        let server = client.clone();

        let peer = tokio::spawn(async move {
            let pkt = server.receive().await.unwrap();
            server.send(msg("CONNACK")).await.unwrap();
            pkt
        });

        client.send(msg("CONNECT")).await.unwrap();
        assert_eq!(client.receive().await.unwrap(), msg("CONNACK"));
        assert_eq!(peer.await.unwrap(), msg("CONNECT"));
    }

    #[tokio::test]
    async fn close_wakes_blocked_send() {
        let pipe = Pipe::<Msg>::new();
        let mut send = pin!(pipe.send(msg("PUBLISH")));
        assert!(poll!(send.as_mut()).is_pending());

        pipe.close().await.unwrap();

        assert!(matches!(send.await, Err(ConnError::Closed)));
    }

    #[tokio::test]
    async fn close_wakes_blocked_receive() {
        let pipe = Pipe::<Msg>::new();
        let mut receive = pin!(pipe.receive());
        assert!(poll!(receive.as_mut()).is_pending());

        pipe.close().await.unwrap();

        assert!(receive.await.unwrap_err().is_eof());
    }

    #[tokio::test]
    async fn close_during_offer_fails_both_sides() {
        let pipe = Pipe::<Msg>::new();
        let mut receive = pin!(pipe.receive());
        let mut send = pin!(pipe.send(msg("PUBLISH")));

        assert!(poll!(receive.as_mut()).is_pending());
        assert!(poll!(send.as_mut()).is_pending());

        // Closed while the packet sits offered but not taken: the sender
        // must not report success for a packet nobody received.
        pipe.close().await.unwrap();

        assert!(matches!(send.await, Err(ConnError::Closed)));
        assert!(matches!(receive.await, Err(ConnError::Eof)));
    }

    #[tokio::test]
    async fn close_after_take_counts_as_sent() {
        let pipe = Pipe::<Msg>::new();
        let mut receive = pin!(pipe.receive());
        let mut send = pin!(pipe.send(msg("PUBLISH")));

        assert!(poll!(receive.as_mut()).is_pending());
        assert!(poll!(send.as_mut()).is_pending());
        // The receiver takes the packet before the close lands.
        assert_eq!(receive.await.unwrap(), msg("PUBLISH"));

        pipe.close().await.unwrap();

        send.await.unwrap();
    }

    #[tokio::test]
    async fn operations_after_close_fail() {
        let pipe = Pipe::<Msg>::new();
        pipe.close().await.unwrap();
        assert!(pipe.is_closed());

        assert!(matches!(
            pipe.send(msg("PINGREQ")).await,
            Err(ConnError::Closed)
        ));
        assert!(matches!(pipe.receive().await, Err(ConnError::Eof)));
        // Still closed on every later call.
        assert!(matches!(pipe.receive().await, Err(ConnError::Eof)));
    }

    #[tokio::test]
    async fn second_close_reports_already_closed() {
        let pipe = Pipe::<Msg>::new();
        pipe.close().await.unwrap();
        assert!(matches!(
            pipe.close().await,
            Err(ConnError::AlreadyClosed)
        ));
        assert!(pipe.is_closed());
    }

    #[tokio::test]
    async fn abandoned_receive_does_not_swallow_packet() {
        let pipe = Pipe::<Msg>::new();

        // Registers as a waiting receiver, then gets dropped.
        assert!(pipe.receive().now_or_never().is_none());

        let (sent, received) = tokio::join!(pipe.send(msg("SUBSCRIBE")), pipe.receive());
        sent.unwrap();
        assert_eq!(received.unwrap(), msg("SUBSCRIBE"));
    }

    #[tokio::test]
    async fn receive_dropped_after_offer_keeps_packet() {
        let pipe = Pipe::<Msg>::new();
        let mut send = pin!(pipe.send(msg("CONNECT")));

        {
            let mut receive = pin!(pipe.receive());
            assert!(poll!(receive.as_mut()).is_pending());
            // The packet is offered to this receiver, which is then dropped
            // without ever taking it.
            assert!(poll!(send.as_mut()).is_pending());
        }

        let received = tokio::time::timeout(Duration::from_secs(1), pipe.receive());
        let (sent, received) = tokio::join!(send, received);
        assert_eq!(received.expect("packet was lost").unwrap(), msg("CONNECT"));
        sent.unwrap();
    }

    #[tokio::test]
    async fn cancelled_receives_leave_no_waiters() {
        let pipe = Pipe::<Msg>::new();

        for _ in 0..100 {
            assert!(pipe.receive().now_or_never().is_none());
        }
        assert_eq!(pipe.waiting_receivers(), 0);

        let mut receive = pin!(pipe.receive());
        assert!(poll!(receive.as_mut()).is_pending());
        assert_eq!(pipe.waiting_receivers(), 1);
    }

    #[tokio::test]
    async fn closed_resolves_after_close() {
        let pipe = Pipe::<Msg>::new();
        let mut closed = pin!(pipe.closed());
        assert!(poll!(closed.as_mut()).is_pending());

        pipe.close().await.unwrap();
        assert!(poll!(closed.as_mut()).is_ready());
    }
}
