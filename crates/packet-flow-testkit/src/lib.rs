//! packet-flow-testkit: shared flow scenarios for packet-flow connections.
//!
//! Provides the `ConnFactory` trait, an MQTT-style [`TestPacket`], and
//! scenarios every [`Conn`] implementation is expected to pass.
//!
//! # Usage
//!
//! ```ignore
//! use packet_flow_testkit::{ConnFactory, TestError, TestPacket};
//!
//! struct MyConnFactory;
//!
//! impl ConnFactory for MyConnFactory {
//!     type Conn = MyConn;
//!
//!     async fn connect_pair() -> Result<(Self::Conn, Self::Conn), TestError> {
//!         /* create a connected (client, server) pair */
//!     }
//! }
//!
//! #[tokio::test]
//! async fn my_conn_connect_handshake() {
//!     packet_flow_testkit::run_connect_handshake::<MyConnFactory>().await;
//! }
//! ```

use std::future::Future;
use std::pin::pin;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use futures::poll;
use packet_flow::{Conn, ConnError, Flow, FlowError};
use tokio::sync::oneshot;

mod packet;

pub use packet::{PacketType, TestPacket};

/// Error type for test scenarios.
#[derive(Debug, thiserror::Error)]
pub enum TestError {
    /// Connection setup failed.
    #[error("setup error: {0}")]
    Setup(String),
    #[error("flow error: {0}")]
    Flow(#[from] FlowError),
    #[error("connection error: {0}")]
    Conn(#[from] ConnError),
    /// A background flow went away without reporting.
    #[error("flow result dropped")]
    ResultDropped,
    #[error("assertion failed: {0}")]
    Assertion(String),
}

/// Factory trait for creating connection pairs for testing.
pub trait ConnFactory: Send + Sync + 'static {
    type Conn: Conn<Packet = TestPacket>;

    /// Create a connected pair.
    ///
    /// Returns (client_side, server_side) where packets sent from the client
    /// are received by the server and vice versa. Closing either side ends
    /// the stream for the other.
    fn connect_pair()
    -> impl Future<Output = Result<(Self::Conn, Self::Conn), TestError>> + Send;
}

static INIT: Once = Once::new();

/// Install a test-writer subscriber honoring `RUST_LOG`. Idempotent.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Await the result of a flow started with `Flow::test_async`.
pub async fn join_flow(
    handle: oneshot::Receiver<Result<(), FlowError>>,
) -> Result<(), TestError> {
    handle.await.map_err(|_| TestError::ResultDropped)??;
    Ok(())
}

// ============================================================================
// Scripts
// ============================================================================

/// Client side of a clean session: connect, get acknowledged, hang up.
pub fn client_connect_flow() -> Flow<TestPacket> {
    Flow::new()
        .send(TestPacket::connect("client"))
        .receive(TestPacket::connack())
        .close()
        .end()
}

/// Server side answering a CONNECT with `reply`, then expecting the client to
/// hang up.
pub fn server_connect_flow(reply: TestPacket) -> Flow<TestPacket> {
    Flow::new()
        .receive(TestPacket::connect("client"))
        .send(reply)
        .end()
}

// ============================================================================
// Test scenarios
// ============================================================================

/// CONNECT / CONNACK exchange followed by a client close.
///
/// Both sides' flows must pass.
pub async fn run_connect_handshake<F: ConnFactory>() {
    let result = run_connect_handshake_inner::<F>().await;
    if let Err(e) = result {
        panic!("run_connect_handshake failed: {}", e);
    }
}

async fn run_connect_handshake_inner<F: ConnFactory>() -> Result<(), TestError> {
    let (client, server) = F::connect_pair().await?;

    let server_done =
        server_connect_flow(TestPacket::connack()).test_async_default(server);
    tracing::debug!("connect_handshake: server flow started");
    client_connect_flow().test(&client).await?;
    tracing::debug!("connect_handshake: client flow passed");
    join_flow(server_done).await
}

/// The server answers CONNECT with a PUBLISH; the client flow must fail with
/// a mismatch naming both packet types.
pub async fn run_connect_mismatch<F: ConnFactory>() {
    let result = run_connect_mismatch_inner::<F>().await;
    if let Err(e) = result {
        panic!("run_connect_mismatch failed: {}", e);
    }
}

async fn run_connect_mismatch_inner<F: ConnFactory>() -> Result<(), TestError> {
    let (client, server) = F::connect_pair().await?;

    let server_done = server_connect_flow(TestPacket::publish(1, "test", "data"))
        .test_async_default(server);

    let err = match client_connect_flow().test(&client).await {
        Ok(()) => {
            return Err(TestError::Assertion(
                "expected a mismatch, flow passed".into(),
            ));
        }
        Err(e) => e,
    };

    if !matches!(err, FlowError::Mismatch { index: 1, .. }) {
        return Err(TestError::Assertion(format!(
            "expected mismatch at action 1, got: {}",
            err
        )));
    }
    let message = err.to_string();
    for name in ["CONNACK", "PUBLISH"] {
        if !message.contains(name) {
            return Err(TestError::Assertion(format!(
                "mismatch error does not name {}: {}",
                name, message
            )));
        }
    }

    tracing::debug!(error = %err, "connect_mismatch: client flow failed as expected");

    // No automatic cleanup after a failure; hang up so the server can end.
    client.close().await?;
    join_flow(server_done).await
}

/// Closing the client unblocks a pending server receive with end of stream,
/// and later sends on the client fail.
pub async fn run_close_propagates<F: ConnFactory>() {
    let result = run_close_propagates_inner::<F>().await;
    if let Err(e) = result {
        panic!("run_close_propagates failed: {}", e);
    }
}

async fn run_close_propagates_inner<F: ConnFactory>() -> Result<(), TestError> {
    let (client, server) = F::connect_pair().await?;

    let mut pending = pin!(server.receive());
    if poll!(pending.as_mut()).is_ready() {
        return Err(TestError::Assertion(
            "receive completed before anything was sent".into(),
        ));
    }
    tracing::debug!("close_propagates: server receive pending, closing client");
    client.close().await?;

    match pending.await {
        Err(e) if e.is_eof() => {}
        Err(e) => {
            return Err(TestError::Assertion(format!(
                "expected end of stream, got error: {}",
                e
            )));
        }
        Ok(pkt) => {
            return Err(TestError::Assertion(format!(
                "expected end of stream, got packet {}",
                pkt
            )));
        }
    }

    if client.send(TestPacket::Pingreq).await.is_ok() {
        return Err(TestError::Assertion(
            "send succeeded on a closed connection".into(),
        ));
    }

    Ok(())
}

/// `end` passes once the peer hangs up and fails if a packet shows up instead.
pub async fn run_end_assertion<F: ConnFactory>() {
    let result = run_end_assertion_inner::<F>().await;
    if let Err(e) = result {
        panic!("run_end_assertion failed: {}", e);
    }
}

async fn run_end_assertion_inner<F: ConnFactory>() -> Result<(), TestError> {
    let (client, server) = F::connect_pair().await?;
    let server_done = Flow::new().end().test_async_default(server);
    Flow::new().close().test(&client).await?;
    join_flow(server_done).await?;

    let (client, server) = F::connect_pair().await?;
    let server_done = Flow::new().end().test_async_default(server);
    Flow::new().send(TestPacket::Disconnect).test(&client).await?;
    tracing::debug!("end_assertion: packet sent into a pending end");

    match join_flow(server_done).await {
        Err(TestError::Flow(FlowError::UnexpectedPacket { packet, .. }))
            if packet == TestPacket::Disconnect.to_string() =>
        {
            client.close().await?;
            Ok(())
        }
        Err(e) => Err(TestError::Assertion(format!(
            "expected unexpected-packet error, got: {}",
            e
        ))),
        Ok(()) => Err(TestError::Assertion(
            "end passed although a packet arrived".into(),
        )),
    }
}

/// Several sends interleaved with side effects arrive in script order, and
/// each side effect runs only after the preceding send completed.
pub async fn run_order_preserved<F: ConnFactory>() {
    let result = run_order_preserved_inner::<F>().await;
    if let Err(e) = result {
        panic!("run_order_preserved failed: {}", e);
    }
}

async fn run_order_preserved_inner<F: ConnFactory>() -> Result<(), TestError> {
    const COUNT: u16 = 5;

    let (client, server) = F::connect_pair().await?;
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut client_flow = Flow::new();
    let mut server_flow = Flow::new();
    for id in 0..COUNT {
        let pkt = TestPacket::publish(id, "order", format!("message {}", id));
        let log = log.clone();
        client_flow = client_flow.send(pkt.clone()).run(move || {
            if let Ok(mut log) = log.lock() {
                log.push(id);
            }
        });
        server_flow = server_flow.receive(pkt);
    }

    let server_done = server_flow.test_async_default(server);
    client_flow.close().test(&client).await?;
    join_flow(server_done).await?;

    let log = log
        .lock()
        .map_err(|_| TestError::Setup("order log poisoned".into()))?
        .clone();
    let expected: Vec<u16> = (0..COUNT).collect();
    if log != expected {
        return Err(TestError::Assertion(format!(
            "side effects ran out of order: {:?}",
            log
        )));
    }

    Ok(())
}

/// A flow delayed past its deadline reports a timeout, not its own result.
pub async fn run_timeout_race<F: ConnFactory>() {
    let result = run_timeout_race_inner::<F>().await;
    if let Err(e) = result {
        panic!("run_timeout_race failed: {}", e);
    }
}

async fn run_timeout_race_inner<F: ConnFactory>() -> Result<(), TestError> {
    let (client, server) = F::connect_pair().await?;

    let slow = Flow::new()
        .delay(Duration::from_secs(2))
        .send(TestPacket::Pingreq);
    let result = slow.test_async(client, Duration::from_millis(50));

    match join_flow(result).await {
        Err(TestError::Flow(FlowError::Timeout { .. })) => {}
        Err(e) => {
            return Err(TestError::Assertion(format!(
                "expected timeout, got: {}",
                e
            )));
        }
        Ok(()) => {
            return Err(TestError::Assertion(
                "slow flow finished before its deadline".into(),
            ));
        }
    }

    server.close().await?;
    Ok(())
}

/// One server script replayed against two fresh connections.
pub async fn run_reusable_flow<F: ConnFactory>() {
    let result = run_reusable_flow_inner::<F>().await;
    if let Err(e) = result {
        panic!("run_reusable_flow failed: {}", e);
    }
}

async fn run_reusable_flow_inner<F: ConnFactory>() -> Result<(), TestError> {
    let server_flow = server_connect_flow(TestPacket::connack());
    let client_flow = client_connect_flow();

    for round in 0..2 {
        tracing::debug!(round, "reusable_flow: replaying scripts");
        let (client, server) = F::connect_pair().await?;
        let server_done = server_flow.test_async_default(server);
        client_flow
            .test(&client)
            .await
            .map_err(|e| TestError::Assertion(format!("round {}: {}", round, e)))?;
        join_flow(server_done).await?;
    }

    Ok(())
}
