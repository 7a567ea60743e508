//! Shared scenarios run against the in-process `Pipe`.

use std::sync::Arc;

use packet_flow::Pipe;
use packet_flow_testkit::{ConnFactory, TestError, TestPacket};

/// Both ends are the same pipe: whatever one side sends, the other receives.
struct PipeFactory;

impl ConnFactory for PipeFactory {
    type Conn = Pipe<TestPacket>;

    async fn connect_pair() -> Result<(Self::Conn, Self::Conn), TestError> {
        let pipe = Pipe::new();
        Ok((pipe.clone(), pipe))
    }
}

/// Same pipe, shared through `Arc` the way a real connection would be.
struct SharedPipeFactory;

impl ConnFactory for SharedPipeFactory {
    type Conn = Arc<Pipe<TestPacket>>;

    async fn connect_pair() -> Result<(Self::Conn, Self::Conn), TestError> {
        let pipe = Arc::new(Pipe::new());
        Ok((pipe.clone(), pipe))
    }
}

#[tokio::test]
async fn connect_handshake() {
    packet_flow_testkit::init_tracing();
    packet_flow_testkit::run_connect_handshake::<PipeFactory>().await;
}

#[tokio::test]
async fn connect_mismatch() {
    packet_flow_testkit::run_connect_mismatch::<PipeFactory>().await;
}

#[tokio::test]
async fn close_propagates() {
    packet_flow_testkit::run_close_propagates::<PipeFactory>().await;
}

#[tokio::test]
async fn end_assertion() {
    packet_flow_testkit::run_end_assertion::<PipeFactory>().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn order_preserved() {
    packet_flow_testkit::run_order_preserved::<PipeFactory>().await;
}

#[tokio::test]
async fn timeout_race() {
    packet_flow_testkit::run_timeout_race::<PipeFactory>().await;
}

#[tokio::test]
async fn reusable_flow() {
    packet_flow_testkit::run_reusable_flow::<PipeFactory>().await;
}

// Arc-shared connections

#[tokio::test]
async fn shared_connect_handshake() {
    packet_flow_testkit::run_connect_handshake::<SharedPipeFactory>().await;
}

#[tokio::test]
async fn shared_close_propagates() {
    packet_flow_testkit::run_close_propagates::<SharedPipeFactory>().await;
}
